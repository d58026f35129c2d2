// src/finalize.rs - Encode captured frames into a video
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

use crate::config::FinalizeConfig;
use crate::file_manager::FrameStore;

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("No frames matching {0}")]
    NoFrames(String),
    #[error("Failed to list frames: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to start encoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Encoder exited with {0}")]
    Encoder(ExitStatus),
}

/// Runs the external encoder over every frame in a [`FrameStore`],
/// overwriting any previous output.
#[derive(Debug, Clone)]
pub struct Finalizer {
    program: String,
    framerate: u32,
    vcodec: String,
    output: PathBuf,
}

impl Finalizer {
    pub fn from_config(config: &FinalizeConfig) -> Self {
        Self {
            program: config.program.clone(),
            framerate: config.framerate,
            vcodec: config.vcodec.clone(),
            output: config.output.clone(),
        }
    }

    pub fn output(&self) -> &PathBuf {
        &self.output
    }

    pub fn args(&self, frames: &FrameStore) -> Vec<String> {
        let fps = self.framerate.to_string();
        vec![
            "-y".to_string(),
            "-framerate".to_string(),
            fps.clone(),
            "-pattern_type".to_string(),
            "glob".to_string(),
            "-i".to_string(),
            frames.glob_pattern(),
            "-c:v".to_string(),
            self.vcodec.clone(),
            "-r".to_string(),
            fps,
            self.output.to_string_lossy().into_owned(),
        ]
    }

    pub async fn run(&self, frames: &FrameStore) -> Result<PathBuf, FinalizeError> {
        let count = frames.list_frames().await?.len();
        if count == 0 {
            return Err(FinalizeError::NoFrames(frames.glob_pattern()));
        }

        let args = self.args(frames);
        tracing::info!("Encoding {} frames: {} {}", count, self.program, args.join(" "));
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| FinalizeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(FinalizeError::Encoder(status));
        }
        tracing::info!("Wrote {}", self.output.display());
        Ok(self.output.clone())
    }
}
