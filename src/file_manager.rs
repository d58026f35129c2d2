// src/file_manager.rs - Captured frame naming and storage
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::CaptureConfig;

/// One saved frame. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub index: u64,
    pub pan: i32,
    pub path: PathBuf,
}

/// Directory of sequentially named JPEG frames:
/// `<dir>/<prefix>_<index:06>_<|pan|>.jpg`.
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
    prefix: String,
}

impl FrameStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(&config.output_dir, &config.frame_name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: u64, pan: i32) -> PathBuf {
        self.dir
            .join(format!("{}_{:06}_{}.jpg", self.prefix, index, pan.unsigned_abs()))
    }

    /// Glob matching every frame, as handed to the encoder.
    pub fn glob_pattern(&self) -> String {
        self.dir
            .join(format!("{}_*.jpg", self.prefix))
            .to_string_lossy()
            .into_owned()
    }

    fn is_frame(&self, name: &str) -> bool {
        name.strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with('_') && rest.ends_with(".jpg"))
    }

    /// Remove the directory and everything in it, then recreate it empty.
    pub async fn reset(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => tracing::info!("Cleared frame directory {}", self.dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&self.dir).await
    }

    pub async fn save(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes).await?;
        tracing::info!("Saved frame to \"{}\"", path.display());
        Ok(())
    }

    /// Frame files in lexical order. A missing directory has no frames.
    pub async fn list_frames(&self) -> io::Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if self.is_frame(name) && entry.file_type().await?.is_file() {
                    frames.push(entry.path());
                }
            }
        }
        frames.sort();
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_frame_naming() {
        let store = FrameStore::new("out", "frame");
        assert_eq!(store.path_for(0, -120), PathBuf::from("out/frame_000000_120.jpg"));
        assert_eq!(store.path_for(42, 58), PathBuf::from("out/frame_000042_58.jpg"));
        assert_eq!(store.glob_pattern(), "out/frame_*.jpg");
    }

    #[tokio::test]
    async fn test_reset_clears_previous_run() {
        let dir = tempdir().unwrap();
        let store = FrameStore::new(dir.path().join("out"), "frame");
        store.reset().await.unwrap();
        let stale = store.path_for(0, 10);
        store.save(&stale, b"old").await.unwrap();
        assert_eq!(store.list_frames().await.unwrap().len(), 1);

        store.reset().await.unwrap();
        assert!(store.dir().exists());
        assert!(store.list_frames().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_frames_is_lexical_and_filtered() {
        let dir = tempdir().unwrap();
        let store = FrameStore::new(dir.path(), "frame");
        for (index, pan) in [(2, 5), (0, 120), (1, 118)] {
            store.save(&store.path_for(index, pan), b"jpg").await.unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("framework.jpg"), "x").unwrap();

        let names: Vec<String> = store
            .list_frames()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["frame_000000_120.jpg", "frame_000001_118.jpg", "frame_000002_5.jpg"]);
    }

    #[tokio::test]
    async fn test_missing_directory_has_no_frames() {
        let dir = tempdir().unwrap();
        let store = FrameStore::new(dir.path().join("never-created"), "frame");
        assert!(store.list_frames().await.unwrap().is_empty());
    }
}
