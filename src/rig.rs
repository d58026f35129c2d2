// src/rig.rs - Time-lapse rig: plan, sweep, finalize
use std::path::PathBuf;
use thiserror::Error;

use crate::camera::Camera;
use crate::config::Config;
use crate::file_manager::FrameStore;
use crate::finalize::{FinalizeError, Finalizer};
use crate::sweep::{PanPlan, PlanError, SweepReport, SweepRunner, SweepSettings};

#[derive(Debug, Error)]
pub enum RigError {
    #[error("Finalize error: {0}")]
    Finalize(#[from] FinalizeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct PanOptions {
    pub oscillate: bool,
    pub record: bool,
    pub max_steps: Option<usize>,
}

#[derive(Debug)]
pub struct SweepOutcome {
    pub report: SweepReport,
    /// Set when frames were recorded and encoded.
    pub video: Option<PathBuf>,
}

pub struct Rig {
    config: Config,
    frames: FrameStore,
    finalizer: Finalizer,
}

impl Rig {
    pub fn new(config: Config) -> Self {
        let frames = FrameStore::from_config(&config.capture);
        let finalizer = Finalizer::from_config(&config.finalize);
        Self {
            config,
            frames,
            finalizer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    /// Build the pan plan from the configured horizon and log its shape.
    pub fn plan(&self) -> Result<PanPlan, PlanError> {
        let [start, stop] = self.config.sweep.horizon;
        let plan = PanPlan::build(start, stop, self.config.sweep.steps)?;
        tracing::info!("{}: {:?}", plan.summary(), plan.angles());
        if plan.residual() != 0 {
            tracing::warn!(
                "Plan covers {}° of the requested {}° ({:+}° residual)",
                plan.coverage(),
                plan.span(),
                plan.residual()
            );
        }
        Ok(plan)
    }

    /// Encode whatever frames are on disk.
    pub async fn finalize(&self) -> Result<PathBuf, RigError> {
        Ok(self.finalizer.run(&self.frames).await?)
    }

    /// Run one sweep. With `record`, the frame directory is reset first and
    /// the frames are encoded afterwards.
    pub async fn sweep<C>(&self, camera: &C, plan: &PanPlan, options: &PanOptions) -> Result<SweepOutcome, RigError>
    where
        C: Camera + ?Sized,
    {
        if options.record {
            self.frames.reset().await?;
        }

        let mut settings = SweepSettings::from_config(&self.config, options.oscillate);
        settings.max_steps = options.max_steps;
        let frames = options.record.then_some(&self.frames);
        let report = SweepRunner::new(camera, frames, settings).run(plan).await;

        let video = if options.record {
            Some(self.finalize().await?)
        } else {
            tracing::info!("Nothing recorded; skipping finalize");
            None
        };
        Ok(SweepOutcome { report, video })
    }
}
