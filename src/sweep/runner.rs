// src/sweep/runner.rs - Pan/capture loop
use std::time::Duration;
use tokio::time::sleep;

use super::PanPlan;
use crate::camera::{Camera, CameraError};
use crate::config::Config;
use crate::file_manager::{CaptureRecord, FrameStore};

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub oscillate: bool,
    pub tilt: i32,
    /// Time from one move to the next.
    pub interval: Duration,
    /// Time from a move to its capture.
    pub lag: Duration,
    /// Stop after this many steps even when oscillating.
    pub max_steps: Option<usize>,
}

impl SweepSettings {
    pub fn from_config(config: &Config, oscillate: bool) -> Self {
        Self {
            oscillate,
            tilt: config.camera.tilt,
            interval: config.sweep.interval(),
            lag: config.sweep.lag(),
            max_steps: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub steps: usize,
    pub captures: Vec<CaptureRecord>,
    pub failed_captures: usize,
    pub failed_moves: usize,
}

/// Walks a plan, moving the camera at every step and capturing into
/// `frames` when one is given.
pub struct SweepRunner<'a, C: Camera + ?Sized> {
    camera: &'a C,
    frames: Option<&'a FrameStore>,
    settings: SweepSettings,
}

impl<'a, C: Camera + ?Sized> SweepRunner<'a, C> {
    pub fn new(camera: &'a C, frames: Option<&'a FrameStore>, settings: SweepSettings) -> Self {
        Self { camera, frames, settings }
    }

    /// Run until the plan is exhausted (or `max_steps` is reached). Camera
    /// faults are logged and the sweep carries on.
    pub async fn run(&self, plan: &PanPlan) -> SweepReport {
        let mut report = SweepReport::default();
        let mut frame_index: u64 = 0;
        let pause = match self.frames {
            Some(_) => self.settings.interval.saturating_sub(self.settings.lag),
            None => self.settings.interval,
        };

        let mut walker = plan.walk(self.settings.oscillate);
        let mut next = walker.next();
        while let Some(index) = next {
            let Some(pan) = plan.get(index) else { break };

            if let Err(e) = self.camera.move_to(pan, self.settings.tilt).await {
                tracing::warn!("Error moving camera to pan {}: {}", pan, e);
                report.failed_moves += 1;
            }

            if let Some(frames) = self.frames {
                sleep(self.settings.lag).await;
                let path = frames.path_for(frame_index, pan);
                match self.capture(frames, &path).await {
                    Ok(()) => report.captures.push(CaptureRecord {
                        index: frame_index,
                        pan,
                        path,
                    }),
                    Err(e) => {
                        tracing::warn!("Error capturing frame {} at pan {}: {}", frame_index, pan, e);
                        report.failed_captures += 1;
                    }
                }
                frame_index += 1;
            }

            report.steps += 1;
            if self.settings.max_steps.is_some_and(|max| report.steps >= max) {
                tracing::info!("Reached step limit of {}", report.steps);
                break;
            }

            next = walker.next();
            if next.is_some() {
                sleep(pause).await;
            }
        }

        tracing::info!(
            "Sweep finished: {} steps, {} frames saved, {} failed",
            report.steps,
            report.captures.len(),
            report.failed_captures
        );
        report
    }

    async fn capture(&self, frames: &FrameStore, path: &std::path::Path) -> Result<(), CameraError> {
        let bytes = self.camera.capture_frame().await?;
        frames.save(path, &bytes).await?;
        Ok(())
    }
}
