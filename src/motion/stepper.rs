// src/motion/stepper.rs - Single stepper move from configure to shutdown
use std::future::Future;
use std::time::Duration;

use super::{Completion, MotionChannel, MotionError, StepperPins};
use crate::config::StepperConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveTarget {
    Absolute(i64),
    Relative(i64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobOutcome {
    Completed(Completion),
    Interrupted,
}

/// Everything needed for one move of the stepper.
#[derive(Debug, Clone)]
pub struct MoveJob {
    pub pins: StepperPins,
    pub origin: i64,
    pub max_speed: f64,
    pub acceleration: f64,
    /// Pause after configuring, before the first motion command.
    pub settle: Duration,
    pub target: MoveTarget,
}

impl MoveJob {
    pub fn from_config(config: &StepperConfig, target: MoveTarget) -> Self {
        Self {
            pins: StepperPins {
                pulse: config.pulse_pin,
                direction: config.direction_pin,
                enable: config.enable_pin,
                enable_active_low: config.enable_active_low,
            },
            origin: 0,
            max_speed: config.max_speed,
            acceleration: config.acceleration,
            settle: Duration::from_millis(config.settle_ms),
            target,
        }
    }

    /// Configure the channel, perform the move and wait for its completion.
    /// Does not shut the channel down; see [`MoveJob::run_until`].
    pub async fn execute(&self, channel: &mut MotionChannel) -> Result<Completion, MotionError> {
        channel.configure(self.pins).await?;
        tokio::time::sleep(self.settle).await;

        channel.set_origin(self.origin).await?;
        channel.set_limits(self.max_speed, self.acceleration).await?;
        match self.target {
            MoveTarget::Absolute(position) => channel.move_to(position).await?,
            MoveTarget::Relative(delta) => channel.move_by(delta).await?,
        }

        tracing::info!("Starting motor {} toward {:?}", channel.motor(), self.target);
        let handle = channel.run().await?;
        if channel.is_running().await? {
            tracing::info!("The motor is running.");
        } else {
            tracing::info!("The motor IS NOT running.");
        }

        let completion = handle.wait().await?;
        tracing::info!(
            "Motor {} motion completed at: {}.",
            completion.motor,
            completion.local_time()
        );
        Ok(completion)
    }

    /// Run the move until it completes, fails or `interrupt` resolves, then
    /// always shut the channel down.
    pub async fn run_until<I>(&self, channel: &mut MotionChannel, interrupt: I) -> Result<JobOutcome, MotionError>
    where
        I: Future<Output = ()>,
    {
        let motor = channel.motor();
        let outcome = tokio::select! {
            result = self.execute(channel) => result.map(JobOutcome::Completed),
            _ = interrupt => {
                tracing::warn!("Interrupted; stopping motor {}", motor);
                Ok(JobOutcome::Interrupted)
            }
        };

        let shutdown = channel.shutdown().await;
        match (outcome, shutdown) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), shutdown) => {
                if let Err(shutdown_err) = shutdown {
                    tracing::error!("Shutdown after failed move also failed: {}", shutdown_err);
                }
                Err(e)
            }
        }
    }
}
