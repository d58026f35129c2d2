// src/motion/channel.rs - Stepper motion over the MCU bridge
use chrono::{DateTime, Local, Utc};
use std::time::Duration;
use tokio::sync::oneshot;

use super::MotionError;
use crate::hardware::{McuCommand, McuConnection, McuEvent, MotorId};

/// Driver wiring for one stepper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepperPins {
    pub pulse: u8,
    pub direction: u8,
    pub enable: u8,
    pub enable_active_low: bool,
}

impl StepperPins {
    /// Level that energises the driver.
    fn enabled_level(&self) -> bool {
        !self.enable_active_low
    }

    fn disabled_level(&self) -> bool {
        self.enable_active_low
    }
}

/// Lifecycle of the channel. Only one move may be outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPhase {
    Idle,
    Configured,
    MoveIssued,
    Running,
    Completed,
    Shutdown,
}

/// One-shot notification that a move finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    pub motor: MotorId,
    pub finished_at: DateTime<Utc>,
}

impl Completion {
    pub fn local_time(&self) -> String {
        self.finished_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Pending completion of a started move. Resolves exactly once.
#[derive(Debug)]
pub struct MoveHandle {
    motor: MotorId,
    rx: oneshot::Receiver<i64>,
}

impl MoveHandle {
    pub fn motor(&self) -> MotorId {
        self.motor
    }

    /// Wait for the board to report the move finished.
    pub async fn wait(self) -> Result<Completion, MotionError> {
        let timestamp = self.rx.await.map_err(|_| MotionError::CompletionLost)?;
        let finished_at =
            DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or(MotionError::BadTimestamp(timestamp))?;
        Ok(Completion {
            motor: self.motor,
            finished_at,
        })
    }

    pub async fn wait_timeout(self, limit: Duration) -> Result<Completion, MotionError> {
        tokio::time::timeout(limit, self.wait())
            .await
            .map_err(|_| MotionError::CompletionTimeout(limit))?
    }
}

/// Drives a single stepper through configure, move, run and shutdown.
pub struct MotionChannel {
    conn: McuConnection,
    motor: MotorId,
    pins: Option<StepperPins>,
    phase: MotionPhase,
    reply_timeout: Duration,
}

impl MotionChannel {
    pub fn new(conn: McuConnection, motor: MotorId, reply_timeout: Duration) -> Self {
        Self {
            conn,
            motor,
            pins: None,
            phase: MotionPhase::Idle,
            reply_timeout,
        }
    }

    pub fn motor(&self) -> MotorId {
        self.motor
    }

    pub fn connection(&self) -> &McuConnection {
        &self.conn
    }

    /// Current phase. A running move whose notification has been delivered
    /// reads as `Completed`.
    pub fn phase(&self) -> MotionPhase {
        match self.phase {
            MotionPhase::Running if !self.conn.completion_pending() => MotionPhase::Completed,
            phase => phase,
        }
    }

    fn require_ready(&mut self, action: &'static str) -> Result<(), MotionError> {
        self.phase = self.phase();
        match self.phase {
            MotionPhase::Configured | MotionPhase::Completed => Ok(()),
            MotionPhase::MoveIssued | MotionPhase::Running => Err(MotionError::Busy),
            phase => Err(MotionError::InvalidState { phase, action }),
        }
    }

    async fn execute(&self, command: McuCommand) -> Result<(), MotionError> {
        self.conn.execute(&command, self.reply_timeout).await?;
        Ok(())
    }

    /// Bind the pulse, direction and enable lines and energise the driver.
    pub async fn configure(&mut self, pins: StepperPins) -> Result<(), MotionError> {
        if self.phase != MotionPhase::Idle {
            return Err(MotionError::InvalidState {
                phase: self.phase(),
                action: "configure",
            });
        }
        tracing::info!(
            "Configuring motor {}: pulse={} dir={} enable={}",
            self.motor,
            pins.pulse,
            pins.direction,
            pins.enable
        );
        self.execute(McuCommand::PinOutput { pin: pins.enable }).await?;
        // From here on shutdown must drive the enable line.
        self.pins = Some(pins);
        self.execute(McuCommand::StepperConfig {
            motor: self.motor,
            pulse_pin: pins.pulse,
            direction_pin: pins.direction,
        })
        .await?;
        self.execute(McuCommand::PinWrite {
            pin: pins.enable,
            high: pins.enabled_level(),
        })
        .await?;
        self.phase = MotionPhase::Configured;
        Ok(())
    }

    /// Declare the current physical position to be `position`.
    pub async fn set_origin(&mut self, position: i64) -> Result<(), MotionError> {
        self.require_ready("set origin")?;
        self.execute(McuCommand::SetPosition {
            motor: self.motor,
            position,
        })
        .await
    }

    pub async fn set_limits(&mut self, max_speed: f64, acceleration: f64) -> Result<(), MotionError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(max_speed) || !valid(acceleration) {
            return Err(MotionError::InvalidLimits {
                max_speed,
                acceleration,
            });
        }
        self.require_ready("set limits")?;
        self.execute(McuCommand::MaxSpeed {
            motor: self.motor,
            speed: max_speed,
        })
        .await?;
        self.execute(McuCommand::Acceleration {
            motor: self.motor,
            accel: acceleration,
        })
        .await
    }

    /// Program an absolute target. Returns once the board accepted it.
    pub async fn move_to(&mut self, position: i64) -> Result<(), MotionError> {
        self.require_ready("move")?;
        self.execute(McuCommand::MoveTo {
            motor: self.motor,
            position,
        })
        .await?;
        self.phase = MotionPhase::MoveIssued;
        Ok(())
    }

    /// Program a target relative to the current position.
    pub async fn move_by(&mut self, delta: i64) -> Result<(), MotionError> {
        self.require_ready("move")?;
        self.execute(McuCommand::MoveBy {
            motor: self.motor,
            delta,
        })
        .await?;
        self.phase = MotionPhase::MoveIssued;
        Ok(())
    }

    /// Start the issued move. The returned handle resolves when the board
    /// reports completion.
    pub async fn run(&mut self) -> Result<MoveHandle, MotionError> {
        match self.phase() {
            MotionPhase::MoveIssued => {}
            MotionPhase::Running => return Err(MotionError::Busy),
            phase => return Err(MotionError::InvalidState { phase, action: "run" }),
        }
        let rx = self.conn.expect_completion(self.motor)?;
        if let Err(e) = self.execute(McuCommand::Run { motor: self.motor }).await {
            self.conn.cancel_completion();
            return Err(e);
        }
        self.phase = MotionPhase::Running;
        Ok(MoveHandle { motor: self.motor, rx })
    }

    /// Ask the board whether the motor is moving.
    pub async fn is_running(&self) -> Result<bool, MotionError> {
        let phase = self.phase();
        if matches!(phase, MotionPhase::Idle | MotionPhase::Shutdown) {
            return Err(MotionError::InvalidState {
                phase,
                action: "query running state",
            });
        }
        let command = McuCommand::IsRunning { motor: self.motor };
        match self.conn.request(&command, self.reply_timeout).await? {
            McuEvent::Running { running, .. } => Ok(running),
            other => Err(crate::hardware::LinkError::UnexpectedReply {
                command: command.to_line(),
                reply: other.to_string(),
            }
            .into()),
        }
    }

    /// Disable the driver and release the board. Safe to call repeatedly.
    pub async fn shutdown(&mut self) -> Result<(), MotionError> {
        if self.phase == MotionPhase::Shutdown {
            return Ok(());
        }
        if self.phase() == MotionPhase::Running {
            tracing::warn!("Shutting down motor {} with a move in flight", self.motor);
        }
        tracing::info!("Shutting down motor {}", self.motor);
        if let Some(pins) = self.pins {
            self.execute(McuCommand::PinWrite {
                pin: pins.enable,
                high: pins.disabled_level(),
            })
            .await?;
        }
        self.execute(McuCommand::Shutdown).await?;
        self.conn.cancel_completion();
        self.phase = MotionPhase::Shutdown;
        tracing::debug!("Link stats at shutdown: {:?}", self.conn.stats());
        Ok(())
    }
}

impl Drop for MotionChannel {
    fn drop(&mut self) {
        if self.phase == MotionPhase::Shutdown || self.conn.is_closed() {
            return;
        }
        tracing::warn!("Motion channel dropped without shutdown; disabling motor {}", self.motor);
        if let Some(pins) = self.pins {
            let _ = self.conn.post(&McuCommand::PinWrite {
                pin: pins.enable,
                high: pins.disabled_level(),
            });
        }
        let _ = self.conn.post(&McuCommand::Shutdown);
    }
}

impl std::fmt::Debug for MotionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionChannel")
            .field("motor", &self.motor)
            .field("pins", &self.pins)
            .field("phase", &self.phase())
            .finish()
    }
}
