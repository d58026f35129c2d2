// src/motion/mod.rs - Stepper motion channel and the move routine built on it
pub mod channel;
pub mod stepper;

pub use channel::{Completion, MotionChannel, MotionPhase, MoveHandle, StepperPins};
pub use stepper::{JobOutcome, MoveJob, MoveTarget};

use std::time::Duration;
use thiserror::Error;

use crate::hardware::LinkError;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
    #[error("Cannot {action} while the motion channel is {phase:?}")]
    InvalidState { phase: MotionPhase, action: &'static str },
    #[error("A move is already outstanding")]
    Busy,
    #[error("Invalid limits: max_speed={max_speed}, acceleration={acceleration} (both must be > 0)")]
    InvalidLimits { max_speed: f64, acceleration: f64 },
    #[error("Completion notification lost: link closed before the move finished")]
    CompletionLost,
    #[error("Move did not complete within {0:?}")]
    CompletionTimeout(Duration),
    #[error("Board reported an invalid completion timestamp {0}")]
    BadTimestamp(i64),
}
