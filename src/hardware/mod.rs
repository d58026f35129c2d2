// src/hardware/mod.rs - Link to the motor-controller bridge
pub mod protocol;
pub mod serial;
pub mod sim;

use std::time::Duration;
use thiserror::Error;

pub use protocol::{McuCommand, McuEvent, MotorId};
pub use serial::{LinkStats, McuConnection};
pub use sim::{BoardState, CompletionMode, SimulatedBoard};

/// Transport faults talking to the bridge. Always fatal to the current
/// motor operation.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to open serial port '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Serial connection closed")]
    Closed,
    #[error("Timeout after {after:?} waiting for reply to '{command}'")]
    Timeout { after: Duration, command: String },
    #[error("MCU rejected '{command}': {message}")]
    Rejected { command: String, message: String },
    #[error("Unexpected reply to '{command}': {reply}")]
    UnexpectedReply { command: String, reply: String },
}
