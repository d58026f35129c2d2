// src/camera/mod.rs - PTZ camera seam used by the sweep
pub mod axis;

pub use axis::AxisCamera;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Camera returned status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Digest authentication failed: {0}")]
    Auth(String),
    #[error("Invalid camera URL: {0}")]
    Url(String),
    #[error("Failed to save frame: {0}")]
    Io(#[from] std::io::Error),
}

/// A camera that can be pointed and asked for a still frame.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Point the camera at `pan`/`tilt` degrees.
    async fn move_to(&self, pan: i32, tilt: i32) -> Result<(), CameraError>;

    /// Fetch one still image.
    async fn capture_frame(&self) -> Result<Vec<u8>, CameraError>;
}
