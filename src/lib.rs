//! panlapse: pan a networked PTZ camera through a plan of angles, capture a
//! frame at each stop and encode the frames into a time-lapse video. A
//! separate command drives a stepper motor through a microcontroller bridge.

pub mod camera;
pub mod config;
pub mod file_manager;
pub mod finalize;
pub mod hardware;
pub mod motion;
pub mod rig;
pub mod sweep;

pub use camera::{AxisCamera, Camera, CameraError};
pub use config::{load_config, Config, ConfigError, Credentials};
pub use file_manager::{CaptureRecord, FrameStore};
pub use finalize::{FinalizeError, Finalizer};
pub use hardware::{LinkError, McuConnection, SimulatedBoard};
pub use motion::{Completion, MotionChannel, MotionError, MotionPhase, MoveJob, MoveTarget};
pub use rig::{PanOptions, Rig, RigError};
pub use sweep::{PanPlan, PlanError, SweepReport, SweepRunner, SweepSettings};
