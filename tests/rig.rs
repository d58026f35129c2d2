// Integration tests for the plan -> sweep -> finalize pipeline

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

use panlapse::camera::{Camera, CameraError};
use panlapse::config::Config;
use panlapse::finalize::FinalizeError;
use panlapse::{PanOptions, Rig, RigError};

#[derive(Default)]
struct StillCamera {
    moves: Mutex<Vec<i32>>,
}

#[async_trait]
impl Camera for StillCamera {
    async fn move_to(&self, pan: i32, _tilt: i32) -> Result<(), CameraError> {
        self.moves.lock().unwrap().push(pan);
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Vec<u8>, CameraError> {
        Ok(b"jpeg".to_vec())
    }
}

fn quick_config(dir: &Path, encoder: &str) -> Config {
    let mut config = Config::default();
    config.capture.output_dir = dir.join("out");
    config.finalize.program = encoder.to_string();
    config.finalize.output = dir.join("video.mp4");
    config.sweep.horizon = [-110, -80];
    config.sweep.steps = 6;
    config.sweep.interval_secs = 0;
    config.sweep.lag_secs = 0;
    config.validate().unwrap();
    config
}

#[test]
fn test_default_plan() {
    let rig = Rig::new(Config::default());
    let plan = rig.plan().unwrap();
    assert_eq!(plan.len(), 90);
    assert_eq!(plan.step(), 2);
    assert_eq!(plan.get(0), Some(-120));
    assert_eq!(plan.get(89), Some(58));
}

#[test]
fn test_plan_errors_surface() {
    let mut config = Config::default();
    config.sweep.horizon = [10, 10];
    assert!(Rig::new(config).plan().is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_recorded_sweep_is_finalized() {
    let dir = tempfile::tempdir().unwrap();
    let rig = Rig::new(quick_config(dir.path(), "true"));
    // Leftovers from a previous run are cleared before recording.
    rig.frames().reset().await.unwrap();
    std::fs::write(rig.frames().path_for(99, 0), b"stale").unwrap();

    let plan = rig.plan().unwrap();
    let camera = StillCamera::default();
    let options = PanOptions {
        record: true,
        ..PanOptions::default()
    };
    let outcome = rig.sweep(&camera, &plan, &options).await.unwrap();

    assert_eq!(outcome.video, Some(dir.path().join("video.mp4")));
    assert_eq!(outcome.report.captures.len(), 6);
    assert_eq!(rig.frames().list_frames().await.unwrap().len(), 6);
    assert!(!rig.frames().path_for(99, 0).exists());
}

#[tokio::test]
async fn test_unrecorded_sweep_skips_finalize() {
    let dir = tempfile::tempdir().unwrap();
    // The encoder would fail to start if it were invoked.
    let rig = Rig::new(quick_config(dir.path(), "panlapse-no-such-encoder"));
    let plan = rig.plan().unwrap();
    let camera = StillCamera::default();

    let outcome = rig.sweep(&camera, &plan, &PanOptions::default()).await.unwrap();
    assert_eq!(outcome.video, None);
    assert_eq!(outcome.report.steps, 6);
    assert!(outcome.report.captures.is_empty());
    assert_eq!(camera.moves.lock().unwrap().len(), 6);
    assert!(!rig.frames().dir().exists());
}

#[tokio::test]
async fn test_finalize_without_frames() {
    let dir = tempfile::tempdir().unwrap();
    let rig = Rig::new(quick_config(dir.path(), "true"));
    assert!(matches!(
        rig.finalize().await,
        Err(RigError::Finalize(FinalizeError::NoFrames(_)))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unusable_frame_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path(), "true");
    // A plain file where the frame directory should be.
    std::fs::write(&config.capture.output_dir, b"not a directory").unwrap();
    let rig = Rig::new(config);
    let plan = rig.plan().unwrap();
    let options = PanOptions {
        record: true,
        ..PanOptions::default()
    };
    let result = rig.sweep(&StillCamera::default(), &plan, &options).await;
    assert!(matches!(result, Err(RigError::Io(_))));
}
