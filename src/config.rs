//! # Rig Configuration
//!
//! Everything the rig needs except camera credentials lives in one TOML file.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [camera]
//! tilt = 14
//! credentials_file = "/etc/panlapse/secrets.toml"
//!
//! [sweep]
//! horizon = [-110, -80]
//! steps = 6
//! interval_secs = 6
//! lag_secs = 3
//!
//! [mcu]
//! serial = "/dev/ttyACM0"
//!
//! [stepper]
//! pulse_pin = 3
//! direction_pin = 6
//! enable_pin = 8
//! ```
//!
//! Every section and field is optional; omitted values fall back to the
//! long-sweep rig defaults.
//!
//! Credentials are resolved separately by [`Credentials::resolve`], from the
//! environment or a secrets file, so the main config can be committed.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_CAMERA_HOST: &str = "PANLAPSE_CAMERA_HOST";
pub const ENV_CAMERA_USER: &str = "PANLAPSE_CAMERA_USER";
pub const ENV_CAMERA_PASS: &str = "PANLAPSE_CAMERA_PASS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Missing camera credential '{0}' (set {1} or camera.credentials_file)")]
    MissingCredential(&'static str, &'static str),
}

/// Main configuration struct for the camera, sweep, capture, encoder and motor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub finalize: FinalizeConfig,
    #[serde(default)]
    pub mcu: McuConfig,
    #[serde(default)]
    pub stepper: StepperConfig,
}

/// PTZ camera settings. Host and login are deliberately absent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_tilt")]
    pub tilt: i32,
    #[serde(default = "default_zoom")]
    pub zoom: u32,
    #[serde(default = "default_ptz_path")]
    pub ptz_path: String,
    #[serde(default = "default_jpeg_path")]
    pub jpeg_path: String,
    /// Request timeout; `None` uses the sweep interval.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            tilt: default_tilt(),
            zoom: default_zoom(),
            ptz_path: default_ptz_path(),
            jpeg_path: default_jpeg_path(),
            timeout_secs: None,
            credentials_file: None,
        }
    }
}

/// Pan sweep geometry and pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepConfig {
    /// Start and stop pan angle in degrees.
    #[serde(default = "default_horizon")]
    pub horizon: [i32; 2],
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Seconds between consecutive moves.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Seconds to wait after a move before capturing.
    #[serde(default = "default_lag")]
    pub lag_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            steps: default_steps(),
            interval_secs: default_interval(),
            lag_secs: default_lag(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn lag(&self) -> Duration {
        Duration::from_secs(self.lag_secs)
    }
}

/// Where captured frames go.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_frame_name")]
    pub frame_name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            frame_name: default_frame_name(),
        }
    }
}

/// External encoder invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinalizeConfig {
    #[serde(default = "default_encoder")]
    pub program: String,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    #[serde(default = "default_vcodec")]
    pub vcodec: String,
    #[serde(default = "default_output_video")]
    pub output: PathBuf,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            program: default_encoder(),
            framerate: default_framerate(),
            vcodec: default_vcodec(),
            output: default_output_video(),
        }
    }
}

/// Microcontroller bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McuConfig {
    #[serde(default = "default_serial")]
    pub serial: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,
}

impl Default for McuConfig {
    fn default() -> Self {
        Self {
            serial: default_serial(),
            baud: default_baud(),
            reply_timeout_ms: default_reply_timeout(),
        }
    }
}

impl McuConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Stepper driver wiring and motion limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepperConfig {
    #[serde(default)]
    pub motor: u8,
    #[serde(default = "default_pulse_pin")]
    pub pulse_pin: u8,
    #[serde(default = "default_direction_pin")]
    pub direction_pin: u8,
    #[serde(default = "default_enable_pin")]
    pub enable_pin: u8,
    /// TB6600 and CNC-shield drivers are enabled by pulling the line low.
    #[serde(default = "default_true")]
    pub enable_active_low: bool,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            motor: 0,
            pulse_pin: default_pulse_pin(),
            direction_pin: default_direction_pin(),
            enable_pin: default_enable_pin(),
            enable_active_low: true,
            max_speed: default_max_speed(),
            acceleration: default_acceleration(),
            settle_ms: default_settle(),
        }
    }
}

impl Config {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep.steps < 3 {
            return Err(ConfigError::Invalid(format!(
                "sweep.steps must be >= 3, got {}",
                self.sweep.steps
            )));
        }
        if self.sweep.lag_secs > self.sweep.interval_secs {
            return Err(ConfigError::Invalid(format!(
                "sweep.lag_secs ({}) exceeds sweep.interval_secs ({})",
                self.sweep.lag_secs, self.sweep.interval_secs
            )));
        }
        if self.finalize.framerate == 0 {
            return Err(ConfigError::Invalid("finalize.framerate must be > 0".to_string()));
        }
        if self.stepper.max_speed <= 0.0 || self.stepper.acceleration <= 0.0 {
            return Err(ConfigError::Invalid(
                "stepper.max_speed and stepper.acceleration must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn camera_timeout(&self) -> Duration {
        Duration::from_secs(self.camera.timeout_secs.unwrap_or(self.sweep.interval_secs))
    }
}

/// Camera host and digest login.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    /// Resolve credentials from the process environment, falling back to the
    /// secrets file named in `camera.credentials_file`.
    pub fn resolve(camera: &CameraConfig) -> Result<Self, ConfigError> {
        Self::resolve_with(camera, |key| std::env::var(key).ok())
    }

    /// Same as [`Credentials::resolve`] with an injectable variable lookup.
    pub fn resolve_with<F>(camera: &CameraConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match &camera.credentials_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str::<SecretsFile>(&contents)?
            }
            None => SecretsFile::default(),
        };

        let pick = |env: &'static str, from_file: Option<String>, field: &'static str| {
            lookup(env)
                .filter(|v| !v.is_empty())
                .or(from_file)
                .ok_or(ConfigError::MissingCredential(field, env))
        };

        Ok(Self {
            host: pick(ENV_CAMERA_HOST, file.host, "host")?,
            username: pick(ENV_CAMERA_USER, file.username, "username")?,
            password: pick(ENV_CAMERA_PASS, file.password, "password")?,
        })
    }
}

// Default value functions
fn default_tilt() -> i32 { 14 }
fn default_zoom() -> u32 { 1 }
fn default_ptz_path() -> String { "/axis-cgi/com/ptz.cgi".to_string() }
fn default_jpeg_path() -> String { "/jpg/image.jpg".to_string() }
fn default_horizon() -> [i32; 2] { [-120, 60] }
fn default_steps() -> u32 { 90 }
fn default_interval() -> u64 { 20 }
fn default_lag() -> u64 { 5 }
fn default_output_dir() -> PathBuf { PathBuf::from("out") }
fn default_frame_name() -> String { "frame".to_string() }
fn default_encoder() -> String { "ffmpeg".to_string() }
fn default_framerate() -> u32 { 30 }
fn default_vcodec() -> String { "libx264".to_string() }
fn default_output_video() -> PathBuf { PathBuf::from("output.mp4") }
fn default_serial() -> String { "/dev/ttyACM0".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_reply_timeout() -> u64 { 1000 }
fn default_pulse_pin() -> u8 { 3 }
fn default_direction_pin() -> u8 { 6 }
fn default_enable_pin() -> u8 { 8 }
fn default_true() -> bool { true }
fn default_max_speed() -> f64 { 800.0 }
fn default_acceleration() -> f64 { 800.0 }
fn default_settle() -> u64 { 500 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
