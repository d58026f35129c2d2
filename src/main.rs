// src/main.rs - panlapse command line
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use panlapse::config::{self, Config, Credentials, McuConfig};
use panlapse::hardware::{CompletionMode, McuConnection, SimulatedBoard};
use panlapse::motion::{JobOutcome, MotionChannel, MoveJob, MoveTarget};
use panlapse::{AxisCamera, PanOptions, Rig};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

const DEFAULT_CONFIG: &str = "panlapse.toml";
const EXIT_INTERRUPTED: u8 = 130;
const DEFAULT_STEPPER_TARGET: i64 = 2000;

/// Time-lapse rig controller
#[derive(Parser, Debug)]
#[command(name = "panlapse", version, about = "Pan a PTZ camera, capture frames and stitch them into a video.")]
struct Cli {
    /// Path to a TOML config file (defaults to ./panlapse.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep the camera through the pan plan
    Pan(PanArgs),
    /// Encode already captured frames into the output video
    Finalize,
    /// Move the stepper motor and wait for completion
    Stepper(StepperArgs),
}

#[derive(Args, Debug)]
struct PanArgs {
    /// Reverse direction at each end of the plan instead of stopping
    #[arg(short, long)]
    oscillate: bool,

    /// Save images
    #[arg(short, long)]
    record: bool,

    /// Finalize only
    #[arg(short, long)]
    finalize: bool,

    /// Exit before action
    #[arg(short, long)]
    test: bool,

    /// Stop after this many steps
    #[arg(long)]
    max_steps: Option<usize>,
}

#[derive(Args, Debug)]
struct StepperArgs {
    /// Absolute target position in steps
    #[arg(long, allow_hyphen_values = true, conflicts_with = "by")]
    to: Option<i64>,

    /// Relative move in steps
    #[arg(long, allow_hyphen_values = true)]
    by: Option<i64>,

    /// Drive a simulated board instead of the serial port
    #[arg(long)]
    simulate: bool,
}

impl StepperArgs {
    fn target(&self) -> MoveTarget {
        match (self.to, self.by) {
            (_, Some(delta)) => MoveTarget::Relative(delta),
            (Some(position), None) => MoveTarget::Absolute(position),
            (None, None) => MoveTarget::Absolute(DEFAULT_STEPPER_TARGET),
        }
    }
}

fn load(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            tracing::info!("Loading configuration from: {}", DEFAULT_CONFIG);
            config::load_config(DEFAULT_CONFIG)
        }
        None => {
            tracing::info!("No {} found; using built-in defaults", DEFAULT_CONFIG);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn confirm(question: &str) -> bool {
    let mut stdout = tokio::io::stdout();
    if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
        return false;
    }
    let mut answer = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut answer).await {
        Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
        Err(_) => false,
    }
}

async fn pan(config: Config, args: PanArgs) -> Result<ExitCode, BoxError> {
    let rig = Rig::new(config);
    let plan = rig.plan()?;

    if args.test {
        return Ok(ExitCode::SUCCESS);
    }
    if args.finalize {
        rig.finalize().await?;
        return Ok(ExitCode::SUCCESS);
    }

    let credentials = Credentials::resolve(&rig.config().camera)?;
    tracing::info!("Camera: {} as {}", credentials.host, credentials.username);
    let camera = AxisCamera::new(&credentials, &rig.config().camera, rig.config().camera_timeout())?;
    let options = PanOptions {
        oscillate: args.oscillate,
        record: args.record,
        max_steps: args.max_steps,
    };

    tokio::select! {
        outcome = rig.sweep(&camera, &plan, &options) => {
            let outcome = outcome?;
            if let Some(video) = outcome.video {
                tracing::info!("Time-lapse written to {}", video.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        _ = interrupted() => {
            tracing::warn!("Sweep interrupted; frames captured so far stay in {}", rig.frames().dir().display());
            if confirm("Do you want to finalize? (y/N): ").await {
                rig.finalize().await?;
                Ok(ExitCode::SUCCESS)
            } else {
                tracing::info!("Exiting...");
                Ok(ExitCode::from(EXIT_INTERRUPTED))
            }
        }
    }
}

fn mcu_description(mcu: &McuConfig, simulate: bool) -> String {
    if simulate {
        "simulated board (no serial port opened)".to_string()
    } else {
        format!("{} @ {} baud", mcu.serial, mcu.baud)
    }
}

async fn stepper(config: Config, args: StepperArgs) -> Result<ExitCode, BoxError> {
    let conn = if args.simulate {
        let (_board, link) = SimulatedBoard::spawn(CompletionMode::Timed);
        McuConnection::from_stream(link)
    } else {
        McuConnection::open(&config.mcu.serial, config.mcu.baud)?
    };
    tracing::info!("MCU: {}", mcu_description(&config.mcu, args.simulate));
    tracing::info!(
        "Max speed: {} steps/s, acceleration: {} steps/s²",
        config.stepper.max_speed,
        config.stepper.acceleration
    );

    let mut channel = MotionChannel::new(conn, config.stepper.motor, config.mcu.reply_timeout());
    let job = MoveJob::from_config(&config.stepper, args.target());
    match job.run_until(&mut channel, interrupted()).await? {
        JobOutcome::Completed(_) => Ok(ExitCode::SUCCESS),
        JobOutcome::Interrupted => Ok(ExitCode::from(EXIT_INTERRUPTED)),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, BoxError> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting panlapse {}", env!("CARGO_PKG_VERSION"));

    let config = load(cli.config.as_deref()).map_err(|e| {
        tracing::error!("Failed to load config: {}", e);
        Box::new(e) as BoxError
    })?;

    match cli.command {
        Commands::Pan(args) => pan(config, args).await,
        Commands::Finalize => {
            Rig::new(config).finalize().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stepper(args) => stepper(config, args).await,
    }
}
