use anyhow::{Context, Result};
use camwatch::config::{CameraEntry, CliOverrides};
use camwatch::{CamwatchApp, CamwatchConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "camwatch")]
#[command(about = "Watch RTSP cameras, overlay detections and re-stream them as HLS")]
#[command(version)]
#[command(long_about = "Camwatch pulls live video from a set of RTSP cameras, runs a \
rate-limited detector on each stream, draws the detections onto every frame and \
re-encodes the result as a rolling HLS playlist per camera. Cameras run \
independently; SIGINT or SIGTERM stops them all gracefully.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Camera to watch, repeatable
    #[arg(
        long = "camera",
        value_name = "SPEC",
        help = "Camera as host=<ip>,port=<n>,user=<u>,password=<p>,channel=<c>[,output=<dir>]"
    )]
    cameras: Vec<CameraEntry>,

    /// Username for cameras that do not set one
    #[arg(long, value_name = "USER")]
    global_user: Option<String>,

    /// Password for cameras that do not set one
    #[arg(long, value_name = "PASSWORD")]
    global_password: Option<String>,

    /// RTSP port for cameras that do not set one
    #[arg(long, value_name = "PORT")]
    global_port: Option<u16>,

    /// Stream channel for cameras that do not set one
    #[arg(long, value_name = "CHANNEL")]
    global_channel: Option<String>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Resolve and validate cameras, then exit without starting workers")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily files in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            cameras: self.cameras.clone(),
            global_user: self.global_user.clone(),
            global_password: self.global_password.clone(),
            global_port: self.global_port,
            global_channel: self.global_channel.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(ExitCode::SUCCESS);
    }

    // Returning from main (rather than process::exit) drops the guard and
    // flushes buffered file logs
    let _log_guard = init_logging(&args)?;

    info!("Starting camwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match CamwatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    config.apply_overrides(args.overrides());

    let app = match CamwatchApp::new(config) {
        Ok(app) => app,
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            if args.validate_config {
                eprintln!("✗ Configuration validation failed: {}", e);
                return Ok(ExitCode::FAILURE);
            }
            return Err(e.into());
        }
    };

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid ({} cameras)", app.camera_count());
        return Ok(ExitCode::SUCCESS);
    }

    let exit_code = app.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Camwatch exited with code: {}", exit_code);
    Ok(ExitCode::from(exit_status(exit_code)))
}

/// Process status byte for a supervisor exit code; anything out of range is a failure
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camwatch={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "camwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Camwatch Configuration File");
    println!("# Every setting can also be given as CAMWATCH_<SECTION>__<KEY>");
    println!("#");
    println!("# Cameras are listed as:");
    println!("# [[cameras]]");
    println!("# host = \"192.168.1.10\"");
    println!("# username = \"admin\"");
    println!("# password = \"secret\"");
    println!();

    let rendered = toml::to_string_pretty(&CamwatchConfig::default())
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}
