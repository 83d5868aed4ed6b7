use anyhow::Result;
use clap::Parser;
use inputtrace::{CaptureSessionBuilder, InputTraceConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "inputtrace")]
#[command(about = "Multi-modal human-interaction telemetry recorder")]
#[command(version)]
#[command(long_about = "Records pointer, keyboard, screen-region and webcam telemetry into \
append-only binary logs, one stream per file, while exposing the captured data for live \
consumption. Capture runs until interrupted (Ctrl-C) or until the optional duration elapses.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "inputtrace.toml", help = "Path to TOML configuration file")]
    config: String,

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
    #[arg(long, help = "Validate configuration file and exit without recording")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Stop recording after this many seconds
    #[arg(long, value_name = "SECONDS", help = "Stop recording after the given number of seconds")]
    duration: Option<f64>,

    /// Seconds between buffer drains
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 0.2,
        help = "Interval between fetch-buffer drains"
    )]
    fetch_interval: f64,

    /// Abort if any capture source fails to start
    #[arg(long, help = "Treat a single source failing to start as fatal for the whole session")]
    strict: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Directory for a rolling log file in addition to stderr
    #[arg(long, value_name = "DIR", help = "Write daily-rolling log files into this directory")]
    log_dir: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Initialize logging; the guard must outlive main for file logging.
    let _log_guard = init_logging(&args)?;

    info!("Starting inputtrace v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let config = match InputTraceConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    // Build the session and start every configured source.
    let mut session = CaptureSessionBuilder::new(config).build()?;
    let report = session.start()?;

    for (stream, e) in &report.failed {
        warn!("Source '{}' failed to start: {}", stream, e);
    }
    if report.all_failed() {
        error!("Every capture source failed to start");
        session.stop();
        std::process::exit(1);
    }
    if args.strict && report.any_failed() {
        error!("Aborting: {} source(s) failed to start", report.failed.len());
        session.stop();
        std::process::exit(1);
    }

    // Ctrl-C clears the shutdown flag observed below; stop() then runs on
    // the normal exit path, never from the signal handler itself.
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Interrupt received, shutting down");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    info!(
        "Recording into {} ({} sources)",
        session.dir().display(),
        report.started.len()
    );

    let started = Instant::now();
    let fetch_interval = Duration::from_secs_f64(args.fetch_interval.max(0.01));
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(fetch_interval);

        let drained = session.drain();
        if !drained.is_empty() {
            info!(
                "Drained {} pointer bytes, {} keyboard bytes, {} screen frames, {} webcam frames",
                drained.pointer_bytes,
                drained.keyboard_bytes,
                drained.screen_frames,
                drained.webcam_frames
            );
        }

        if let Some(duration) = args.duration {
            if started.elapsed().as_secs_f64() >= duration {
                info!("Configured duration elapsed, shutting down");
                break;
            }
        }
    }

    let failures = session.stop();
    for (stream, e) in &failures {
        error!("Stream '{}' ended with failure: {}", stream, e);
    }
    info!("Session written to {}", session.dir().display());

    if failures.is_empty() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

type LogGuard = Option<tracing_appender::non_blocking::WorkerGuard>;

fn init_logging(args: &Args) -> Result<LogGuard> {
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

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("inputtrace={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    // Optional rolling file output
    if let Some(log_dir) = &args.log_dir {
        let appender = tracing_appender::rolling::daily(log_dir, "inputtrace.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        return Ok(Some(guard));
    }

    registry.init();
    Ok(None)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Inputtrace Configuration File");
    println!("# Default configuration with all available options");
    println!();
    println!("{}", toml::to_string_pretty(&InputTraceConfig::default())?);
    Ok(())
}
