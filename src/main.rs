use anyhow::Result;
use clap::Parser;
use doorwatch::{DoorwatchConfig, FeedOrchestrator};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "doorwatch")]
#[command(about = "Terminal display client for a door-safety detection feed")]
#[command(version)]
#[command(long_about = "A terminal client for a door-safety object-detection notification \
feed. Connects to the feed server, shows new detection images as they are announced, and \
keeps a locally persisted, newest-first history of past detections.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "doorwatch.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the client")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Run without the keyboard listener (no raw mode, no refresh gesture)
    #[arg(long, help = "Run headless - no keyboard input, suitable for service use")]
    headless: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Append logs to a file instead of stderr
    #[arg(long, value_name = "PATH", help = "Write logs to the given file")]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // The guard must live until exit so buffered file logs are flushed
    let _log_guard = init_logging(&args)?;

    info!("Starting Doorwatch client v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match DoorwatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
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

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let orchestrator = FeedOrchestrator::new(config, args.headless).map_err(|e| {
        error!("Failed to create client: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Client error during execution: {}", e);
        e
    })?;

    info!("Doorwatch client exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("doorwatch={}", log_level)));

    let mut guard = None;

    let fmt_layer = if let Some(path) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (writer, worker_guard) = tracing_appender::non_blocking(file);
        guard = Some(worker_guard);

        match args.log_format.as_deref() {
            Some("json") => fmt::layer().json().with_writer(writer).boxed(),
            Some("compact") => fmt::layer().compact().with_writer(writer).boxed(),
            _ => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        }
    } else {
        match args.log_format.as_deref() {
            Some("json") => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed(),
            Some("compact") => fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .boxed(),
            Some("pretty") | None => fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed(),
            Some(format) => {
                eprintln!("Warning: Unknown log format '{}', using default", format);
                fmt::layer().with_writer(std::io::stderr).boxed()
            }
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Doorwatch Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = DoorwatchConfig::default();
    println!("{}", toml::to_string_pretty(&default_config)?);

    println!("# history.max_entries caps persisted history when set; unbounded by default");
    println!("# max_entries = 500");
    Ok(())
}
