use anyhow::{Context, Result};
use clap::Parser;
use previewcam::{
    CameraError, CameraEvent, EventBus, FileImageSink, MockCameraHardware, PermissionStatus,
    PreviewcamConfig, SessionController, SessionState, SharedPermission, SurfaceTarget,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "previewcam")]
#[command(about = "Camera session controller simulator")]
#[command(version)]
#[command(long_about = "Drives the camera session controller against simulated camera hardware: \
a preview surface appears, the camera opens (optionally after busy failures), stills are captured \
to disk and the session is torn down. Host events are printed to stdout as JSON lines.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "previewcam.toml", help = "Path to TOML configuration file")]
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

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to this file in addition to stderr")]
    log_file: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Number of busy failures the simulated camera reports before opening
    #[arg(long, default_value_t = 0)]
    busy_failures: usize,

    /// Number of stills to capture once preview is running
    #[arg(long, default_value_t = 1)]
    captures: u32,

    /// Destroy and recreate the preview surface after capturing
    #[arg(long)]
    recreate_surface: bool,

    /// Simulate a user who denied camera permission
    #[arg(long)]
    deny_permission: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting previewcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match PreviewcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    run_simulation(&args, config).await
}

async fn run_simulation(args: &Args, config: PreviewcamConfig) -> Result<()> {
    let hardware = MockCameraHardware::new();
    if args.busy_failures > 0 {
        info!("Simulating {} busy open failures", args.busy_failures);
        hardware.fail_next_opens(
            args.busy_failures,
            CameraError::busy("camera held by another client"),
        );
    }

    let permission = Arc::new(SharedPermission::new(if args.deny_permission {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Granted
    }));

    let bus = EventBus::new(config.system.event_bus_capacity);
    let printer = spawn_event_printer(bus.subscribe());

    let controller = SessionController::builder()
        .config(&config)
        .hardware(Arc::new(hardware.clone()))
        .permission(permission)
        .events(Arc::new(bus))
        .image_sink(Arc::new(FileImageSink::from_config(&config.capture)))
        .build()
        .context("Failed to start session controller")?;

    tokio::select! {
        _ = drive(&controller, args, &config) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted; shutting down");
        }
    }

    let status = controller.status();
    println!("{}", serde_json::to_string(&status)?);

    controller.shutdown().await;
    drop(controller);

    if let Err(e) = printer.await {
        warn!("Event printer ended abnormally: {}", e);
    }

    let stats = hardware.stats();
    info!(
        "Simulation finished: {} open calls, {} acquisitions, {} releases, {} captures",
        stats.open_calls, stats.acquisitions, stats.releases, stats.captures
    );

    Ok(())
}

async fn drive(controller: &SessionController, args: &Args, config: &PreviewcamConfig) {
    let (width, height) = config.camera.resolution;
    let surface = controller.surface();
    let deadline = preview_deadline(config);

    surface.on_available(SurfaceTarget::new(1), width, height);
    if !wait_for_preview(controller, deadline).await {
        return;
    }

    for n in 1..=args.captures {
        match controller.capture().await {
            Ok(image) => info!("Capture {}/{} saved to {}", n, args.captures, image.location),
            Err(e) => warn!("Capture {}/{} failed: {}", n, args.captures, e),
        }
    }

    if args.recreate_surface {
        info!("Recreating preview surface");
        surface.on_destroyed().await;
        surface.on_available(SurfaceTarget::new(2), width, height);
        wait_for_preview(controller, deadline).await;
    }

    controller.flush().await;
}

async fn wait_for_preview(controller: &SessionController, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, controller.wait_for_state(SessionState::PreviewActive)).await {
        Ok(true) => true,
        Ok(false) => {
            warn!("Session worker stopped before preview started");
            false
        }
        Err(_) => {
            warn!("Preview did not start within {:?}", deadline);
            false
        }
    }
}

/// Long enough for stabilization, cooldown and a fully used retry budget
fn preview_deadline(config: &PreviewcamConfig) -> Duration {
    let session = &config.session;
    let retries: u64 = (1..=u64::from(session.retry_limit)).sum();
    Duration::from_millis(
        session.stabilization_delay_ms
            + session.cooldown_ms
            + session.backoff_base_ms.saturating_mul(retries),
    ) + Duration::from_secs(2)
}

fn spawn_event_printer(mut events: broadcast::Receiver<CameraEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!("Failed to serialize {}: {}", event.event_name(), e),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event printer lagged behind by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("previewcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
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
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Previewcam Configuration File");
    println!("# Environment overrides use PREVIEWCAM_<SECTION>__<KEY>, e.g. PREVIEWCAM_SESSION__RETRY_LIMIT=5");
    println!();
    print!("{}", PreviewcamConfig::default().to_toml()?);
    Ok(())
}
