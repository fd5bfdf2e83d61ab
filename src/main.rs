use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use taskhive::config::HiveConfig;
use taskhive::ports::{LogNotificationSink, SystemClock};
use taskhive::scheduler::IntervalTicker;
use taskhive::storage::Storage;
use taskhive::CoreContext;

#[derive(Parser)]
#[command(
    name = "taskhive",
    about = "TaskHive — group task engine daemon",
    version
)]
struct Args {
    /// Data directory for config and the SQLite database
    #[arg(long, env = "TASKHIVE_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKHIVE_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TASKHIVE_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,

    /// Seconds between scheduler ticks (recurrence + overdue sweep)
    #[arg(long, env = "TASKHIVE_TICK_SECS")]
    tick_secs: Option<u64>,
}

/// Initialize tracing. Returns the appender guard when logging to a file —
/// dropping it would lose buffered lines.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("taskhive.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .init();
        }
        Some(guard)
    } else {
        if use_json {
            tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        } else {
            tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        }
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(HiveConfig::default_data_dir);
    let mut config = HiveConfig::load(data_dir);

    // CLI / env var  >  TOML  >  built-in default.
    if let Some(log) = args.log {
        config.log = log;
    }
    if let Some(tick) = args.tick_secs {
        config.scheduler.tick_interval_secs = tick;
    }

    let _log_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    info!(
        data_dir = %config.data_dir.display(),
        tick_secs = config.scheduler.tick_interval_secs,
        "taskhive starting"
    );

    let storage = Storage::new(&config.data_dir).await?;
    let ctx = CoreContext::new(
        Arc::new(config.clone()),
        &storage,
        Arc::new(SystemClock),
        Arc::new(LogNotificationSink),
    );

    let scheduler = ctx.scheduler();
    let ticker = IntervalTicker::every(Duration::from_secs(
        config.scheduler.tick_interval_secs.max(1),
    ));

    tokio::select! {
        _ = scheduler.run(ticker) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received — exiting");
        }
    }

    Ok(())
}
