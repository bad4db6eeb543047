use std::path::Path;

use tag_trainer::config::LoggingConfig;
use tokio::signal;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "tag-trainer.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file appender and must live as long as
/// the process logs.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tag_trainer=debug", config.level)));

    let log_dir = config
        .dir
        .clone()
        .or_else(|| std::env::var("TAG_TRAINER_LOG_DIR").ok().map(Into::into));

    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial log file, so writability is checked first.
    let (file_layer, guard) = match log_dir.as_deref().map(writable_dir) {
        Some(Ok(dir)) => {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Warning: {}, file logging disabled", e);
            (None, None)
        }
        None => (None, None),
    };

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/{}", dir.display(), LOG_FILE);
    }
    guard
}

fn writable_dir(dir: &Path) -> Result<&Path, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("could not create log directory {} ({})", dir.display(), e))?;
    let probe = dir.join(".tag_trainer_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)
        .map_err(|e| format!("could not write to log directory {} ({})", dir.display(), e))?;
    let _ = std::fs::remove_file(&probe);
    Ok(dir)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
