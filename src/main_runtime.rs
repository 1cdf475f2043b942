use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "greenwave.log";

/// Console plus `<log_dir>/greenwave.log`.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the whole run. If the directory is not writable only the console layer
/// is installed.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,greenwave=debug"));

    // `rolling::never` panics if it cannot open the file, so check first.
    let writable = std::fs::create_dir_all(log_dir).is_ok()
        && std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(LOG_FILE))
            .is_ok();

    let (file_layer, guard) = if writable {
        let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        eprintln!(
            "Warning: Could not write to log directory {}, file logging disabled",
            log_dir.display()
        );
        (None, None)
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed && guard.is_some() {
        eprintln!("Logging to: {}", log_dir.join(LOG_FILE).display());
    }
    guard
}
