use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Where rolling log files land, honoring the BLOCKVAULT_LOG_DIR override.
fn log_dir() -> PathBuf {
    if let Ok(env_dir) = std::env::var("BLOCKVAULT_LOG_DIR") {
        return PathBuf::from(env_dir);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".blockvault/logs")
}

/// Install the global tracing subscriber for a host component.
///
/// Files roll daily under the log dir with the component name as prefix
/// (e.g. `vault.log.2026-08-22`). The returned guard must be held for the
/// process lifetime or buffered lines are lost on shutdown.
pub fn init_logging(component: &str, to_stderr: bool) -> WorkerGuard {
    let dir = log_dir();
    let _ = std::fs::create_dir_all(&dir);

    let file_appender = tracing_appender::rolling::daily(&dir, component);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if to_stderr {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);
        registry.with(stderr_layer).init();
    } else {
        registry.init();
    }

    guard
}
