//! Tracing setup: stdout plus a daily-rolling file in the app data dir.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::AppPaths;

/// Default directives: app internals at debug, sqlx statement logging
/// quieted to warn so per-chunk upserts don't flood the file.
const DEFAULT_FILTER: &str = "info,studyhall_backend=debug,sqlx=warn";

const LOG_FILE: &str = "studyhall.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init(paths: &AppPaths) {
    let _ = std::fs::create_dir_all(&paths.log_dir);

    let file_appender = tracing_appender::rolling::daily(&paths.log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(build_filter(std::env::var("STUDYHALL_LOG").ok().as_deref()))
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// `STUDYHALL_LOG` wins, then `RUST_LOG`, then the app defaults.
fn build_filter(override_directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = override_directives {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn explicit_directives_take_precedence() {
        let filter = build_filter(Some("trace"));
        assert_eq!(filter.to_string(), "trace");
    }
}
