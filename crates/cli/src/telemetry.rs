//! Process-wide tracing setup.

use std::io::Write;

use tracing_subscriber::EnvFilter;

/// Flushes stdout and stderr when dropped, so the last log lines of a
/// failing run are not lost.
pub struct LogGuard;

impl Drop for LogGuard {
    fn drop(&mut self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

/// Map a `LOG_LEVEL` value (`DEBUG`, `INFO`, `WARN`, ...) to a filter directive.
fn level_directive(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "dpanic" | "panic" | "fatal" => Some("error"),
        _ => None,
    }
}

fn env_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| level_directive(&v))
        .unwrap_or("info");
    EnvFilter::new(level)
}

/// Install the fmt subscriber. `RUST_LOG` wins over `LOG_LEVEL`; the default is `info`.
pub fn init() -> LogGuard {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .init();
    LogGuard
}
