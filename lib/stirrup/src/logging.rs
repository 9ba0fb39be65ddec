//! Thin facade over slog so the rest of the workspace imports a single
//! logging module. Components receive a parent `Logger` and derive children
//! with `o!()` context pairs.

pub use slog::{b, crit, debug, error, info, kv, o, record, record_static, trace, warn};
pub use slog::{Discard, Drain, Level, Logger};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Builds the terminal logger used by all server binaries. The `level` string
/// comes straight from the CLI/config ("trace", "debug", "info", "warning",
/// "error", "critical").
pub fn terminal(level: &str) -> Logger {
    let severity = parse_severity(level).unwrap_or(Severity::Info);

    TerminalLoggerBuilder::new()
        .level(severity)
        .destination(Destination::Stderr)
        .build()
        .expect("Error building terminal logger")
}

/// A logger that swallows everything. Handed to components constructed in
/// tests or before the real logger exists.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

fn parse_severity(level: &str) -> Option<Severity> {
    let severity = match level {
        "trace" => Severity::Trace,
        "debug" => Severity::Debug,
        "info" => Severity::Info,
        "warning" | "warn" => Severity::Warning,
        "error" => Severity::Error,
        "critical" => Severity::Critical,
        _ => return None,
    };

    Some(severity)
}
