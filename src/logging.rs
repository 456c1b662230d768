//! Tracing/logging initialization.
//!
//! Filtering follows `RUST_LOG` (default `info`), the output format follows
//! `PACK_CALC_LOG_FORMAT` (`pretty` or `json`).

use std::str::FromStr;

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::env_string;

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    const VAR: &'static str = "PACK_CALC_LOG_FORMAT";

    /// Reads the format from the environment.
    ///
    /// Runs before any subscriber exists, so an unknown value is reported
    /// on stderr.
    pub fn from_env() -> Self {
        match env_string(Self::VAR) {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                eprintln!("{}: {err}, using pretty output", Self::VAR);
                LogFormat::Pretty
            }),
            None => LogFormat::Pretty,
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .try_init(),
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
    };
}

/// Subscriber for tests: debug level, captured by the test harness.
#[cfg(test)]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" Pretty ".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn init_is_idempotent() {
        init_test();
        init(LogFormat::Json);
        init(LogFormat::Pretty);
    }
}
