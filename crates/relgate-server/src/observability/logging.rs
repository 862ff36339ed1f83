//! Log output for the relgate binary.
//!
//! Everything logs through `tracing`. [`init_logging`] installs one global
//! subscriber that prints either JSON lines or pretty text, filtered by
//! `RUST_LOG` when set and by `logging.level` otherwise.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::LoggingSettings;

/// Resolved logging options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub json: bool,
    /// Used when `RUST_LOG` is not set.
    pub level: Level,
    pub spans: bool,
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            json: settings.json,
            level: parse_log_level(&settings.level),
            spans: settings.spans,
        }
    }
}

/// Parses a configured level name, falling back to `INFO`.
pub fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let span_events = if config.spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    let installed = if config.json {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_span_events(span_events)
                    .with_current_span(true),
            ),
        )
    } else {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_span_events(span_events)),
        )
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level_is_case_insensitive() {
        assert_eq!(parse_log_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_log_level("warn"), Level::WARN);
        assert_eq!(parse_log_level("trace"), Level::TRACE);
        assert_eq!(parse_log_level("error"), Level::ERROR);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert_eq!(parse_log_level("chatty"), Level::INFO);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = LoggingSettings {
            level: "Debug".to_string(),
            json: true,
            spans: true,
        };

        assert_eq!(
            LoggingConfig::from(&settings),
            LoggingConfig {
                json: true,
                level: Level::DEBUG,
                spans: true,
            }
        );
        assert_eq!(
            LoggingConfig::from(&LoggingSettings::default()).level,
            Level::INFO
        );
    }

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging(LoggingConfig::from(&LoggingSettings::default()));
        init_logging(LoggingConfig {
            json: true,
            level: Level::WARN,
            spans: false,
        });
    }
}
