//! Structured logging configuration.

use tracing_subscriber::EnvFilter;

/// Default filter directives when `SQLITE_COURIER_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: EnvFilter::new(DEFAULT_LOG_FILTER),
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from the environment.
    ///
    /// `SQLITE_COURIER_LOG` holds filter directives (for example
    /// `sqlite_courier=debug`); invalid directives fall back to the default.
    /// `SQLITE_COURIER_LOG_FORMAT` is `json` or `pretty`.
    #[must_use]
    pub fn from_env() -> Self {
        let filter = std::env::var("SQLITE_COURIER_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
        let format = std::env::var("SQLITE_COURIER_LOG_FORMAT")
            .ok()
            .and_then(|value| LogFormat::parse(&value))
            .unwrap_or_default();
        Self { format, filter }
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Replaces the filter with `directives`, keeping the current one if
    /// they do not parse.
    #[must_use]
    pub fn with_directives(mut self, directives: &str) -> Self {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            self.filter = filter;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" JSON "), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_builders() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_directives("sqlite_courier=debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.to_string(), "sqlite_courier=debug");
    }

    #[test]
    fn test_invalid_directives_keep_filter() {
        let config = LoggingConfig::default().with_directives("sqlite_courier=notalevel");
        assert_eq!(config.filter.to_string(), DEFAULT_LOG_FILTER);
    }
}
