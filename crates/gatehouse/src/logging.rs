//! Logging initialization.

use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};

use crate::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        })
    }
}

impl<'de> Deserialize<'de> for LogFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

impl LogFormat {
    /// Read `LOG_FORMAT`, falling back to json in production and text otherwise.
    pub fn from_env_or(environment: Environment) -> Self {
        env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(match environment {
                Environment::Production => Self::Json,
                Environment::Development => Self::Text,
            })
    }
}

/// Subscriber settings. `RUST_LOG` takes precedence over `filter` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit format. When unset, see [`LoggingConfig::resolve_format`].
    pub format: Option<LogFormat>,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: None,
            filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// The configured format, else `LOG_FORMAT`, else the default for `environment`.
    pub fn resolve_format(&self, environment: Environment) -> LogFormat {
        self.format
            .unwrap_or_else(|| LogFormat::from_env_or(environment))
    }
}

#[cfg(feature = "tracing")]
pub fn init_logging(config: &LoggingConfig, environment: Environment) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let _ = match config.resolve_format(environment) {
        LogFormat::Text => fmt().with_env_filter(env_filter).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(env_filter)
            .try_init(),
    };
}

#[cfg(feature = "tracing")]
pub fn init_logging_from_env() {
    init_logging(&LoggingConfig::default(), Environment::from_env());
}
