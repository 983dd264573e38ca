//! Configuration loading utilities.

use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    NotFound(PathBuf),
    /// Failed to parse configuration.
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Config file not found: {}", path.display()),
            Self::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    DotEnv,
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let file_name = path.file_name()?.to_str()?;
        if file_name == ".env" || file_name.starts_with(".env.") {
            return Some(Self::DotEnv);
        }

        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "env" => Some(Self::DotEnv),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Layered configuration builder.
///
/// Sources, lowest priority first: `.env` files (exported into the process
/// environment), the last TOML/YAML/JSON file given, then environment variables.
/// Nested keys use `__` in variable names, so `AUTH__ISSUER` sets `auth.issuer`.
/// With a prefix, only `<PREFIX>_`-prefixed variables are read.
///
/// ```ignore
/// use gatehouse::ConfigBuilder;
///
/// let config: ServerConfig = ConfigBuilder::new()
///     .with_dotenv()
///     .with_env_prefix("GATEHOUSE")
///     .with_config_file("gatehouse.toml")
///     .build()?;
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    load_default_dotenv: bool,
    config_files: Vec<PathBuf>,
    env_prefix: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load environment variables from `.env` in the current directory.
    pub fn with_dotenv(mut self) -> Self {
        self.load_default_dotenv = true;
        self
    }

    /// Add a configuration file. `.env` files are all applied; for structured
    /// formats the last one wins.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    /// Only read environment variables starting with `<prefix>_`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn build<C: DeserializeOwned>(self) -> Result<C, ConfigError> {
        if self.load_default_dotenv {
            let _ = dotenvy::dotenv();
        }

        let mut main_config_file: Option<&Path> = None;
        for path in &self.config_files {
            match ConfigFormat::from_path(path) {
                Some(ConfigFormat::DotEnv) => {
                    if let Err(err) = dotenvy::from_path(path) {
                        tracing::debug!(path = %path.display(), error = %err, "dotenv file not loaded");
                    }
                }
                Some(_) => main_config_file = Some(path),
                None => {}
            }
        }

        let env_source = EnvSource {
            prefix: self.env_prefix,
        };

        let mut builder = config::Config::builder();
        if let Some(path) = main_config_file {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(env_source)
            .build()
            .and_then(|c| c.try_deserialize::<C>())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Environment source that also maps `ENVIRONMENT`/`APP_ENV`/`RUST_ENV` onto the
/// `environment` key.
#[derive(Debug, Clone)]
struct EnvSource {
    prefix: Option<String>,
}

impl config::Source for EnvSource {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        use config::{Environment, Source, Value, ValueKind};

        let source = match &self.prefix {
            Some(prefix) => Environment::with_prefix(prefix).prefix_separator("_"),
            None => Environment::default(),
        };
        let mut map = source.separator("__").try_parsing(true).collect()?;

        if !map.contains_key("environment") {
            if let Ok(val) = env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .or_else(|_| env::var("RUST_ENV"))
            {
                map.insert(
                    "environment".to_string(),
                    Value::new(None, ValueKind::String(val)),
                );
            }
        }

        Ok(map)
    }
}
