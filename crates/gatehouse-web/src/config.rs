//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use gatehouse::{ConfigBuilder, Environment, LoggingConfig};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// How long in-flight requests may drain after shutdown is signalled.
    pub shutdown_timeout_secs: u64,
    pub log: LoggingConfig,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 20,
            log: LoggingConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Token signing and verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Directory holding one `<kid>/` folder per key pair.
    pub keys_folder: PathBuf,
    /// Key used to sign newly issued tokens.
    pub active_kid: String,
    pub issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            keys_folder: PathBuf::from("keys/"),
            active_kid: String::new(),
            issuer: "gatehouse".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config: ServerConfig = ServerConfig::builder()
    ///     .with_dotenv()
    ///     .with_config_file("config.toml")
    ///     .with_env_prefix("GATEHOUSE")
    ///     .build()?;
    /// ```
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub(crate) fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AsRef<ServerConfig> for ServerConfig {
    fn as_ref(&self) -> &ServerConfig {
        self
    }
}
