//! # gatehouse
//!
//! Shared foundation for the gatehouse crates.
//!
//! - [`ErrorCode`] / [`AppError`]: the closed canonical error taxonomy and the only
//!   error shape that crosses the authentication boundary.
//! - [`ConfigBuilder`]: layered configuration (dotenv, file, environment).
//! - Logging initialization with tracing-subscriber.
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization with tracing-subscriber

mod config;
mod environment;
mod errs;
mod logging;

pub use config::{ConfigBuilder, ConfigError, ConfigFormat};
pub use environment::Environment;
pub use errs::{AppError, ErrorCode, ParseErrorCodeError};
pub use logging::{LogFormat, LoggingConfig};

#[cfg(feature = "tracing")]
pub use logging::{init_logging, init_logging_from_env};
