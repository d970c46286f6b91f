//! Error types for atlas-server

use atlas_auth::AuthError;
use thiserror::Error;

/// Result type for server operations
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Failure that prevents the server from starting or keeps it from running
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    /// Settings could not be loaded or deserialized
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// An explicitly requested configuration file does not exist
    #[error("Configuration file not found: {0}")]
    ConfigFileNotFound(std::path::PathBuf),

    /// Startup discovery or the initial key set load failed
    #[error("Authenticator failed to start: {0}")]
    Auth(#[from] AuthError),

    /// Logging could not be initialized
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),

    /// Binding or serving failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
