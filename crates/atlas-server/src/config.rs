//! Server settings
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`, or `atlas.toml` in the working directory if present)
//! 3. Environment variables prefixed `ATLAS`, nested with `__`
//!    (`ATLAS__AUTH__OIDC_URL`, `ATLAS__SERVER__PORT`)
//! 4. Command-line flags, applied by the binary
//!
//! ```toml
//! public_routes = ["/health"]
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [log]
//! level = "info"
//! json = false
//!
//! [auth]
//! oidc_url = "https://idp.example/.well-known/openid-configuration"
//! expected_audience = "atlas-api"
//! ```

use std::net::SocketAddr;
use std::path::Path;

use atlas_auth::AuthConfig;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ATLAS";

/// File read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "atlas.toml";

/// Complete process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    #[serde(default)]
    pub server: ListenSettings,

    /// Exact paths served without authentication
    #[serde(default = "default_public_routes")]
    pub public_routes: Vec<String>,

    #[serde(default)]
    pub log: LogSettings,

    pub auth: AuthConfig,
}

/// Listening socket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_public_routes() -> Vec<String> {
    vec!["/health".to_string()]
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerSettings {
    /// Load settings from `path` (or the default file) and the environment
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ConfigFileNotFound`] if an explicit `path` does
    /// not exist and [`ServerError::Config`] if the merged sources do not
    /// deserialize (for example when `auth.oidc_url` is missing)
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// [`ServerSettings::load`] with a custom environment prefix
    ///
    /// # Errors
    ///
    /// See [`ServerSettings::load`]
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> ServerResult<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ServerError::ConfigFileNotFound(path.to_path_buf()));
                }
                File::from(path).format(FileFormat::Toml).required(true)
            }
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            // Environment variables override file settings
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("public_routes")
                    .with_list_parse_key("auth.allowed_algorithms"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Address to bind
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if `host:port` is not a socket address
    pub fn listen_addr(&self) -> ServerResult<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                ServerError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid listen address: {}", e),
                ))
            })
    }
}
