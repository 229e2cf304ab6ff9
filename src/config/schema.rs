//! Configuration schema definitions.
//!
//! This module defines the settings file structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root settings for the HTTP server process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listening port (default 8000).
    pub port: u16,

    /// URL path prefix for module routes (default empty).
    pub root_path: String,

    /// Debug mode toggles request logging verbosity.
    pub debug: bool,

    /// Grace period handed to `shutdown` by the binary.
    pub shutdown_timeout_secs: u64,

    /// Serve HTTP from a protocol-multiplexing listener.
    pub shared_listener: bool,

    /// Cross-origin policy.
    pub cors: CorsSettings,

    /// Request tracing.
    pub tracing: TraceSettings,

    /// Credentials guarding the diagnostic endpoints.
    pub basic_auth: BasicAuthSettings,

    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            root_path: String::new(),
            debug: true,
            shutdown_timeout_secs: 30,
            shared_listener: false,
            cors: CorsSettings::default(),
            tracing: TraceSettings::default(),
            basic_auth: BasicAuthSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Cross-origin resource sharing settings.
///
/// `"*"` in any list means "any value". Combined with `allow_credentials`
/// the request value is mirrored instead.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsSettings {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allow_headers: vec!["*".to_string()],
            allow_credentials: true,
        }
    }
}

/// Request tracing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Paths that never get a request span.
    pub exclude_paths: Vec<String>,

    /// Bytes of request/response payload recorded on each span; 0 disables.
    pub max_log_size: usize,
}

/// Default cap on payload bytes recorded per span.
pub const DEFAULT_MAX_LOG_SIZE: usize = 1024;

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            exclude_paths: vec!["/".to_string(), "/graphql".to_string()],
            max_log_size: DEFAULT_MAX_LOG_SIZE,
        }
    }
}

/// Basic authentication credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BasicAuthSettings {
    pub username: String,
    pub password: String,
}

impl Default for BasicAuthSettings {
    fn default() -> Self {
        Self {
            username: "user".to_string(),
            password: "da1c25d8-37c8-41b1-afe2-42dd4825bfea".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}
