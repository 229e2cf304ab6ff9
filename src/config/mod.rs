//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → schema.rs (ServerSettings with defaults)
//!     → options.rs (ServerConfig::from_settings, then ServerOption overrides)
//!     → Arc<ServerConfig> (immutable, owned by the server)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved
//! - All settings have defaults to allow minimal files
//! - No semantic validation: bad values surface where they are used

pub mod engine;
pub mod loader;
pub mod options;
pub mod schema;

pub use engine::EngineSettings;
pub use options::{ServerConfig, ServerOption};
pub use schema::ServerSettings;
