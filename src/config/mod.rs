//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ComposerConfig (validated, immutable)
//!     → app::SiteBuilder assembles routes, datasources, events
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server rebuilds the site and swaps it atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CachingConfig, ChainedConfig, ComposerConfig, DatasourceConfig, FilterTemplate,
    GlobalConfig, ObservabilityConfig, OutputParamConfig, PageConfig, ParamTarget,
    RequestParamConfig, ServerConfig, SourceConfig, ValueType,
};
