//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ComposerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and site assembly.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// A datasource names a provider type nobody registered.
    #[error("datasource '{datasource}' uses unknown provider type '{kind}'")]
    UnknownProvider { datasource: String, kind: String },

    /// A page or datasource references an event nobody registered.
    #[error("event '{event}' referenced by '{owner}' is not registered")]
    UnknownEvent { event: String, owner: String },

    /// A route pattern could not be compiled.
    #[error("invalid route pattern: {0}")]
    Pattern(#[from] crate::routing::matcher::PatternError),

    /// A configured response header is not a valid HTTP header.
    #[error("invalid response header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    /// `[caching].remote` is on but the application installed no shared store.
    #[error("remote caching is enabled but no remote cache backend is installed")]
    RemoteCacheWithoutBackend,

    /// The shared upstream client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ComposerConfig, ConfigError> {
    let config: ComposerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ComposerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [global]
            debug = true

            [[pages]]
            name = "home"
            routes = ["/"]
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(config.global.debug);
        assert_eq!(config.pages[0].name, "home");
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[[pages]\nname=").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error_lists_everything() {
        let err = parse_config(
            r#"
            [[pages]]
            name = "a"
            routes = ["no-slash"]
            datasources = ["missing"]
            "#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("no-slash"));
        assert!(message.contains("missing"));
    }
}
