//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (pages reference existing datasources)
//! - Validate value ranges (queue width > 0, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ComposerConfig → Result<(), Vec<ValidationError>>
//! - Provider types and event names are checked later, when the site is
//!   assembled against the registries
//! - Chained parents and required keys are not checked here: events may
//!   attach those keys at request time

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{ComposerConfig, ParamTarget};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("page name '{0}' is declared more than once")]
    DuplicatePage(String),

    #[error("page '{page}' has route '{route}' that does not start with '/'")]
    InvalidRoute { page: String, route: String },

    #[error("page '{page}' references unknown datasource '{datasource}'")]
    UnknownDatasource { page: String, datasource: String },

    #[error("chained datasource '{0}' targets a filter or endpoint without naming a field")]
    ChainedWithoutField(String),

    #[error("datasource '{0}' has no source type")]
    MissingSourceType(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ComposerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.global.primary_fetch_concurrency == 0 {
        errors.push(ValidationError::Zero("global.primary_fetch_concurrency"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("server.request_timeout_secs"));
    }

    for (name, datasource) in &config.datasources {
        if datasource.source.kind.trim().is_empty() {
            errors.push(ValidationError::MissingSourceType(name.clone()));
        }
        if let Some(chained) = &datasource.chained {
            let output = &chained.output_param;
            let needs_field = output.query.is_none() || output.target == ParamTarget::Endpoint;
            if needs_field && output.field.is_none() {
                errors.push(ValidationError::ChainedWithoutField(name.clone()));
            }
        }
    }

    let mut seen = HashSet::new();
    for page in &config.pages {
        if !seen.insert(page.name.as_str()) {
            errors.push(ValidationError::DuplicatePage(page.name.clone()));
        }

        for route in &page.routes {
            if !route.starts_with('/') {
                errors.push(ValidationError::InvalidRoute {
                    page: page.name.clone(),
                    route: route.clone(),
                });
            }
        }

        for name in &page.datasources {
            if !config.datasources.contains_key(name) {
                errors.push(ValidationError::UnknownDatasource {
                    page: page.name.clone(),
                    datasource: name.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
