//! View rendering.
//!
//! # Responsibilities
//! - Define the renderer contract pages are rendered through
//! - Provide a file-backed template renderer
//!
//! # Design Decisions
//! - The renderer receives the finished working data set, nothing else
//! - Any render failure surfaces as a 500 through the error chain

pub mod template;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::HttpError;

pub use template::FileRenderer;

/// Errors raised while rendering a view.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("failed to read template '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl From<RenderError> for HttpError {
    fn from(err: RenderError) -> Self {
        HttpError::internal(err.to_string())
    }
}

/// Turns a template name and a view model into markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, template: &str, data: &Map<String, Value>) -> Result<String, RenderError>;
}
