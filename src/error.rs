//! Request-level error type travelling through the error-handler chain.
//!
//! Every failure that aborts a request (datasource resolution, primary
//! provider fetch, events, rendering) is converted into an [`HttpError`]
//! carrying the status to respond with and, when the failure supplied one,
//! a structured JSON body.

use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// An error surfaced to the dispatcher's error chain.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
    body: Option<Value>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attach a structured JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}
