//! Data providers: the fetch capability behind each datasource.
//!
//! # Data Flow
//! ```text
//! Site load:
//!     source.type ("api" | "remote" | "static" | custom)
//!     → ProviderRegistry::resolve
//!     → Arc<dyn ProviderFactory> stored on the Datasource
//!
//! Per fetch:
//!     factory.create(name, schema)       (fetch-scoped instance)
//!     → process_request(resolved query)
//!     → build_endpoint(resolved query)
//!     → load(endpoint)
//!     → destroy()
//! ```
//!
//! # Design Decisions
//! - Provider type is resolved once at load; an unknown type is a config error
//! - Instances never outlive one fetch
//! - Timeouts are the provider's concern (the HTTP client carries one)

pub mod api;
pub mod remote;
pub mod static_source;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::config::schema::{DatasourceConfig, RemoteConfig};
use crate::datasource::ResolvedQuery;
use crate::error::HttpError;

pub use api::ApiProviderFactory;
pub use remote::RemoteProviderFactory;
pub use static_source::StaticProviderFactory;

/// Errors raised while loading data.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with {status}")]
    Status {
        url: String,
        status: StatusCode,
        body: Option<Value>,
    },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("datasource '{0}' has no endpoint")]
    MissingEndpoint(String),

    #[error("{0}")]
    Other(String),
}

impl From<ProviderError> for HttpError {
    fn from(err: ProviderError) -> Self {
        match &err {
            ProviderError::Status { status, body, .. } => {
                let http = HttpError::new(*status, err.to_string());
                match body {
                    Some(body) => http.with_body(body.clone()),
                    None => http,
                }
            }
            _ => HttpError::internal(err.to_string()),
        }
    }
}

/// The result of a successful load.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Parsed payload stored in the working data set.
    pub data: Value,
    /// Raw response body, when the provider has one.
    pub raw: Option<Bytes>,
}

impl ProviderResponse {
    pub fn new(data: Value) -> Self {
        Self { data, raw: None }
    }

    /// Bytes suitable for the cache: the raw body, or the serialized data.
    pub fn payload(&self) -> Bytes {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => Bytes::from(self.data.to_string()),
        }
    }
}

/// A fetch-scoped provider instance.
#[async_trait]
pub trait Provider: Send {
    /// Inspect the resolved query before the endpoint is built.
    fn process_request(&mut self, _query: &ResolvedQuery) {}

    /// The URL (or identifier) to load.
    fn build_endpoint(&self, query: &ResolvedQuery) -> String {
        query.endpoint.clone()
    }

    /// Explicit cache key overriding the endpoint.
    fn cache_key(&self) -> Option<String> {
        None
    }

    async fn load(&mut self, endpoint: &str) -> Result<ProviderResponse, ProviderError>;

    /// Release resources held by this instance.
    fn destroy(&mut self) {}
}

/// Creates provider instances for one source type.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, datasource: &str, schema: &DatasourceConfig) -> Box<dyn Provider>;

    /// `true` for sources that never touch the network (never cached).
    fn is_static(&self) -> bool {
        false
    }
}

/// Source type name → factory.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `api`, `remote` and `static` types.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register("api", Arc::new(ApiProviderFactory::new(client.clone())));
        registry.register("remote", Arc::new(RemoteProviderFactory::new(client)));
        registry.register("static", Arc::new(StaticProviderFactory));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.get(kind).cloned()
    }
}

/// HTTP client shared by the network providers.
pub fn http_client(config: &RemoteConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
}
