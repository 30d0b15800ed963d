//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the composer:
//! server settings, pipeline toggles, caching, pages and datasource schemas.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration for the page composer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ComposerConfig {
    /// HTTP server settings (bind address, timeouts, static headers).
    pub server: ServerConfig,

    /// Process-wide pipeline settings.
    pub global: GlobalConfig,

    /// Datasource cache settings.
    pub caching: CachingConfig,

    /// Settings for the network providers.
    pub remote: RemoteConfig,

    /// Template renderer settings.
    pub templates: TemplateConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Administrative API settings.
    pub admin: AdminConfig,

    /// Page definitions, each bound to one or more routes.
    pub pages: Vec<PageConfig>,

    /// Datasource schemas keyed by datasource name.
    pub datasources: BTreeMap<String, DatasourceConfig>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Static headers added to every dispatched response.
    pub headers: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            headers: BTreeMap::new(),
        }
    }
}

/// Pipeline settings shared by every page.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Debug mode: exposes the flag to views and bypasses the cache.
    pub debug: bool,

    /// Permit `?json=true` to return the working data set.
    pub allow_json_view: bool,

    /// Attach a CSRF token to every view model.
    pub csrf: bool,

    /// Events run before the page's own preload events on every request.
    pub events: Vec<String>,

    /// Width of the primary datasource queue (1 = sequential).
    pub primary_fetch_concurrency: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug: false,
            allow_json_view: false,
            csrf: false,
            events: Vec::new(),
            primary_fetch_concurrency: 1,
        }
    }
}

/// Datasource cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CachingConfig {
    /// Master switch for datasource caching.
    pub enabled: bool,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// In-process store enabled.
    pub local: bool,

    /// Remote store enabled. The embedding application must install the
    /// store with `SiteBuilder::with_cache_backend`, or the site fails to build.
    pub remote: bool,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            local: true,
            remote: false,
        }
    }
}

/// Settings for providers that talk to the network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,

    /// User agent sent to upstream APIs.
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: concat!("page-composer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Template renderer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Directory holding `<template>.html` files.
    pub directory: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            directory: "templates".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Administrative API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/api/*` endpoints.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// A page: metadata plus the datasources and events it composes.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PageConfig {
    /// Unique page name.
    pub name: String,

    /// Free-form description exposed to views.
    pub description: Option<String>,

    /// Template name; defaults to the page name.
    pub template: Option<String>,

    /// Route patterns served by this page.
    pub routes: Vec<String>,

    /// Datasource names, in fetch order.
    pub datasources: Vec<String>,

    /// Datasource keys that must return results for the page to render.
    pub required_datasources: Vec<String>,

    /// Events run before any datasource is fetched.
    pub preload_events: Vec<String>,

    /// Events run after all datasources are fetched.
    pub events: Vec<String>,

    /// Apply `?filter=` overrides to every datasource of the page.
    pub pass_filters: bool,
}

/// Schema of one datasource.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatasourceConfig {
    /// Key the result is stored under; defaults to the datasource name.
    pub key: Option<String>,

    /// Where the data comes from.
    pub source: SourceConfig,

    /// Resolve a page number for every request.
    pub paginate: bool,

    /// Route parameter aliasing the page number.
    pub page_param: Option<String>,

    /// Results per page.
    pub count: Option<u64>,

    /// Sort specification passed to the provider.
    pub sort: Option<Map<String, Value>>,

    /// Field projection passed to the provider.
    pub fields: Vec<String>,

    /// Filter template; may contain `{params.NAME}` placeholders.
    pub filter: FilterTemplate,

    /// Request parameters mapped into the filter or the endpoint.
    pub request_params: Vec<RequestParamConfig>,

    /// Dependency on another datasource's result.
    pub chained: Option<ChainedConfig>,

    /// Event computing dynamic filter values before each fetch.
    pub filter_event: Option<String>,

    /// Allow this datasource's results to be cached.
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_true() -> bool {
    true
}

/// Source description for a datasource.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// Provider type name (`api`, `remote`, `static` or a registered custom type).
    #[serde(rename = "type")]
    pub kind: String,

    /// Endpoint URL; may contain `{placeholder}` segments.
    pub endpoint: Option<String>,

    /// Extra headers sent with upstream requests.
    pub headers: BTreeMap<String, String>,

    /// Inline records for static datasources.
    pub data: Option<Vec<Value>>,
}

/// Filter template, written either as a table or as raw JSON text.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FilterTemplate {
    Text(String),
    Object(Map<String, Value>),
}

impl Default for FilterTemplate {
    fn default() -> Self {
        FilterTemplate::Object(Map::new())
    }
}

impl FilterTemplate {
    /// The template as JSON text, ready for placeholder substitution.
    pub fn to_text(&self) -> String {
        match self {
            FilterTemplate::Text(text) => text.clone(),
            FilterTemplate::Object(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

/// Where a resolved parameter value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamTarget {
    #[default]
    Filter,
    Endpoint,
}

/// Declared type coercion for parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
}

/// Maps a route or query parameter into the datasource query.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestParamConfig {
    /// Request parameter name.
    pub param: String,

    /// Filter field, or endpoint placeholder name.
    pub field: String,

    #[serde(default)]
    pub target: ParamTarget,

    #[serde(rename = "type", default)]
    pub kind: Option<ValueType>,
}

/// Dependency on a parent datasource.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainedConfig {
    /// Key of the parent datasource in the working data set.
    pub datasource: String,

    /// How the parent's result feeds this datasource.
    pub output_param: OutputParamConfig,
}

/// Extraction and injection rule for a chained datasource.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputParamConfig {
    /// Dotted path into the parent result (e.g. `results.0.id`).
    pub param: String,

    /// Filter field or endpoint placeholder receiving the value.
    #[serde(default)]
    pub field: Option<String>,

    #[serde(default)]
    pub target: ParamTarget,

    #[serde(rename = "type", default)]
    pub kind: Option<ValueType>,

    /// Query template merged into the filter; `{param}` receives the value.
    #[serde(default)]
    pub query: Option<Value>,
}
