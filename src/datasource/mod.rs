//! Datasources: named, schema-described queries bound to pages.
//!
//! # Data Flow
//! ```text
//! Site load:
//!     DatasourceConfig → Datasource (provider factory resolved, filter
//!     template frozen as text)
//!
//! Per request (never mutating the shared Datasource):
//!     filter template + {params.NAME} substitution
//!     → ?filter= override (page name == datasource name, or pass_filters)
//!     → page number (query page > alias route param > route page > 1)
//!     → request_params into filter fields / endpoint placeholders
//!     → filter event result
//!     → ResolvedQuery
//!     → chain.rs applies the parent's value for chained datasources
//! ```

pub mod cache;
pub mod chain;
pub mod params;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::schema::{ChainedConfig, DatasourceConfig, ParamTarget};
use crate::controller::Page;
use crate::error::HttpError;
use crate::event::{Event, EventRegistry, LoadOrder};
use crate::provider::{Provider, ProviderFactory, ProviderRegistry};
use crate::routing::RequestContext;

pub use cache::DatasourceCache;

/// Errors resolving a datasource query for a request.
#[derive(Debug, Error)]
pub enum DatasourceError {
    #[error("datasource '{datasource}' has a malformed filter: {reason}")]
    MalformedFilter { datasource: String, reason: String },

    #[error("datasource '{datasource}' received an invalid filter override: {reason}")]
    InvalidFilterOverride { datasource: String, reason: String },

    #[error("datasource '{datasource}' expected a number for '{param}', got '{value}'")]
    NotNumeric {
        datasource: String,
        param: String,
        value: String,
    },

    #[error("chained datasource '{datasource}' depends on '{parent}', which is not in the data set")]
    MissingParent { datasource: String, parent: String },

    #[error("chained datasource '{datasource}' could not extract '{path}' from parent '{parent}'")]
    Extraction {
        datasource: String,
        parent: String,
        path: String,
    },

    #[error("chained datasource '{datasource}' built an invalid query from parent '{parent}': {reason}")]
    ChainedQuery {
        datasource: String,
        parent: String,
        reason: String,
    },
}

impl From<DatasourceError> for HttpError {
    fn from(err: DatasourceError) -> Self {
        let status = match err {
            DatasourceError::InvalidFilterOverride { .. } | DatasourceError::NotNumeric { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpError::new(status, err.to_string())
    }
}

/// The per-request query for one datasource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedQuery {
    pub filter: Map<String, Value>,
    pub endpoint: String,
    pub page: u64,
    pub count: Option<u64>,
    pub sort: Option<Map<String, Value>>,
    pub fields: Vec<String>,
}

/// A datasource template shared by every request.
pub struct Datasource {
    name: String,
    key: String,
    schema: DatasourceConfig,
    filter_template: String,
    provider: Arc<dyn ProviderFactory>,
    filter_event: Option<Event>,
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datasource")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("source", &self.schema.source.kind)
            .finish()
    }
}

impl Datasource {
    /// Build a datasource, resolving its provider type and filter event.
    pub fn new(
        name: &str,
        schema: DatasourceConfig,
        providers: &ProviderRegistry,
        events: &EventRegistry,
    ) -> Result<Self, ConfigError> {
        let provider =
            providers
                .resolve(&schema.source.kind)
                .ok_or_else(|| ConfigError::UnknownProvider {
                    datasource: name.to_string(),
                    kind: schema.source.kind.clone(),
                })?;

        let filter_event = schema
            .filter_event
            .as_deref()
            .map(|event| events.resolve(event, Some(name), LoadOrder::Preload))
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            key: schema.key.clone().unwrap_or_else(|| name.to_string()),
            filter_template: schema.filter.to_text(),
            schema,
            provider,
            filter_event,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key the result is stored under in the working data set.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn schema(&self) -> &DatasourceConfig {
        &self.schema
    }

    pub fn chained(&self) -> Option<&ChainedConfig> {
        self.schema.chained.as_ref()
    }

    pub fn is_chained(&self) -> bool {
        self.schema.chained.is_some()
    }

    /// Static sources never touch the network.
    pub fn is_static(&self) -> bool {
        self.provider.is_static()
    }

    pub fn filter_event(&self) -> Option<&Event> {
        self.filter_event.as_ref()
    }

    /// A fresh, fetch-scoped provider.
    pub fn create_provider(&self) -> Box<dyn Provider> {
        self.provider.create(&self.name, &self.schema)
    }

    /// Derive this request's query from the pristine schema.
    pub fn process_request(
        &self,
        ctx: &RequestContext,
        page: &Page,
        filter_event_result: Option<Map<String, Value>>,
    ) -> Result<ResolvedQuery, DatasourceError> {
        let mut filter = self.template_filter(&ctx.params)?;

        if page.name == self.name || page.pass_filters {
            if let Some(raw) = ctx.query.get("filter") {
                let extra: Map<String, Value> = serde_json::from_str(raw).map_err(|e| {
                    DatasourceError::InvalidFilterOverride {
                        datasource: self.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                filter.extend(extra);
            }
        }

        let page_number = if self.schema.paginate {
            self.page_number(ctx)
        } else {
            1
        };

        if ctx.query.contains_key("id") {
            tracing::trace!(datasource = %self.name, "Ignoring 'id' query parameter");
        }

        let mut endpoint = self.schema.source.endpoint.clone().unwrap_or_default();

        // route params overridden by same-named query params
        let mut request_params: HashMap<&str, &str> = ctx
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        request_params.extend(ctx.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        for declared in &self.schema.request_params {
            let Some(raw) = request_params.get(declared.param.as_str()) else {
                continue;
            };
            let value = params::coerce(raw, declared.kind).ok_or_else(|| {
                DatasourceError::NotNumeric {
                    datasource: self.name.clone(),
                    param: declared.param.clone(),
                    value: raw.to_string(),
                }
            })?;
            match declared.target {
                ParamTarget::Filter => {
                    filter.insert(declared.field.clone(), value);
                }
                ParamTarget::Endpoint => {
                    let placeholder = format!("{{{}}}", declared.field);
                    let replacement = params::encode_component(&params::value_to_string(&value));
                    endpoint = endpoint.replace(&placeholder, &replacement);
                }
            }
        }

        if let Some(extra) = filter_event_result {
            filter.extend(extra);
        }

        Ok(ResolvedQuery {
            filter,
            endpoint,
            page: page_number,
            count: self.schema.count,
            sort: self.schema.sort.clone(),
            fields: self.schema.fields.clone(),
        })
    }

    fn template_filter(
        &self,
        route_params: &HashMap<String, String>,
    ) -> Result<Map<String, Value>, DatasourceError> {
        let text = params::substitute_placeholders(&self.filter_template, route_params);
        let malformed = |reason: String| DatasourceError::MalformedFilter {
            datasource: self.name.clone(),
            reason,
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(malformed("filter is not a JSON object".to_string())),
            Err(e) => Err(malformed(e.to_string())),
        }
    }

    /// Query `page` > alias route param > route `page` param > 1.
    fn page_number(&self, ctx: &RequestContext) -> u64 {
        let parse = |v: Option<&String>| v.and_then(|s| s.parse::<u64>().ok()).filter(|n| *n > 0);

        parse(ctx.query.get("page"))
            .or_else(|| {
                self.schema
                    .page_param
                    .as_ref()
                    .and_then(|alias| parse(ctx.params.get(alias)))
            })
            .or_else(|| parse(ctx.params.get("page")))
            .unwrap_or(1)
    }
}
