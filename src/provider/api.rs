//! REST API provider.
//!
//! Appends the resolved query to the endpoint as `count`, `page`, `filter`,
//! `fields` and `sort` parameters, JSON-encoding the structured ones.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

use crate::config::schema::DatasourceConfig;
use crate::datasource::ResolvedQuery;
use crate::provider::remote::fetch_json;
use crate::provider::{Provider, ProviderError, ProviderFactory, ProviderResponse};

/// Factory for [`ApiProvider`].
pub struct ApiProviderFactory {
    client: reqwest::Client,
}

impl ApiProviderFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ProviderFactory for ApiProviderFactory {
    fn create(&self, datasource: &str, schema: &DatasourceConfig) -> Box<dyn Provider> {
        Box::new(ApiProvider {
            client: self.client.clone(),
            datasource: datasource.to_string(),
            headers: schema.source.headers.clone(),
        })
    }
}

pub struct ApiProvider {
    client: reqwest::Client,
    datasource: String,
    headers: BTreeMap<String, String>,
}

/// Build the API URL for a resolved query.
pub fn build_api_url(query: &ResolvedQuery) -> Option<String> {
    let mut url = Url::parse(&query.endpoint).ok()?;
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(count) = query.count {
            pairs.append_pair("count", &count.to_string());
        }
        pairs.append_pair("page", &query.page.to_string());
        if !query.filter.is_empty() {
            pairs.append_pair("filter", &Value::Object(query.filter.clone()).to_string());
        }
        if !query.fields.is_empty() {
            let fields: Map<String, Value> = query
                .fields
                .iter()
                .map(|f| (f.clone(), Value::from(1)))
                .collect();
            pairs.append_pair("fields", &Value::Object(fields).to_string());
        }
        if let Some(sort) = &query.sort {
            pairs.append_pair("sort", &Value::Object(sort.clone()).to_string());
        }
    }
    Some(url.into())
}

#[async_trait]
impl Provider for ApiProvider {
    fn build_endpoint(&self, query: &ResolvedQuery) -> String {
        build_api_url(query).unwrap_or_default()
    }

    async fn load(&mut self, endpoint: &str) -> Result<ProviderResponse, ProviderError> {
        if endpoint.is_empty() {
            return Err(ProviderError::MissingEndpoint(self.datasource.clone()));
        }
        fetch_json(&self.client, endpoint, &self.headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(endpoint: &str) -> ResolvedQuery {
        ResolvedQuery {
            endpoint: endpoint.to_string(),
            page: 2,
            ..Default::default()
        }
    }

    fn params(url: &str) -> BTreeMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_build_url_with_filter_and_paging() {
        let mut q = query("http://api.local/1.0/cars");
        q.count = Some(10);
        q.filter.insert("make".into(), json!("honda"));
        q.fields = vec!["name".into()];
        q.sort = Some(json!({ "year": -1 }).as_object().unwrap().clone());

        let url = build_api_url(&q).unwrap();
        assert!(url.starts_with("http://api.local/1.0/cars?"));
        let params = params(&url);
        assert_eq!(params["count"], "10");
        assert_eq!(params["page"], "2");
        assert_eq!(params["filter"], r#"{"make":"honda"}"#);
        assert_eq!(params["fields"], r#"{"name":1}"#);
        assert_eq!(params["sort"], r#"{"year":-1}"#);
    }

    #[test]
    fn test_build_url_omits_empty_parts() {
        let params = params(&build_api_url(&query("http://api.local/cars?lang=en")).unwrap());
        assert_eq!(params.len(), 2);
        assert_eq!(params["lang"], "en");
        assert_eq!(params["page"], "2");
    }

    #[test]
    fn test_relative_endpoint_is_rejected() {
        assert!(build_api_url(&query("/cars")).is_none());
    }
}
