//! Remote provider: loads JSON from a URL as-is.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::schema::DatasourceConfig;
use crate::provider::{Provider, ProviderError, ProviderFactory, ProviderResponse};

/// GET `url` and parse the body as JSON.
pub(crate) async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<ProviderResponse, ProviderError> {
    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = request.send().await.map_err(|source| ProviderError::Request {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    let raw = response.bytes().await.map_err(|source| ProviderError::Request {
        url: url.to_string(),
        source,
    })?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            url: url.to_string(),
            status,
            body: serde_json::from_slice(&raw).ok(),
        });
    }

    let data = serde_json::from_slice(&raw).map_err(|source| ProviderError::Decode {
        url: url.to_string(),
        source,
    })?;
    Ok(ProviderResponse {
        data,
        raw: Some(raw),
    })
}

/// Factory for [`RemoteProvider`].
pub struct RemoteProviderFactory {
    client: reqwest::Client,
}

impl RemoteProviderFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ProviderFactory for RemoteProviderFactory {
    fn create(&self, datasource: &str, schema: &DatasourceConfig) -> Box<dyn Provider> {
        Box::new(RemoteProvider {
            client: self.client.clone(),
            datasource: datasource.to_string(),
            headers: schema.source.headers.clone(),
        })
    }
}

/// Fetches the resolved endpoint without adding query parameters.
pub struct RemoteProvider {
    client: reqwest::Client,
    datasource: String,
    headers: BTreeMap<String, String>,
}

#[async_trait]
impl Provider for RemoteProvider {
    async fn load(&mut self, endpoint: &str) -> Result<ProviderResponse, ProviderError> {
        if endpoint.is_empty() {
            return Err(ProviderError::MissingEndpoint(self.datasource.clone()));
        }
        fetch_json(&self.client, endpoint, &self.headers).await
    }
}
