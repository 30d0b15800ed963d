//! Static response headers from `[server.headers]`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};

use crate::config::ConfigError;
use crate::error::HttpError;
use crate::routing::{Flow, Handler, RequestContext, Response};

/// Global middleware adding configured headers to every response.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseHeaders {
    pub fn from_config(headers: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let invalid = |name: &str, reason: String| ConfigError::InvalidHeader {
            name: name.to_string(),
            reason,
        };
        let headers = headers
            .iter()
            .map(|(name, value)| {
                let header = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| invalid(name, e.to_string()))?;
                let value = HeaderValue::from_str(value).map_err(|e| invalid(name, e.to_string()))?;
                Ok((header, value))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { headers })
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[async_trait]
impl Handler for ResponseHeaders {
    async fn handle(&self, _ctx: &mut RequestContext, res: &mut Response) -> Result<Flow, HttpError> {
        for (name, value) in &self.headers {
            res.headers.insert(name.clone(), value.clone());
        }
        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_headers_applied_and_chain_continues() {
        let mut config = BTreeMap::new();
        config.insert("x-frame-options".to_string(), "DENY".to_string());
        let middleware = ResponseHeaders::from_config(&config).unwrap();

        let mut res = Response::new();
        let flow = middleware
            .handle(&mut RequestContext::get("/"), &mut res)
            .await
            .unwrap();
        assert_eq!(flow, Flow::Next);
        assert_eq!(res.headers["x-frame-options"], "DENY");
    }

    #[test]
    fn test_invalid_header_name() {
        let mut config = BTreeMap::new();
        config.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            ResponseHeaders::from_config(&config),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }
}
