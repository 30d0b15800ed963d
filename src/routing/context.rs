//! Per-request state handed through the handler chain.
//!
//! # Responsibilities
//! - Carry method, path, query and headers of the incoming request
//! - Hold the path params populated by the router (always present, may be empty)
//! - Hold the working data set the controller assembles
//! - Accumulate the outgoing response
//!
//! # Design Decisions
//! - Query values are decoded once, at construction
//! - The response is a plain value; conversion to axum happens at the edge

use std::collections::HashMap;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{Map, Value};

/// Mutable, request-scoped state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub params: HashMap<String, String>,
    pub data: Map<String, Value>,
    pub request_id: String,
    pub started: Instant,
}

impl RequestContext {
    /// Build a context from request parts. `query` is the raw query string.
    pub fn new(method: Method, path: impl Into<String>, query: Option<&str>) -> Self {
        let query = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();

        Self {
            method,
            path: path.into(),
            query,
            headers: HeaderMap::new(),
            params: HashMap::new(),
            data: Map::new(),
            request_id: String::new(),
            started: Instant::now(),
        }
    }

    /// Convenience for `GET` requests built from a path with an optional query.
    pub fn get(uri: &str) -> Self {
        match uri.split_once('?') {
            Some((path, query)) => Self::new(Method::GET, path, Some(query)),
            None => Self::new(Method::GET, uri, None),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        self.headers = headers;
        self
    }

    /// `true` when the query string carries `name=true`.
    pub fn query_flag(&self, name: &str) -> bool {
        self.query.get(name).is_some_and(|v| v == "true")
    }
}

/// The response being built by the handler chain.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Serialize `value` as the body with a JSON content type.
    pub fn json(&mut self, value: &Value) -> &mut Self {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Bytes::from(value.to_string());
        self
    }

    pub fn html(&mut self, body: impl Into<String>) -> &mut Self {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        self.body = Bytes::from(body.into());
        self
    }

    pub fn text(&mut self, body: impl Into<String>) -> &mut Self {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Bytes::from(body.into());
        self
    }

    /// Drop any body and content type written so far.
    pub fn clear(&mut self) -> &mut Self {
        self.headers.remove(header::CONTENT_TYPE);
        self.body = Bytes::new();
        self
    }
}

impl axum::response::IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(axum::body::Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
