use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::http::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub uptime_secs: u64,
    pub pages: Vec<String>,
    pub routes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlushRequest {
    pub path: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let site = state.inner.load().site.clone();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        pages: site.page_names(),
        routes: site.route_patterns(),
    })
}

pub async fn flush(
    State(state): State<AppState>,
    Json(request): Json<FlushRequest>,
) -> (StatusCode, Json<Value>) {
    let site = state.inner.load().site.clone();

    if request.path == "*" {
        let removed = site.flush_all().await;
        tracing::info!(removed, "Flushed entire cache");
        return (StatusCode::OK, Json(json!({ "flushed": "*", "removed": removed })));
    }

    match site.flush_path(&request.path).await {
        Some(removed) => (
            StatusCode::OK,
            Json(json!({ "flushed": request.path, "removed": removed })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no page is routed at '{}'", request.path) })),
        ),
    }
}
