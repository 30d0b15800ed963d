//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: admin API plus one fallback into the site router
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Swap in rebuilt sites when the config changes
//! - Observability (metrics, correlation IDs)

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::app::{Site, SiteBuilder};
use crate::config::{ComposerConfig, ConfigError};
use crate::observability::metrics;
use crate::routing::RequestContext;

/// The live config and the site built from it, swapped together.
pub struct InnerState {
    pub config: ComposerConfig,
    pub site: Arc<Site>,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<InnerState>>,
    pub started: Instant,
}

impl AppState {
    pub fn new(config: ComposerConfig, site: Site) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(InnerState {
                config,
                site: Arc::new(site),
            })),
            started: Instant::now(),
        }
    }
}

/// HTTP server for the page composer.
pub struct HttpServer {
    router: Router,
    state: AppState,
    builder: Arc<SiteBuilder>,
}

impl HttpServer {
    /// Build the initial site and the Axum router around it.
    pub fn new(config: ComposerConfig, builder: SiteBuilder) -> Result<Self, ConfigError> {
        let site = builder.build(&config)?;
        let state = AppState::new(config.clone(), site);
        let router = Self::build_router(&config, &state);
        Ok(Self {
            router,
            state,
            builder: Arc::new(builder),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ComposerConfig, state: &AppState) -> Router {
        let mut app = Router::new()
            .fallback(dispatch_handler)
            .with_state(state.clone());
        if config.admin.enabled {
            app = app.merge(admin::router(state.clone()));
        }

        app.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                ))),
        )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires, applying config updates as
    /// they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut updates: mpsc::UnboundedReceiver<ComposerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let state = self.state.clone();
        let builder = self.builder.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                match builder.build(&config) {
                    Ok(site) => {
                        state.inner.store(Arc::new(InnerState {
                            config,
                            site: Arc::new(site),
                        }));
                        tracing::info!("Site reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to rebuild site, keeping current one");
                    }
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Every non-admin request: convert, dispatch through the site router,
/// convert back.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let (parts, _body) = request.into_parts();

    let mut ctx = RequestContext::new(parts.method, parts.uri.path(), parts.uri.query())
        .with_headers(parts.headers);

    tracing::debug!(
        request_id = %ctx.request_id,
        method = %ctx.method,
        path = %ctx.path,
        "Dispatching request"
    );

    let site = state.inner.load().site.clone();
    let response = site.router().dispatch(&mut ctx).await;

    metrics::record_request(ctx.method.as_str(), response.status.as_u16(), started);
    tracing::debug!(
        request_id = %ctx.request_id,
        status = response.status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );
    response.into_response()
}
