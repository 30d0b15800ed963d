//! Route registry and request dispatch.
//!
//! # Responsibilities
//! - Store compiled routes sorted by specificity
//! - Store global middleware and the error-handler chain
//! - Run middleware → matched handler → not-found terminal for each request
//! - Route failures through the error chain to a default handler
//!
//! # Design Decisions
//! - Registry owned by the site instance, no process-wide singleton
//! - Lists live behind `ArcSwap`; writers insert in order, readers snapshot
//! - Stable ordering: equal scores keep insertion order
//! - First match wins; there is no backtracking to lower-priority routes

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::http::StatusCode;

use crate::error::HttpError;
use crate::routing::context::{RequestContext, Response};
use crate::routing::matcher::{PathPattern, PatternError};

/// Pattern of the route served when nothing else matches.
pub const NOT_FOUND_ROUTE: &str = "/404";

/// What the chain should do after a stage returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next stage.
    Next,
    /// The response is complete.
    Done,
}

/// A stage in the dispatch chain: global middleware or a route handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext, res: &mut Response)
        -> Result<Flow, HttpError>;
}

/// Outcome of an error handler.
#[derive(Debug)]
pub enum ErrorFlow {
    /// The response has been finalized.
    Handled,
    /// Pass the (possibly replaced) error to the next error handler.
    Next(HttpError),
}

/// A stage in the error chain.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, err: HttpError, ctx: &mut RequestContext, res: &mut Response)
        -> ErrorFlow;
}

/// Something to add to (or remove from) the router.
#[derive(Clone)]
pub enum Registration {
    Route {
        pattern: String,
        handler: Arc<dyn Handler>,
    },
    Middleware(Arc<dyn Handler>),
    ErrorHandler(Arc<dyn ErrorHandler>),
}

/// A compiled, routable entry.
pub struct Route {
    pattern: PathPattern,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

/// Priority router with middleware and error chains.
pub struct Router {
    routes: ArcSwap<Vec<Arc<Route>>>,
    middleware: ArcSwap<Vec<Arc<dyn Handler>>>,
    error_handlers: ArcSwap<Vec<Arc<dyn ErrorHandler>>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: ArcSwap::from_pointee(Vec::new()),
            middleware: ArcSwap::from_pointee(Vec::new()),
            error_handlers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Add a route, middleware or error handler.
    pub fn register(&self, registration: Registration) -> Result<(), PatternError> {
        match registration {
            Registration::Route { pattern, handler } => {
                let route = Arc::new(Route {
                    pattern: PathPattern::compile(&pattern)?,
                    handler,
                });
                tracing::debug!(pattern = %pattern, score = route.pattern.score(), "Route registered");
                self.routes.rcu(|routes| {
                    let mut next = Vec::clone(routes);
                    // after every route with a score >= ours: stable on ties
                    let at = next
                        .iter()
                        .position(|r| r.pattern.score() < route.pattern.score())
                        .unwrap_or(next.len());
                    next.insert(at, route.clone());
                    next
                });
            }
            Registration::Middleware(handler) => {
                self.middleware.rcu(|list| {
                    let mut next = Vec::clone(list);
                    next.push(handler.clone());
                    next
                });
            }
            Registration::ErrorHandler(handler) => {
                self.error_handlers.rcu(|list| {
                    let mut next = Vec::clone(list);
                    next.push(handler.clone());
                    next
                });
            }
        }
        Ok(())
    }

    /// Shorthand for registering a routed handler.
    pub fn route(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<(), PatternError> {
        self.register(Registration::Route {
            pattern: pattern.to_string(),
            handler,
        })
    }

    /// Remove the first structurally matching entry. Returns `false` if none matched.
    pub fn unregister(&self, registration: &Registration) -> bool {
        match registration {
            Registration::Route { pattern, handler } => remove_first(&self.routes, |r| {
                r.pattern.as_str() == pattern && same(&r.handler, handler)
            }),
            Registration::Middleware(handler) => {
                remove_first(&self.middleware, |h| same(h, handler))
            }
            Registration::ErrorHandler(handler) => {
                remove_first(&self.error_handlers, |h| same(h, handler))
            }
        }
    }

    /// Snapshot of the routes in priority order.
    pub fn routes(&self) -> Arc<Vec<Arc<Route>>> {
        self.routes.load_full()
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.load().len()
    }

    /// The highest-priority route matching `path`, with its params.
    pub fn find(&self, path: &str) -> Option<(Arc<Route>, std::collections::HashMap<String, String>)> {
        self.routes
            .load()
            .iter()
            .find_map(|r| r.pattern.captures(path).map(|params| (r.clone(), params)))
    }

    /// Run the chain for one request and return the finalized response.
    pub async fn dispatch(&self, ctx: &mut RequestContext) -> Response {
        let middleware = self.middleware.load_full();
        let routes = self.routes.load_full();
        let mut res = Response::new();

        ctx.params.clear();
        let matched = routes
            .iter()
            .find_map(|r| r.pattern.captures(&ctx.path).map(|params| (r, params)));

        let mut chain: Vec<Arc<dyn Handler>> = middleware.iter().cloned().collect();
        if let Some((route, params)) = matched {
            tracing::debug!(request_id = %ctx.request_id, path = %ctx.path, pattern = %route.pattern.as_str(), "Route matched");
            ctx.params = params;
            chain.push(route.handler.clone());
        }

        for stage in chain {
            match stage.handle(ctx, &mut res).await {
                Ok(Flow::Next) => continue,
                Ok(Flow::Done) => return res,
                Err(err) => return self.handle_error(err, ctx, res).await,
            }
        }

        self.not_found(&routes, ctx, res).await
    }

    async fn not_found(
        &self,
        routes: &[Arc<Route>],
        ctx: &mut RequestContext,
        mut res: Response,
    ) -> Response {
        tracing::debug!(request_id = %ctx.request_id, path = %ctx.path, "No handler completed the request");
        res.set_status(StatusCode::NOT_FOUND).clear();

        if let Some(route) = routes.iter().find(|r| r.pattern.as_str() == NOT_FOUND_ROUTE) {
            // the 404 view starts from nothing the yielding page loaded
            ctx.params.clear();
            ctx.data.clear();
            match route.handler.handle(ctx, &mut res).await {
                Ok(Flow::Done) => return res,
                Ok(Flow::Next) => {}
                Err(err) => return self.handle_error(err, ctx, res).await,
            }
            res.set_status(StatusCode::NOT_FOUND);
        }

        res.text("404 Not Found");
        res
    }

    async fn handle_error(
        &self,
        mut err: HttpError,
        ctx: &mut RequestContext,
        mut res: Response,
    ) -> Response {
        let handlers = self.error_handlers.load_full();
        for handler in handlers.iter() {
            match handler.handle(err, ctx, &mut res).await {
                ErrorFlow::Handled => return res,
                ErrorFlow::Next(next) => err = next,
            }
        }
        default_error_handler(err, ctx, res)
    }
}

/// Terminal error handler; always present, always finalizes.
fn default_error_handler(err: HttpError, ctx: &RequestContext, mut res: Response) -> Response {
    tracing::error!(
        request_id = %ctx.request_id,
        path = %ctx.path,
        status = err.status().as_u16(),
        error = %err,
        "Request failed"
    );
    res.set_status(err.status()).clear();
    if let Some(body) = err.body() {
        res.json(body);
    }
    res
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn remove_first<T>(list: &ArcSwap<Vec<T>>, mut predicate: impl FnMut(&T) -> bool) -> bool
where
    T: Clone,
{
    let mut removed = false;
    list.rcu(|current| {
        let mut next = Vec::clone(current);
        removed = match next.iter().position(&mut predicate) {
            Some(at) => {
                next.remove(at);
                true
            }
            None => false,
        };
        next
    });
    removed
}
