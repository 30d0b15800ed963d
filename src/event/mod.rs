//! Events: named hooks that transform the working data set.
//!
//! # Data Flow
//! ```text
//! Site load:
//!     event name in config → EventRegistry::resolve → Event (shared)
//!
//! Per request:
//!     global events → page preload events → [fetch] → page postload events
//!     each: handler.run(ctx) → EventOutcome
//!         ReplaceAll(data) → working data set replaced
//!         Merge(value)     → data[event name] = value
//!         Unchanged        → nothing
//! ```
//!
//! # Design Decisions
//! - Events in a stage run strictly one after another
//! - An event error aborts the request through the error chain
//! - Filter events reuse the same handler trait; their object result is
//!   merged into the datasource filter

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::error::HttpError;
use crate::routing::RequestContext;

/// When an event runs relative to datasource fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrder {
    Preload,
    Postload,
}

/// What an event did to the working data set.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Replace the whole working data set.
    ReplaceAll(Map<String, Value>),
    /// Attach a partial result under the event's name.
    Merge(Value),
    Unchanged,
}

/// Failure raised by an event handler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EventError {
    message: String,
    status: StatusCode,
}

impl EventError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

/// User-supplied event logic.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn run(&self, ctx: &RequestContext) -> Result<EventOutcome, EventError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&RequestContext) -> Result<EventOutcome, EventError> + Send + Sync,
{
    async fn run(&self, ctx: &RequestContext) -> Result<EventOutcome, EventError> {
        (self.0)(ctx)
    }
}

/// Wrap a synchronous closure as an event handler.
pub fn from_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&RequestContext) -> Result<EventOutcome, EventError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// A resolved event bound to its owner and stage.
#[derive(Clone)]
pub struct Event {
    name: String,
    page: Option<String>,
    order: LoadOrder,
    handler: Arc<dyn EventHandler>,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("page", &self.page)
            .field("order", &self.order)
            .finish()
    }
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        page: Option<String>,
        order: LoadOrder,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            page,
            order,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning page; `None` for global events.
    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }

    pub fn order(&self) -> LoadOrder {
        self.order
    }

    fn failure(&self, err: EventError) -> HttpError {
        HttpError::new(err.status, format!("event '{}' failed: {}", self.name, err.message))
    }

    /// Run the event and apply its outcome to the working data set.
    pub async fn apply(&self, ctx: &mut RequestContext) -> Result<(), HttpError> {
        tracing::debug!(request_id = %ctx.request_id, event = %self.name, "Running event");
        let outcome = self.handler.run(ctx).await.map_err(|e| self.failure(e))?;
        match outcome {
            EventOutcome::ReplaceAll(data) => ctx.data = data,
            EventOutcome::Merge(value) => {
                ctx.data.insert(self.name.clone(), value);
            }
            EventOutcome::Unchanged => {}
        }
        Ok(())
    }

    /// Run as a filter event: an object result becomes extra filter fields.
    pub async fn filter(&self, ctx: &RequestContext) -> Result<Option<Map<String, Value>>, HttpError> {
        let outcome = self.handler.run(ctx).await.map_err(|e| self.failure(e))?;
        Ok(match outcome {
            EventOutcome::ReplaceAll(map) => Some(map),
            EventOutcome::Merge(Value::Object(map)) => Some(map),
            EventOutcome::Merge(_) | EventOutcome::Unchanged => None,
        })
    }
}

/// Event name → handler, filled by the embedding application.
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Bind a registered handler to an owner and stage.
    pub fn resolve(
        &self,
        name: &str,
        page: Option<&str>,
        order: LoadOrder,
    ) -> Result<Event, ConfigError> {
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownEvent {
                event: name.to_string(),
                owner: page.unwrap_or("global").to_string(),
            })?;
        Ok(Event::new(name, page.map(str::to_string), order, handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> EventRegistry {
        let mut registry = EventRegistry::new();
        registry.register(
            "greeting",
            from_fn(|_| Ok(EventOutcome::Merge(json!({ "text": "hello" })))),
        );
        registry.register(
            "reset",
            from_fn(|_| {
                let mut data = Map::new();
                data.insert("fresh".into(), json!(true));
                Ok(EventOutcome::ReplaceAll(data))
            }),
        );
        registry.register("noop", from_fn(|_| Ok(EventOutcome::Unchanged)));
        registry.register(
            "broken",
            from_fn(|_| Err(EventError::new("no luck").with_status(StatusCode::FORBIDDEN))),
        );
        registry
    }

    #[tokio::test]
    async fn test_merge_attaches_under_event_name() {
        let event = registry().resolve("greeting", Some("home"), LoadOrder::Preload).unwrap();
        let mut ctx = RequestContext::get("/");
        ctx.data.insert("existing".into(), json!(1));
        event.apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.data["greeting"]["text"], "hello");
        assert_eq!(ctx.data["existing"], 1);
    }

    #[tokio::test]
    async fn test_replace_all_and_unchanged() {
        let registry = registry();
        let mut ctx = RequestContext::get("/");
        ctx.data.insert("existing".into(), json!(1));

        let noop = registry.resolve("noop", None, LoadOrder::Postload).unwrap();
        noop.apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.data.len(), 1);

        let reset = registry.resolve("reset", None, LoadOrder::Postload).unwrap();
        reset.apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.data.len(), 1);
        assert_eq!(ctx.data["fresh"], true);
    }

    #[tokio::test]
    async fn test_error_names_event_and_keeps_status() {
        let event = registry().resolve("broken", Some("home"), LoadOrder::Preload).unwrap();
        let err = event.apply(&mut RequestContext::get("/")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "event 'broken' failed: no luck");
    }

    #[tokio::test]
    async fn test_filter_event_result() {
        let event = registry().resolve("greeting", None, LoadOrder::Preload).unwrap();
        let filter = event.filter(&RequestContext::get("/")).await.unwrap().unwrap();
        assert_eq!(filter["text"], "hello");
    }

    #[test]
    fn test_unknown_event() {
        let err = registry().resolve("missing", Some("home"), LoadOrder::Preload).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEvent { ref owner, .. } if owner == "home"));
    }
}
