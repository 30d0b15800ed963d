//! Routing and dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path, query)
//!     → context.rs (RequestContext with empty params)
//!     → router.rs (snapshot middleware + routes, first match wins)
//!     → matcher.rs (compiled pattern → named params)
//!     → chain: global middleware → route handler → not-found terminal
//!     → on error: error handlers → default handler
//!     → Response
//!
//! Registration (at site load, or any time after):
//!     pattern + handler
//!     → compile + score
//!     → insert after every route with score >= ours
//! ```
//!
//! # Design Decisions
//! - Deterministic: same registrations always match the same route
//! - Middleware vs error handler is an explicit registration tag
//! - Handlers signal failure through their return value only

pub mod context;
pub mod matcher;
pub mod router;

pub use context::{RequestContext, Response};
pub use matcher::{PathPattern, PatternError};
pub use router::{ErrorFlow, ErrorHandler, Flow, Handler, Registration, Route, Router, NOT_FOUND_ROUTE};
