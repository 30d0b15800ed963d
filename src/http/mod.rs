//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, request ID, trace, timeout layers)
//!     → /api/* → admin
//!     → anything else → RequestContext → site Router::dispatch
//!     → Response → client
//! ```

pub mod middleware;
pub mod server;

pub use server::{AppState, HttpServer};
