//! Logs and metrics for the composer.
//!
//! # Data Flow
//! ```text
//! dispatch_handler   → request counter + latency histogram
//! pipeline fetch     → per-datasource fetch counter + latency
//! datasource cache   → hit/miss counter
//! every subsystem    → tracing events, filtered by EnvFilter, to stdout
//! ```
//!
//! # Design Decisions
//! - Labels stay low-cardinality: method, status, datasource name, outcome
//! - The Prometheus listener is optional; the macros are no-ops without it

pub mod logging;
pub mod metrics;
