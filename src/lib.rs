//! page-composer: routes HTTP requests to pages and assembles each page's
//! view model from named datasources before rendering.

// Core subsystems
pub mod config;
pub mod routing;
pub mod controller;
pub mod datasource;
pub mod provider;
pub mod event;
pub mod cache;
pub mod render;

// Assembly and serving
pub mod app;
pub mod http;
pub mod admin;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use app::{Site, SiteBuilder};
pub use config::schema::ComposerConfig;
pub use error::HttpError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
