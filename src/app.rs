//! Site assembly: config + registries → router, controllers, datasources.
//!
//! # Data Flow
//! ```text
//! SiteBuilder (providers, events, renderer, cache backend, extra registrations)
//!     + ComposerConfig
//!     → datasources built once, provider types and filter events resolved
//!     → one Controller per page, its routes registered on a fresh Router
//!     → Site (immutable, swapped whole on reload)
//! ```
//!
//! # Design Decisions
//! - The builder outlives sites so the cache backend survives reloads
//! - Any unknown provider type, event name or bad pattern fails the build
//!   and the previous site stays in service

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheBackend, MemoryCache};
use crate::config::validation::ValidationError;
use crate::config::{ComposerConfig, ConfigError};
use crate::controller::{Controller, Page, PipelineSettings};
use crate::datasource::{Datasource, DatasourceCache};
use crate::event::{EventHandler, EventRegistry, LoadOrder};
use crate::http::middleware::ResponseHeaders;
use crate::provider::{self, ProviderFactory, ProviderRegistry};
use crate::render::{FileRenderer, Renderer};
use crate::routing::{Registration, Router};

/// Collects everything a site needs besides its config.
#[derive(Clone)]
pub struct SiteBuilder {
    providers: ProviderRegistry,
    events: EventRegistry,
    renderer: Arc<dyn Renderer>,
    cache_backend: Arc<dyn CacheBackend>,
    remote_backend: bool,
    registrations: Vec<Registration>,
}

impl SiteBuilder {
    /// Builder with the built-in providers, the file renderer and an
    /// in-memory cache.
    pub fn new(config: &ComposerConfig) -> Result<Self, ConfigError> {
        let client = provider::http_client(&config.remote)?;
        Ok(Self {
            providers: ProviderRegistry::with_defaults(client),
            events: EventRegistry::new(),
            renderer: Arc::new(FileRenderer::new(&config.templates.directory)),
            cache_backend: Arc::new(MemoryCache::new(Duration::from_secs(
                config.caching.ttl_secs,
            ))),
            remote_backend: false,
            registrations: Vec::new(),
        })
    }

    /// Register a custom provider type.
    pub fn with_provider(mut self, kind: &str, factory: Arc<dyn ProviderFactory>) -> Self {
        self.providers.register(kind, factory);
        self
    }

    /// Register an event handler under the name config refers to.
    pub fn with_event(mut self, name: &str, handler: Arc<dyn EventHandler>) -> Self {
        self.events.register(name, handler);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the in-memory store with a shared one. Required for
    /// `[caching].remote`.
    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = backend;
        self.remote_backend = true;
        self
    }

    /// Extra routes, middleware or error handlers added after the pages.
    pub fn with_registration(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Assemble a site from `config`.
    pub fn build(&self, config: &ComposerConfig) -> Result<Site, ConfigError> {
        if config.caching.remote && !self.remote_backend {
            return Err(ConfigError::RemoteCacheWithoutBackend);
        }

        let settings = PipelineSettings::from(&config.global);
        let cache = DatasourceCache::new(
            self.cache_backend.clone(),
            &config.caching,
            config.global.debug,
        );
        let router = Router::new();

        let headers = ResponseHeaders::from_config(&config.server.headers)?;
        if !headers.is_empty() {
            router.register(Registration::Middleware(Arc::new(headers)))?;
        }

        let mut datasources = BTreeMap::new();
        for (name, schema) in &config.datasources {
            let datasource = Datasource::new(name, schema.clone(), &self.providers, &self.events)?;
            datasources.insert(name.clone(), Arc::new(datasource));
        }

        let global_events = config
            .global
            .events
            .iter()
            .map(|name| self.events.resolve(name, None, LoadOrder::Preload))
            .collect::<Result<Vec<_>, _>>()?;

        let mut controllers = Vec::with_capacity(config.pages.len());
        for page_config in &config.pages {
            let page = Page::from(page_config);

            let page_datasources = page
                .datasources
                .iter()
                .map(|name| {
                    datasources.get(name).cloned().ok_or_else(|| {
                        ConfigError::Validation(vec![ValidationError::UnknownDatasource {
                            page: page.name.clone(),
                            datasource: name.clone(),
                        }])
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let preload = page_config
                .preload_events
                .iter()
                .map(|name| self.events.resolve(name, Some(&page.name), LoadOrder::Preload))
                .collect::<Result<Vec<_>, _>>()?;
            let postload = page_config
                .events
                .iter()
                .map(|name| self.events.resolve(name, Some(&page.name), LoadOrder::Postload))
                .collect::<Result<Vec<_>, _>>()?;

            let controller = Arc::new(
                Controller::new(page, settings.clone(), cache.clone(), self.renderer.clone())
                    .with_datasources(page_datasources)
                    .with_global_events(global_events.clone())
                    .with_preload_events(preload)
                    .with_postload_events(postload),
            );

            for pattern in &controller.page().routes {
                router.route(pattern, controller.clone())?;
            }
            tracing::debug!(
                page = %controller.page().name,
                routes = controller.page().routes.len(),
                datasources = controller.datasources().len(),
                "Page assembled"
            );
            controllers.push(controller);
        }

        for registration in &self.registrations {
            router.register(registration.clone())?;
        }

        tracing::info!(
            pages = controllers.len(),
            datasources = datasources.len(),
            routes = router.routes().len(),
            "Site built"
        );

        Ok(Site {
            router,
            controllers,
            cache,
        })
    }
}

/// An assembled site: the router plus the page controllers behind it.
pub struct Site {
    router: Router,
    controllers: Vec<Arc<Controller>>,
    cache: DatasourceCache,
}

impl Site {
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn controllers(&self) -> &[Arc<Controller>] {
        &self.controllers
    }

    /// Page names in configuration order.
    pub fn page_names(&self) -> Vec<String> {
        self.controllers.iter().map(|c| c.page().name.clone()).collect()
    }

    /// Route patterns in priority order.
    pub fn route_patterns(&self) -> Vec<String> {
        self.router
            .routes()
            .iter()
            .map(|r| r.pattern().as_str().to_string())
            .collect()
    }

    /// The page controller `path` routes to, if it routes to one.
    pub fn controller_for(&self, path: &str) -> Option<&Arc<Controller>> {
        let (route, _) = self.router.find(path)?;
        self.controllers
            .iter()
            .find(|c| std::ptr::addr_eq(Arc::as_ptr(c), Arc::as_ptr(route.handler())))
    }

    /// Flush every cached entry.
    pub async fn flush_all(&self) -> usize {
        self.cache.flush("*").await
    }

    /// Flush the cached datasources of the page `path` routes to.
    ///
    /// Returns `None` when the path does not route to a page.
    pub async fn flush_path(&self, path: &str) -> Option<usize> {
        let controller = self.controller_for(path)?;
        let mut removed = 0;
        for datasource in controller.datasources() {
            removed += self.cache.flush_datasource(datasource.name()).await;
        }
        tracing::info!(path, page = %controller.page().name, removed, "Flushed page cache");
        Some(removed)
    }
}
