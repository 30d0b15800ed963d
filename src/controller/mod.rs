//! Page controllers: the per-page request pipeline.
//!
//! # Data Flow
//! ```text
//! Router match → Controller::handle
//!     → view_data.rs   (params, page metadata, toggles)
//!     → pipeline.rs    (preload events → primary fetch → chained fetch
//!                       → postload events)
//!     → gating         (required datasources have results, else not-found)
//!     → render.rs      (JSON view or template render)
//! ```
//!
//! # Design Decisions
//! - One controller per page, built at site load and shared by requests
//! - A gating miss is not an error: the handler yields to the not-found
//!   terminal
//! - Every fetch failure before gating aborts the request, except chained
//!   fetches which are best-effort

pub mod page;
pub mod pipeline;
pub mod render;
pub mod view_data;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GlobalConfig;
use crate::datasource::{Datasource, DatasourceCache};
use crate::error::HttpError;
use crate::event::Event;
use crate::render::Renderer;
use crate::routing::{Flow, Handler, RequestContext, Response};

pub use page::Page;
pub use pipeline::{FetchRecord, LoadStats};

/// Process-wide pipeline toggles.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub debug: bool,
    pub allow_json_view: bool,
    pub csrf: bool,
    /// Width of the primary fetch queue; 1 fetches sequentially.
    pub primary_width: usize,
}

impl From<&GlobalConfig> for PipelineSettings {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            debug: config.debug,
            allow_json_view: config.allow_json_view,
            csrf: config.csrf,
            primary_width: config.primary_fetch_concurrency,
        }
    }
}

/// The request orchestrator for one page.
pub struct Controller {
    page: Page,
    datasources: Vec<Arc<Datasource>>,
    global_events: Vec<Event>,
    preload: Vec<Event>,
    postload: Vec<Event>,
    settings: PipelineSettings,
    cache: DatasourceCache,
    renderer: Arc<dyn Renderer>,
}

impl Controller {
    pub fn new(
        page: Page,
        settings: PipelineSettings,
        cache: DatasourceCache,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            page,
            datasources: Vec::new(),
            global_events: Vec::new(),
            preload: Vec::new(),
            postload: Vec::new(),
            settings,
            cache,
            renderer,
        }
    }

    /// Datasources in registration (fetch) order.
    pub fn with_datasources(mut self, datasources: Vec<Arc<Datasource>>) -> Self {
        self.datasources = datasources;
        self
    }

    pub fn with_global_events(mut self, events: Vec<Event>) -> Self {
        self.global_events = events;
        self
    }

    pub fn with_preload_events(mut self, events: Vec<Event>) -> Self {
        self.preload = events;
        self
    }

    pub fn with_postload_events(mut self, events: Vec<Event>) -> Self {
        self.postload = events;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn datasources(&self) -> &[Arc<Datasource>] {
        &self.datasources
    }
}

#[async_trait]
impl Handler for Controller {
    async fn handle(&self, ctx: &mut RequestContext, res: &mut Response) -> Result<Flow, HttpError> {
        view_data::build_initial_view_data(ctx, &self.page, &self.settings);

        let stats = self.load_data(ctx).await?;

        if !view_data::required_data_present(&ctx.data, &self.page.required_datasources) {
            tracing::debug!(
                request_id = %ctx.request_id,
                page = %self.page.name,
                "Required data missing, yielding to not found"
            );
            return Ok(Flow::Next);
        }

        self.render(ctx, res, &stats).await?;
        Ok(Flow::Done)
    }
}
