//! Render dispatch: JSON view or template.

use serde_json::Value;

use crate::controller::view_data::{json_view_requested, INTERNAL_TOGGLES};
use crate::controller::{Controller, LoadStats};
use crate::error::HttpError;
use crate::routing::{RequestContext, Response};

impl Controller {
    /// Write the page response from the loaded working data set.
    pub async fn render(
        &self,
        ctx: &mut RequestContext,
        res: &mut Response,
        stats: &LoadStats,
    ) -> Result<(), HttpError> {
        if json_view_requested(ctx, &self.settings) {
            let mut view = ctx.data.clone();
            for toggle in INTERNAL_TOGGLES {
                view.remove(*toggle);
            }
            res.json(&Value::Object(view));
            return Ok(());
        }

        ctx.data.insert("stats".into(), stats.to_json());
        ctx.data
            .insert("version".into(), Value::String(env!("CARGO_PKG_VERSION").into()));

        let html = self.renderer.render(self.page.template(), &ctx.data).await?;
        tracing::debug!(
            request_id = %ctx.request_id,
            page = %self.page.name,
            template = %self.page.template(),
            "Page rendered"
        );
        res.html(html);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::{header, StatusCode};
    use serde_json::{json, Map};

    use crate::cache::MemoryCache;
    use crate::config::schema::CachingConfig;
    use crate::controller::{Page, PipelineSettings};
    use crate::datasource::DatasourceCache;
    use crate::render::{RenderError, Renderer};
    use crate::routing::{Flow, Handler};

    struct Echo;

    #[async_trait]
    impl Renderer for Echo {
        async fn render(&self, template: &str, data: &Map<String, Value>) -> Result<String, RenderError> {
            if template == "broken" {
                return Err(RenderError::Other("bad template".into()));
            }
            if template == "missing" {
                return Err(RenderError::NotFound(template.into()));
            }
            Ok(format!("{template}:{}", data["page"]["name"]))
        }
    }

    fn controller(template: Option<&str>, required: &[&str]) -> Controller {
        let settings = PipelineSettings {
            allow_json_view: true,
            debug: true,
            primary_width: 1,
            ..Default::default()
        };
        let cache = DatasourceCache::new(
            Arc::new(MemoryCache::new(Duration::from_secs(1))),
            &CachingConfig::default(),
            true,
        );
        let page = Page {
            name: "home".into(),
            template: template.map(str::to_string),
            required_datasources: required.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        Controller::new(page, settings, cache, Arc::new(Echo))
    }

    #[tokio::test]
    async fn test_html_view_renders_template() {
        let mut ctx = RequestContext::get("/");
        let mut res = Response::new();
        let flow = controller(None, &[]).handle(&mut ctx, &mut res).await.unwrap();

        assert_eq!(flow, Flow::Done);
        assert_eq!(&res.body[..], br#"home:"home""#);
        assert_eq!(res.headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(ctx.data["stats"]["loadTimeMs"].is_u64());
        assert_eq!(ctx.data["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_json_view_strips_toggles() {
        let mut ctx = RequestContext::get("/?json=true");
        let mut res = Response::new();
        controller(None, &[]).handle(&mut ctx, &mut res).await.unwrap();

        let body: Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(body["page"]["name"], "home");
        assert_eq!(body["query"]["json"], "true");
        assert!(body.get("json").is_none());
        assert!(body.get("debug").is_none());
        assert!(body.get("stats").is_none());
    }

    #[tokio::test]
    async fn test_gating_miss_yields() {
        let mut ctx = RequestContext::get("/");
        let mut res = Response::new();
        let flow = controller(None, &["reviews"]).handle(&mut ctx, &mut res).await.unwrap();
        assert_eq!(flow, Flow::Next);
        assert!(res.body.is_empty());
    }

    #[tokio::test]
    async fn test_render_error_is_500() {
        let mut ctx = RequestContext::get("/");
        let mut res = Response::new();
        let err = controller(Some("broken"), &[])
            .handle(&mut ctx, &mut res)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_template_is_500_not_404() {
        let mut ctx = RequestContext::get("/");
        let mut res = Response::new();
        let err = controller(Some("missing"), &[])
            .handle(&mut ctx, &mut res)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
