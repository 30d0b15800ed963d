//! The load pipeline: events and datasource fetches.
//!
//! # Design Decisions
//! - Events within a stage run one after another
//! - Primary fetches go through a bounded queue and are stored in
//!   registration order; the first failure aborts the request
//! - Primary fetches see the data set as it was when the stage started
//! - Chained fetches run in waves: every datasource whose parent is present
//!   starts concurrently; their failures are logged and swallowed
//! - A chained datasource whose parent failed is skipped; one whose parent
//!   never appears is an error

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::{json, Value};

use crate::controller::Controller;
use crate::datasource::{Datasource, DatasourceCache, DatasourceError, ResolvedQuery};
use crate::error::HttpError;
use crate::observability::metrics;
use crate::provider::ProviderError;
use crate::routing::RequestContext;

/// One datasource fetch, as reported to views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRecord {
    pub datasource: String,
    pub cached: bool,
    pub elapsed_ms: u64,
}

/// Timing of a request's load pipeline.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    pub fetches: Vec<FetchRecord>,
    pub elapsed: Duration,
}

impl LoadStats {
    pub fn to_json(&self) -> Value {
        json!({
            "loadTimeMs": self.elapsed.as_millis() as u64,
            "datasources": self.fetches,
        })
    }
}

struct Fetched {
    data: Value,
    record: FetchRecord,
}

impl Controller {
    /// Run every stage before gating, mutating the working data set.
    pub async fn load_data(&self, ctx: &mut RequestContext) -> Result<LoadStats, HttpError> {
        let started = Instant::now();
        let mut stats = LoadStats::default();

        for event in self.global_events.iter().chain(&self.preload) {
            event.apply(ctx).await?;
        }

        self.fetch_primary(ctx, &mut stats).await?;
        self.fetch_chained(ctx, &mut stats).await?;

        for event in &self.postload {
            event.apply(ctx).await?;
        }

        stats.elapsed = started.elapsed();
        tracing::debug!(
            request_id = %ctx.request_id,
            page = %self.page.name,
            fetches = stats.fetches.len(),
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Page data loaded"
        );
        Ok(stats)
    }

    async fn fetch_primary(
        &self,
        ctx: &mut RequestContext,
        stats: &mut LoadStats,
    ) -> Result<(), HttpError> {
        let primary: Vec<Arc<Datasource>> = self
            .datasources
            .iter()
            .filter(|ds| !ds.is_chained())
            .cloned()
            .collect();
        if primary.is_empty() {
            return Ok(());
        }

        let snapshot = &*ctx;
        let results: Vec<(String, Fetched)> = stream::iter(primary)
            .map(move |ds: Arc<Datasource>| async move {
                let query = self.prepare(&ds, snapshot).await?;
                let fetched = self.fetch(&ds, query, snapshot).await?;
                Ok::<_, HttpError>((ds.key().to_string(), fetched))
            })
            .buffered(self.settings.primary_width.max(1))
            .try_collect()
            .await?;

        for (key, fetched) in results {
            ctx.data.insert(key, fetched.data);
            stats.fetches.push(fetched.record);
        }
        Ok(())
    }

    async fn fetch_chained(
        &self,
        ctx: &mut RequestContext,
        stats: &mut LoadStats,
    ) -> Result<(), HttpError> {
        let mut pending: Vec<&Arc<Datasource>> =
            self.datasources.iter().filter(|ds| ds.is_chained()).collect();
        let mut failed: HashSet<String> = HashSet::new();

        while !pending.is_empty() {
            let (ready, waiting): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|ds| ctx.data.contains_key(parent_of(ds)));

            if ready.is_empty() {
                let (skipped, blocked): (Vec<_>, Vec<_>) = waiting
                    .into_iter()
                    .partition(|ds| failed.contains(parent_of(ds)));
                if skipped.is_empty() {
                    let ds = blocked[0];
                    return Err(DatasourceError::MissingParent {
                        datasource: ds.name().to_string(),
                        parent: parent_of(ds).to_string(),
                    }
                    .into());
                }
                for ds in skipped {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        datasource = %ds.name(),
                        parent = %parent_of(ds),
                        "Skipping chained datasource, parent fetch failed"
                    );
                    failed.insert(ds.key().to_string());
                }
                pending = blocked;
                continue;
            }

            let mut queries = Vec::with_capacity(ready.len());
            for ds in &ready {
                let mut query = self.prepare(ds, ctx).await?;
                ds.apply_chain(&mut query, &ctx.data)?;
                queries.push(query);
            }

            let snapshot = &*ctx;
            let outcomes = join_all(
                ready
                    .iter()
                    .zip(queries)
                    .map(|(ds, query)| self.fetch(ds, query, snapshot)),
            )
            .await;

            for (ds, outcome) in ready.iter().zip(outcomes) {
                match outcome {
                    Ok(fetched) => {
                        ctx.data.insert(ds.key().to_string(), fetched.data);
                        stats.fetches.push(fetched.record);
                    }
                    Err(e) => {
                        tracing::warn!(
                            request_id = %ctx.request_id,
                            datasource = %ds.name(),
                            error = %e,
                            "Chained datasource fetch failed"
                        );
                        failed.insert(ds.key().to_string());
                    }
                }
            }
            pending = waiting;
        }
        Ok(())
    }

    /// Filter event, then request-derived parameters.
    async fn prepare(
        &self,
        ds: &Datasource,
        ctx: &RequestContext,
    ) -> Result<ResolvedQuery, HttpError> {
        let extra = match ds.filter_event() {
            Some(event) => event.filter(ctx).await?,
            None => None,
        };
        Ok(ds.process_request(ctx, &self.page, extra)?)
    }

    /// One fetch through a fresh provider, consulting the cache.
    async fn fetch(
        &self,
        ds: &Datasource,
        query: ResolvedQuery,
        ctx: &RequestContext,
    ) -> Result<Fetched, ProviderError> {
        let started = Instant::now();
        let mut provider = ds.create_provider();
        provider.process_request(&query);
        let endpoint = provider.build_endpoint(&query);

        let use_cache = self.cache.enabled_for(ds, ctx);
        let key = DatasourceCache::key(
            ds.name(),
            &provider.cache_key().unwrap_or_else(|| endpoint.clone()),
        );

        if use_cache {
            if let Some(data) = self.cache.get(ds.name(), &key).await {
                provider.destroy();
                tracing::debug!(request_id = %ctx.request_id, datasource = %ds.name(), "Cache hit");
                metrics::record_datasource_fetch(ds.name(), "cached", started);
                return Ok(Fetched {
                    data,
                    record: record(ds, true, started),
                });
            }
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            datasource = %ds.name(),
            endpoint = %endpoint,
            "Fetching datasource"
        );
        let result = provider.load(&endpoint).await;
        provider.destroy();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::record_datasource_fetch(ds.name(), "error", started);
                return Err(e);
            }
        };

        if use_cache {
            self.cache.set(&key, response.payload()).await;
        }
        metrics::record_datasource_fetch(ds.name(), "fetched", started);

        Ok(Fetched {
            data: response.data,
            record: record(ds, false, started),
        })
    }
}

fn parent_of(ds: &Datasource) -> &str {
    ds.chained().map(|c| c.datasource.as_str()).unwrap_or_default()
}

fn record(ds: &Datasource, cached: bool, started: Instant) -> FetchRecord {
    FetchRecord {
        datasource: ds.name().to_string(),
        cached,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::http::StatusCode;

    use crate::cache::MemoryCache;
    use crate::config::schema::{
        CachingConfig, ChainedConfig, DatasourceConfig, OutputParamConfig, ParamTarget,
        SourceConfig, ValueType,
    };
    use crate::controller::{Page, PipelineSettings};
    use crate::event::{from_fn, EventOutcome, EventRegistry, LoadOrder};
    use crate::provider::{Provider, ProviderFactory, ProviderRegistry, ProviderResponse};
    use crate::render::{RenderError, Renderer};

    /// Shared log of what scripted providers did.
    #[derive(Default)]
    struct Journal {
        completed: Mutex<Vec<String>>,
        endpoints: Mutex<Vec<String>>,
        loads: Mutex<usize>,
    }

    struct Scripted {
        journal: Arc<Journal>,
        delays: HashMap<String, u64>,
        failures: HashSet<String>,
    }

    impl ProviderFactory for Scripted {
        fn create(&self, datasource: &str, _schema: &DatasourceConfig) -> Box<dyn Provider> {
            Box::new(ScriptedProvider {
                name: datasource.to_string(),
                journal: self.journal.clone(),
                delay: self.delays.get(datasource).copied().unwrap_or(0),
                fail: self.failures.contains(datasource),
                query: ResolvedQuery::default(),
            })
        }
    }

    struct ScriptedProvider {
        name: String,
        journal: Arc<Journal>,
        delay: u64,
        fail: bool,
        query: ResolvedQuery,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn process_request(&mut self, query: &ResolvedQuery) {
            self.query = query.clone();
        }

        fn build_endpoint(&self, query: &ResolvedQuery) -> String {
            format!(
                "{}?filter={}",
                query.endpoint,
                Value::Object(query.filter.clone())
            )
        }

        async fn load(&mut self, endpoint: &str) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_millis(self.delay)).await;
            *self.journal.loads.lock().unwrap() += 1;
            self.journal.endpoints.lock().unwrap().push(endpoint.to_string());
            if self.fail {
                return Err(ProviderError::Status {
                    url: endpoint.to_string(),
                    status: StatusCode::BAD_GATEWAY,
                    body: Some(json!({ "error": "upstream" })),
                });
            }
            self.journal.completed.lock().unwrap().push(self.name.clone());
            Ok(ProviderResponse::new(json!({
                "results": [{ "id": 7, "name": self.name, "filter": self.query.filter }]
            })))
        }
    }

    struct NullRenderer;

    #[async_trait]
    impl Renderer for NullRenderer {
        async fn render(&self, _: &str, _: &serde_json::Map<String, Value>) -> Result<String, RenderError> {
            Ok(String::new())
        }
    }

    struct Harness {
        journal: Arc<Journal>,
        providers: ProviderRegistry,
    }

    impl Harness {
        fn new(delays: &[(&str, u64)], failures: &[&str]) -> Self {
            let journal = Arc::new(Journal::default());
            let mut providers = ProviderRegistry::new();
            providers.register(
                "scripted",
                Arc::new(Scripted {
                    journal: journal.clone(),
                    delays: delays.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                    failures: failures.iter().map(|s| s.to_string()).collect(),
                }),
            );
            Self { journal, providers }
        }

        fn datasource(&self, name: &str, chained: Option<(&str, &str)>) -> Arc<Datasource> {
            let schema = DatasourceConfig {
                source: SourceConfig {
                    kind: "scripted".into(),
                    endpoint: Some(format!("mock://{name}")),
                    ..Default::default()
                },
                chained: chained.map(|(parent, path)| ChainedConfig {
                    datasource: parent.into(),
                    output_param: OutputParamConfig {
                        param: path.into(),
                        field: Some("parentId".into()),
                        target: ParamTarget::Filter,
                        kind: Some(ValueType::Number),
                        query: None,
                    },
                }),
                cache: true,
                ..Default::default()
            };
            Arc::new(Datasource::new(name, schema, &self.providers, &EventRegistry::new()).unwrap())
        }

        fn controller(&self, datasources: Vec<Arc<Datasource>>, width: usize) -> Controller {
            let settings = PipelineSettings {
                primary_width: width,
                ..Default::default()
            };
            let cache = DatasourceCache::new(
                Arc::new(MemoryCache::new(Duration::from_secs(60))),
                &CachingConfig::default(),
                false,
            );
            Controller::new(
                Page {
                    name: "test".into(),
                    ..Default::default()
                },
                settings,
                cache,
                Arc::new(NullRenderer),
            )
            .with_datasources(datasources)
        }

        fn completed(&self) -> Vec<String> {
            self.journal.completed.lock().unwrap().clone()
        }

        fn loads(&self) -> usize {
            *self.journal.loads.lock().unwrap()
        }
    }

    #[tokio::test]
    async fn test_sequential_primary_queue_completes_in_order() {
        let h = Harness::new(&[("a", 60), ("b", 0), ("c", 20)], &[]);
        let controller = h.controller(
            vec![h.datasource("a", None), h.datasource("b", None), h.datasource("c", None)],
            1,
        );

        let mut ctx = RequestContext::get("/");
        let stats = controller.load_data(&mut ctx).await.unwrap();

        assert_eq!(h.completed(), ["a", "b", "c"]);
        let keys: Vec<&str> = ctx.data.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(stats.fetches.len(), 3);
    }

    #[tokio::test]
    async fn test_wide_primary_queue_still_stores_every_result() {
        let h = Harness::new(&[("a", 60), ("b", 0), ("c", 20)], &[]);
        let controller = h.controller(
            vec![h.datasource("a", None), h.datasource("b", None), h.datasource("c", None)],
            3,
        );

        let mut ctx = RequestContext::get("/");
        let stats = controller.load_data(&mut ctx).await.unwrap();

        assert_eq!(h.completed(), ["b", "c", "a"]);
        let order: Vec<&str> = stats.fetches.iter().map(|f| f.datasource.as_str()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_primary_failure_aborts_with_upstream_status() {
        let h = Harness::new(&[], &["a"]);
        let controller = h.controller(vec![h.datasource("a", None), h.datasource("b", None)], 1);

        let err = controller.load_data(&mut RequestContext::get("/")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.body().unwrap()["error"], "upstream");
        assert!(h.completed().is_empty());
        assert_eq!(h.loads(), 1);
    }

    #[tokio::test]
    async fn test_chained_receives_parent_value() {
        let h = Harness::new(&[], &[]);
        let controller = h.controller(
            vec![h.datasource("models", Some(("make", "results.0.id"))), h.datasource("make", None)],
            1,
        );

        let mut ctx = RequestContext::get("/");
        controller.load_data(&mut ctx).await.unwrap();
        assert_eq!(ctx.data["models"]["results"][0]["filter"]["parentId"], 7);
    }

    #[tokio::test]
    async fn test_chained_waves_follow_dependencies() {
        let h = Harness::new(&[], &[]);
        let controller = h.controller(
            vec![
                h.datasource("trims", Some(("models", "results.0.id"))),
                h.datasource("models", Some(("make", "results.0.id"))),
                h.datasource("make", None),
            ],
            1,
        );

        let mut ctx = RequestContext::get("/");
        controller.load_data(&mut ctx).await.unwrap();
        assert_eq!(h.completed(), ["make", "models", "trims"]);
    }

    #[tokio::test]
    async fn test_ready_chained_siblings_fetch_concurrently() {
        let h = Harness::new(&[("models", 120), ("dealers", 100)], &[]);
        let controller = h.controller(
            vec![
                h.datasource("make", None),
                h.datasource("models", Some(("make", "results.0.id"))),
                h.datasource("dealers", Some(("make", "results.0.id"))),
            ],
            1,
        );

        let started = std::time::Instant::now();
        controller.load_data(&mut RequestContext::get("/")).await.unwrap();
        let elapsed = started.elapsed();

        // one after the other would take at least 220ms and finish models first
        assert!(elapsed < Duration::from_millis(200), "chained stage took {elapsed:?}");
        assert_eq!(h.completed(), ["make", "dealers", "models"]);
    }

    #[tokio::test]
    async fn test_chained_missing_parent_names_both() {
        let h = Harness::new(&[], &[]);
        let controller = h.controller(vec![h.datasource("models", Some(("make", "results.0.id")))], 1);

        let err = controller.load_data(&mut RequestContext::get("/")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message().contains("'models'"));
        assert!(err.message().contains("'make'"));
    }

    #[tokio::test]
    async fn test_chained_failures_are_swallowed() {
        let h = Harness::new(&[], &["models"]);
        let controller = h.controller(
            vec![
                h.datasource("make", None),
                h.datasource("models", Some(("make", "results.0.id"))),
                h.datasource("trims", Some(("models", "results.0.id"))),
                h.datasource("dealers", Some(("make", "results.0.id"))),
            ],
            1,
        );

        let mut ctx = RequestContext::get("/");
        controller.load_data(&mut ctx).await.unwrap();
        assert!(ctx.data.contains_key("make"));
        assert!(ctx.data.contains_key("dealers"));
        assert!(!ctx.data.contains_key("models"));
        assert!(!ctx.data.contains_key("trims"));
    }

    #[tokio::test]
    async fn test_events_wrap_fetches_in_order() {
        let h = Harness::new(&[], &[]);
        let mut events = EventRegistry::new();
        events.register(
            "seed",
            from_fn(|ctx| {
                let mut data = ctx.data.clone();
                data.insert("seeded".into(), json!(true));
                Ok(EventOutcome::ReplaceAll(data))
            }),
        );
        events.register(
            "count",
            from_fn(|ctx| Ok(EventOutcome::Merge(json!(ctx.data.len())))),
        );

        let controller = h
            .controller(vec![h.datasource("a", None)], 1)
            .with_global_events(vec![events.resolve("seed", None, LoadOrder::Preload).unwrap()])
            .with_postload_events(vec![events.resolve("count", Some("test"), LoadOrder::Postload).unwrap()]);

        let mut ctx = RequestContext::get("/");
        controller.load_data(&mut ctx).await.unwrap();
        assert_eq!(ctx.data["seeded"], true);
        // seeded + a, counted before the event's own key is attached
        assert_eq!(ctx.data["count"], 2);
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_fetches() {
        let h = Harness::new(&[], &[]);
        let controller = h.controller(vec![h.datasource("a", None)], 1);

        let mut first = RequestContext::get("/");
        controller.load_data(&mut first).await.unwrap();
        let mut second = RequestContext::get("/");
        let stats = controller.load_data(&mut second).await.unwrap();

        assert_eq!(h.loads(), 1);
        assert!(stats.fetches[0].cached);
        assert_eq!(first.data["a"], second.data["a"]);

        let mut bypass = RequestContext::get("/?cache=false");
        controller.load_data(&mut bypass).await.unwrap();
        assert_eq!(h.loads(), 2);
    }
}
