//! Initial view model and the gating check.

use serde_json::{Map, Value};

use crate::controller::{Page, PipelineSettings};
use crate::routing::RequestContext;

/// Keys controlling the pipeline that are never shown in the JSON view.
pub const INTERNAL_TOGGLES: &[&str] = &["json", "debug"];

/// Whether this request asked for, and is allowed, the JSON view.
pub fn json_view_requested(ctx: &RequestContext, settings: &PipelineSettings) -> bool {
    settings.allow_json_view && ctx.query_flag("json")
}

/// Seed the working data set with request and page details.
///
/// Path params and query params are merged into `params`; query values win.
pub fn build_initial_view_data(ctx: &mut RequestContext, page: &Page, settings: &PipelineSettings) {
    let mut params: Map<String, Value> = ctx
        .params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    params.extend(
        ctx.query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
    );
    let query: Map<String, Value> = ctx
        .query
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let json = json_view_requested(ctx, settings);

    let data = &mut ctx.data;
    data.insert("query".into(), Value::Object(query));
    data.insert("params".into(), Value::Object(params));
    data.insert("pathname".into(), Value::String(ctx.path.clone()));
    data.insert("page".into(), page.metadata());
    data.insert("debug".into(), Value::Bool(settings.debug));
    data.insert("json".into(), Value::Bool(json));
    if settings.csrf {
        data.insert(
            "csrfToken".into(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
}

/// Every required key is present with a non-empty `results` list.
pub fn required_data_present(data: &Map<String, Value>, required: &[String]) -> bool {
    required.iter().all(|key| {
        data.get(key)
            .and_then(|value| value.get("results"))
            .and_then(Value::as_array)
            .is_some_and(|results| !results.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(allow_json_view: bool, csrf: bool) -> PipelineSettings {
        PipelineSettings {
            allow_json_view,
            csrf,
            ..Default::default()
        }
    }

    #[test]
    fn test_params_merge_query_overrides_path() {
        let mut ctx = RequestContext::get("/cars/honda?make=vw&page=2");
        ctx.params.insert("make".into(), "honda".into());
        ctx.params.insert("model".into(), "civic".into());
        let page = Page {
            name: "cars".into(),
            ..Default::default()
        };

        build_initial_view_data(&mut ctx, &page, &settings(false, false));
        assert_eq!(ctx.data["params"], json!({ "make": "vw", "model": "civic", "page": "2" }));
        assert_eq!(ctx.data["pathname"], "/cars/honda");
        assert_eq!(ctx.data["page"]["name"], "cars");
        assert_eq!(ctx.data["json"], false);
        assert!(!ctx.data.contains_key("csrfToken"));
        // route params themselves stay untouched
        assert_eq!(ctx.params["make"], "honda");
    }

    #[test]
    fn test_json_view_needs_both_flags() {
        let page = Page::default();
        for (allowed, uri, expected) in [
            (true, "/?json=true", true),
            (false, "/?json=true", false),
            (true, "/", false),
            (true, "/?json=1", false),
        ] {
            let mut ctx = RequestContext::get(uri);
            build_initial_view_data(&mut ctx, &page, &settings(allowed, false));
            assert_eq!(ctx.data["json"], expected, "{uri} allowed={allowed}");
        }
    }

    #[test]
    fn test_csrf_token() {
        let mut ctx = RequestContext::get("/");
        build_initial_view_data(&mut ctx, &Page::default(), &settings(false, true));
        assert!(ctx.data["csrfToken"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn test_required_data_present() {
        let required = vec!["reviews".to_string()];
        let mut data = Map::new();
        assert!(!required_data_present(&data, &required));

        data.insert("reviews".into(), json!({ "results": [] }));
        assert!(!required_data_present(&data, &required));

        data.insert("reviews".into(), json!({ "metadata": {} }));
        assert!(!required_data_present(&data, &required));

        data.insert("reviews".into(), json!({ "results": [{ "id": 1 }] }));
        assert!(required_data_present(&data, &required));

        assert!(required_data_present(&Map::new(), &[]));
    }
}
