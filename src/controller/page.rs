//! Page metadata shared by a controller and its datasources.

use serde_json::{json, Value};

use crate::config::schema::PageConfig;

/// A page: metadata bundle bound to one or more routes.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub name: String,
    pub description: Option<String>,
    pub template: Option<String>,
    pub routes: Vec<String>,
    pub datasources: Vec<String>,
    pub required_datasources: Vec<String>,
    pub pass_filters: bool,
}

impl Page {
    /// Template to render; the page name unless one is configured.
    pub fn template(&self) -> &str {
        self.template.as_deref().unwrap_or(&self.name)
    }

    /// Metadata exposed to views under `page`.
    pub fn metadata(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "template": self.template(),
            "routes": self.routes,
        })
    }
}

impl From<&PageConfig> for Page {
    fn from(config: &PageConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            template: config.template.clone(),
            routes: config.routes.clone(),
            datasources: config.datasources.clone(),
            required_datasources: config.required_datasources.clone(),
            pass_filters: config.pass_filters,
        }
    }
}
