//! File-backed renderer with `{{ dotted.path }}` interpolation.
//!
//! Templates live at `<directory>/<name>.html`. Values are HTML-escaped;
//! strings are written bare, other values as JSON. A path that resolves to
//! nothing renders as an empty string.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::datasource::params::{extract_path, value_to_string};
use crate::render::{RenderError, Renderer};

/// Renders `.html` templates from a directory.
#[derive(Debug, Clone)]
pub struct FileRenderer {
    directory: PathBuf,
}

impl FileRenderer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, RenderError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(RenderError::NotFound(name.to_string()));
        }
        Ok(self.directory.join(format!("{name}.html")))
    }
}

#[async_trait]
impl Renderer for FileRenderer {
    async fn render(&self, template: &str, data: &Map<String, Value>) -> Result<String, RenderError> {
        let path = self.path_for(template)?;
        let source = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => RenderError::NotFound(template.to_string()),
            _ => RenderError::Io {
                name: template.to_string(),
                source: e,
            },
        })?;
        Ok(interpolate(&source, data))
    }
}

/// Replace every `{{ path }}` in `source` with the escaped value at `path`.
pub fn interpolate(source: &str, data: &Map<String, Value>) -> String {
    let root = Value::Object(data.clone());
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let path = after[..end].trim();
        if let Some(value) = extract_path(&root, path).filter(|v| !v.is_null()) {
            out.push_str(&escape_html(&value_to_string(value)));
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
