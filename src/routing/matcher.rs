//! Route pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile `/static/:required/:optional?` patterns to anchored regexes
//! - Expose named captures as decoded path params
//! - Score patterns by specificity
//!
//! # Design Decisions
//! - Score = static segments × 5 + required params × 2 + optional params × 1
//! - Any pattern containing `/config` scores −10 and sorts after everything
//! - A trailing slash on the request path is tolerated
//! - Captures are percent-decoded

use std::collections::HashMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use regex::Regex;
use thiserror::Error;

/// Error compiling a route pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("pattern '{pattern}' has invalid parameter name '{name}'")]
    InvalidParam { pattern: String, name: String },

    #[error("pattern '{0}' failed to compile: {1}")]
    Regex(String, #[source] regex::Error),
}

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Required(String),
    Optional(String),
}

/// A compiled route pattern.
#[derive(Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
    score: i32,
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathPattern")
            .field("source", &self.source)
            .field("score", &self.score)
            .finish()
    }
}

impl PathPattern {
    /// Compile a pattern such as `/cars/:make/:model?`.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::NotAbsolute(pattern.to_string()));
        }

        let mut segments = Vec::new();
        for raw in pattern.split('/').filter(|s| !s.is_empty()) {
            let segment = match raw.strip_prefix(':') {
                Some(name) => {
                    let (name, optional) = match name.strip_suffix('?') {
                        Some(name) => (name, true),
                        None => (name, false),
                    };
                    if !is_param_name(name) {
                        return Err(PatternError::InvalidParam {
                            pattern: pattern.to_string(),
                            name: name.to_string(),
                        });
                    }
                    if optional {
                        Segment::Optional(name.to_string())
                    } else {
                        Segment::Required(name.to_string())
                    }
                }
                None => Segment::Static(raw.to_string()),
            };
            segments.push(segment);
        }

        let mut expr = String::from("^");
        let mut params = Vec::new();
        for segment in &segments {
            match segment {
                Segment::Static(s) => {
                    expr.push('/');
                    expr.push_str(&regex::escape(s));
                }
                Segment::Required(name) => {
                    expr.push_str(&format!("/(?P<{name}>[^/]+)"));
                    params.push(name.clone());
                }
                Segment::Optional(name) => {
                    expr.push_str(&format!("(?:/(?P<{name}>[^/]+))?"));
                    params.push(name.clone());
                }
            }
        }
        expr.push_str("/?$");

        let regex =
            Regex::new(&expr).map_err(|e| PatternError::Regex(pattern.to_string(), e))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            params,
            score: score(pattern, &segments),
        })
    }

    /// The pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    /// Names of the params this pattern captures, in order.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Match a request path, returning the captured params.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let mut params = HashMap::new();
        for name in &self.params {
            if let Some(m) = caps.name(name) {
                let value = percent_decode_str(m.as_str()).decode_utf8_lossy();
                params.insert(name.clone(), value.into_owned());
            }
        }
        Some(params)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn score(pattern: &str, segments: &[Segment]) -> i32 {
    if pattern.contains("/config") {
        return -10;
    }
    segments
        .iter()
        .map(|s| match s {
            Segment::Static(_) => 5,
            Segment::Required(_) => 2,
            Segment::Optional(_) => 1,
        })
        .sum()
}
