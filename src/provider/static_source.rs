//! Static provider: serves records declared inline in the schema.
//!
//! Supports equality filtering, a single-key sort, `fields` projection and
//! `count`/`page` slicing. Results are wrapped as `{ results, metadata }`
//! like an API response.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::schema::DatasourceConfig;
use crate::datasource::ResolvedQuery;
use crate::provider::{Provider, ProviderError, ProviderFactory, ProviderResponse};

/// Factory for [`StaticProvider`].
pub struct StaticProviderFactory;

impl ProviderFactory for StaticProviderFactory {
    fn create(&self, _datasource: &str, schema: &DatasourceConfig) -> Box<dyn Provider> {
        Box::new(StaticProvider {
            records: schema.source.data.clone().unwrap_or_default(),
            query: ResolvedQuery::default(),
        })
    }

    fn is_static(&self) -> bool {
        true
    }
}

pub struct StaticProvider {
    records: Vec<Value>,
    query: ResolvedQuery,
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::String(s), other) | (other, Value::String(s)) => {
            !other.is_object() && !other.is_array() && *s == other.to_string()
        }
        (a, b) => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (a, b) => a.to_string().cmp(&b.to_string()),
    }
}

impl StaticProvider {
    fn query_records(&self) -> Value {
        let filter = &self.query.filter;
        let mut results: Vec<&Value> = self
            .records
            .iter()
            .filter(|record| {
                filter.iter().all(|(field, expected)| {
                    record
                        .get(field)
                        .is_some_and(|actual| loosely_equal(actual, expected))
                })
            })
            .collect();

        if let Some((field, direction)) = self.query.sort.as_ref().and_then(|s| s.iter().next()) {
            let descending = direction.as_i64().is_some_and(|d| d < 0);
            results.sort_by(|a, b| {
                let ordering = compare(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let total = results.len() as u64;
        let page = self.query.page.max(1);
        let limit = self.query.count.unwrap_or(total.max(1));
        let skip = (page - 1).saturating_mul(limit);

        let results: Vec<Value> = results
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .map(|record| self.project(record))
            .collect();

        json!({
            "results": results,
            "metadata": {
                "page": page,
                "limit": limit,
                "totalCount": total,
                "totalPages": total.div_ceil(limit.max(1)),
            }
        })
    }

    fn project(&self, record: &Value) -> Value {
        if self.query.fields.is_empty() {
            return record.clone();
        }
        let Some(object) = record.as_object() else {
            return record.clone();
        };
        let projected: Map<String, Value> = object
            .iter()
            .filter(|(k, _)| self.query.fields.iter().any(|f| f == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(projected)
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn process_request(&mut self, query: &ResolvedQuery) {
        self.query = query.clone();
    }

    async fn load(&mut self, _endpoint: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse::new(self.query_records()))
    }

    fn destroy(&mut self) {
        self.records.clear();
    }
}
