//! Feeding a parent datasource's result into a chained datasource's query.

use serde_json::{Map, Value};

use crate::config::schema::{ParamTarget, ValueType};
use crate::datasource::params::{encode_component, extract_path, to_number, value_to_string};
use crate::datasource::{Datasource, DatasourceError, ResolvedQuery};

impl Datasource {
    /// Apply the chained dependency to `query` using the working data set.
    ///
    /// Does nothing for unchained datasources.
    pub fn apply_chain(
        &self,
        query: &mut ResolvedQuery,
        data: &Map<String, Value>,
    ) -> Result<(), DatasourceError> {
        let Some(chained) = self.chained() else {
            return Ok(());
        };
        let output = &chained.output_param;

        let parent = data
            .get(&chained.datasource)
            .ok_or_else(|| DatasourceError::MissingParent {
                datasource: self.name().to_string(),
                parent: chained.datasource.clone(),
            })?;

        let extracted = extract_path(parent, &output.param)
            .filter(|v| !v.is_null())
            .ok_or_else(|| DatasourceError::Extraction {
                datasource: self.name().to_string(),
                parent: chained.datasource.clone(),
                path: output.param.clone(),
            })?;

        let value = match output.kind {
            Some(ValueType::Number) => {
                let raw = value_to_string(extracted);
                to_number(&raw).ok_or_else(|| DatasourceError::NotNumeric {
                    datasource: self.name().to_string(),
                    param: output.param.clone(),
                    value: raw,
                })?
            }
            _ => Value::String(encode_component(&value_to_string(extracted))),
        };

        if let Some(template) = &output.query {
            let text = template
                .to_string()
                .replace("{param}", &value_to_string(&value));
            let merged: Map<String, Value> =
                serde_json::from_str(&text).map_err(|e| DatasourceError::ChainedQuery {
                    datasource: self.name().to_string(),
                    parent: chained.datasource.clone(),
                    reason: e.to_string(),
                })?;
            query.filter.extend(merged);
            return Ok(());
        }

        let Some(field) = &output.field else {
            return Ok(());
        };
        match output.target {
            ParamTarget::Filter => {
                query.filter.insert(field.clone(), value);
            }
            ParamTarget::Endpoint => {
                query.endpoint = query
                    .endpoint
                    .replace(&format!("{{{field}}}"), &value_to_string(&value));
            }
        }
        Ok(())
    }
}
