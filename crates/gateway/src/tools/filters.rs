//! The `listFilters` tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use spg_catalog::{FilterKind, SearchQuery};
use spg_domain::envelope::{ResponseEnvelope, ResponseMetadata};
use spg_domain::error::{ErrorKind, Result};

use crate::core::Core;
use crate::registry::Tool;

pub struct ListFiltersTool;

#[async_trait]
impl Tool for ListFiltersTool {
    fn name(&self) -> &'static str {
        "listFilters"
    }

    fn description(&self) -> &'static str {
        "Search the filter catalog by endpoint, category, kind or free text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string"},
                "endpoint": {"type": "string"},
                "category": {"type": "string"},
                "kind": {"type": "string", "enum": ["record", "field", "chain"]},
                "searchTerm": {"type": "string"}
            },
            "required": ["token"]
        })
    }

    async fn execute(&self, core: &Core, args: &Value) -> ResponseEnvelope {
        super::envelope_from(run(core, args))
    }
}

fn run(core: &Core, args: &Value) -> Result<(Value, ResponseMetadata)> {
    super::gate(core, args)?;

    let kind = match super::optional_str(args, "kind")?.as_deref() {
        None => None,
        Some("record") => Some(FilterKind::Record),
        Some("field") => Some(FilterKind::Field),
        Some("chain") => Some(FilterKind::Chain),
        Some(other) => {
            return Err(ErrorKind::InvalidInput(format!(
                "kind must be one of record, field, chain; got {other:?}"
            )))
        }
    };

    let query = SearchQuery {
        endpoint: super::optional_str(args, "endpoint")?,
        category: super::optional_str(args, "category")?,
        kind,
        term: super::optional_str(args, "searchTerm")?,
    };

    let filters: Vec<Value> = core
        .catalog
        .search(&query)
        .into_iter()
        .map(|def| {
            json!({
                "id": def.id,
                "name": def.name,
                "description": def.description,
                "category": def.category,
                "kind": def.kind,
                "endpoints": def.endpoints,
                "tags": def.tags,
                "parameters": def.parameters,
                "estimatedReductionPercent": def.estimated_reduction_percent,
                "steps": if def.steps.is_empty() { Value::Null } else { json!(def.steps) },
            })
        })
        .collect();

    let marketplace = core.marketplace(None)?;
    let data = json!({"count": filters.len(), "filters": filters});
    Ok((
        data,
        ResponseMetadata::new(marketplace.id, super::local_request_id()),
    ))
}
