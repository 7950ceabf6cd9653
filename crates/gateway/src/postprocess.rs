//! Response post-processing with the filter engine.
//!
//! Resolves the caller's filter selection (named filter, ad-hoc
//! expression, chain, or the operation's default reduction), runs it over
//! the response data, and records size metadata on the envelope.

use std::collections::HashMap;

use serde_json::Value;

use spg_catalog::{CatalogStore, FilterDefinition, FilterKind};
use spg_domain::envelope::ResponseMetadata;
use spg_domain::error::{ErrorKind, Result};
use spg_filter::{EvalLimits, Evaluator};

/// The filter-family arguments accepted by every read operation.
#[derive(Debug, Clone, Default)]
pub struct FilterInvocation {
    pub filter_id: Option<String>,
    pub filter_chain: Option<String>,
    pub custom: Option<String>,
    pub params: HashMap<String, Value>,
    pub reduce: bool,
}

impl FilterInvocation {
    /// Parse from tool arguments. Selection precedence when several are
    /// supplied: custom expression, then chain, then named filter, then
    /// default reduction.
    pub fn from_args(args: &Value) -> Result<Self> {
        let params = match args.get("filterParams") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(other) => {
                return Err(ErrorKind::InvalidInput(format!(
                    "filterParams must be an object, got {other}"
                )))
            }
        };
        Ok(Self {
            filter_id: str_field(args, "filterId")?,
            filter_chain: str_field(args, "filterChain")?,
            custom: str_field(args, "customFilter")?,
            params,
            reduce: args
                .get("reduceResponse")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

fn str_field(args: &Value, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ErrorKind::InvalidInput(format!(
            "{name} must be a string, got {other}"
        ))),
    }
}

enum Step {
    Named(FilterDefinition),
    Custom(String),
}

/// Apply the invocation to `data`, updating the envelope metadata with the
/// applied filter list and the size reduction.
pub fn apply(
    catalog: &CatalogStore,
    operation: &str,
    data: Value,
    invocation: &FilterInvocation,
    metadata: &mut ResponseMetadata,
) -> Result<Value> {
    let steps = resolve_steps(catalog, operation, invocation)?;
    if steps.is_empty() {
        return Ok(data);
    }

    let original_bytes = canonical_size(&data)?;
    let mut current = data;
    let mut applied = Vec::with_capacity(steps.len());

    for step in steps {
        match step {
            Step::Named(def) => {
                let params = def.merged_params(&invocation.params)?;
                let expr = spg_filter::parse(&def.expression)?.bind(&params);
                let evaluator = Evaluator::new(EvalLimits::default(), params);
                current = evaluator.eval(&expr, &current)?;
                applied.push(def.id);
            }
            Step::Custom(source) => {
                current = spg_filter::apply(&source, &current, &HashMap::new())?;
                applied.push("custom".to_string());
            }
        }
    }

    let final_bytes = canonical_size(&current)?;
    let reduction = if original_bytes == 0 {
        0.0
    } else {
        let ratio = 1.0 - (final_bytes as f64 / original_bytes as f64);
        (ratio * 1000.0).round() / 10.0
    };

    metadata.filters_applied = Some(applied);
    metadata.original_bytes = Some(original_bytes);
    metadata.final_bytes = Some(final_bytes);
    metadata.reduction_percent = Some(reduction);
    Ok(current)
}

fn resolve_steps(
    catalog: &CatalogStore,
    operation: &str,
    invocation: &FilterInvocation,
) -> Result<Vec<Step>> {
    if let Some(source) = &invocation.custom {
        return Ok(vec![Step::Custom(source.clone())]);
    }

    if let Some(chain) = &invocation.filter_chain {
        let ids: Vec<&str> = chain
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ErrorKind::InvalidInput("filterChain is empty".into()));
        }
        let mut steps = Vec::new();
        for id in ids {
            for def in expand(catalog, id)? {
                steps.push(Step::Named(def));
            }
        }
        return Ok(steps);
    }

    if let Some(id) = &invocation.filter_id {
        return Ok(expand(catalog, id)?.into_iter().map(Step::Named).collect());
    }

    if invocation.reduce {
        return Ok(catalog
            .default_for(operation)
            .map(|def| vec![Step::Named(def)])
            .unwrap_or_default());
    }

    Ok(Vec::new())
}

/// Resolve one id to executable definitions; chain ids expand to their
/// steps in order. Unknown or inactive ids are rejected before any
/// evaluation begins.
fn expand(catalog: &CatalogStore, id: &str) -> Result<Vec<FilterDefinition>> {
    let def = catalog
        .get(id)
        .ok_or_else(|| ErrorKind::InvalidInput(format!("unknown filter id '{id}'")))?;
    if !def.active {
        return Err(ErrorKind::InvalidInput(format!("filter '{id}' is inactive")));
    }
    match def.kind {
        FilterKind::Chain => catalog.chain_steps(id),
        _ => Ok(vec![def]),
    }
}

/// Size of the canonical (compact) JSON serialization, in bytes.
fn canonical_size(value: &Value) -> Result<usize> {
    serde_json::to_vec(value)
        .map(|b| b.len())
        .map_err(|e| ErrorKind::Internal(format!("serializing response data: {e}")))
}
