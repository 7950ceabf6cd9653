//! Filter definition records.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use spg_domain::error::{ErrorKind, Result};
use spg_domain::params::{ParamType, ParamValue};

/// What a filter does to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Keeps or drops whole records.
    Record,
    /// Reshapes records to a projection of their fields.
    Field,
    /// An ordered composition of other filters.
    Chain,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    /// Globally unique identity.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Free-form grouping tag (`orders`, `inventory`, …).
    #[serde(default)]
    pub category: String,
    pub kind: FilterKind,
    /// Filter-language source; empty for chains.
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "d_version")]
    pub version: String,
    #[serde(default = "d_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_reduction_percent: Option<u8>,
    /// Operation names this filter may bind to.
    #[serde(default)]
    pub endpoints: BTreeSet<String>,
    /// Declared parameters, in declaration order.
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub tests: Vec<FilterTest>,
    /// Ordered step ids; chains only.
    #[serde(default)]
    pub steps: Vec<String>,
}

fn d_version() -> String {
    "1.0".to_string()
}

fn d_true() -> bool {
    true
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// A stored example evaluation for a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTest {
    pub input_json: Value,
    pub expected_json: Value,
}

impl FilterDefinition {
    /// Merge caller-supplied parameter values over declared defaults,
    /// coercing each against its declared type.
    ///
    /// A required parameter with neither a caller value nor a default is
    /// `InvalidInput`. Caller values for undeclared names are ignored, so
    /// one parameter map can serve every step of a chain.
    pub fn merged_params(&self, supplied: &HashMap<String, Value>) -> Result<HashMap<String, Value>> {
        let mut merged = HashMap::new();
        for spec in &self.parameters {
            let raw = supplied.get(&spec.name).or(spec.default.as_ref());
            match raw {
                Some(value) => {
                    let coerced = ParamValue::coerce(&spec.name, value, spec.param_type)?;
                    merged.insert(spec.name.clone(), coerced.to_json());
                }
                None if spec.required => {
                    return Err(ErrorKind::InvalidInput(format!(
                        "filter '{}' requires parameter '{}'",
                        self.id, spec.name
                    )));
                }
                None => {}
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def_with_params(parameters: Vec<ParameterSpec>) -> FilterDefinition {
        FilterDefinition {
            id: "t".into(),
            name: "t".into(),
            description: String::new(),
            category: "orders".into(),
            kind: FilterKind::Record,
            expression: "filter(.x > $threshold)".into(),
            author: String::new(),
            version: d_version(),
            active: true,
            estimated_reduction_percent: None,
            endpoints: BTreeSet::new(),
            parameters,
            examples: Vec::new(),
            tags: BTreeSet::new(),
            tests: Vec::new(),
            steps: Vec::new(),
        }
    }

    #[test]
    fn caller_values_override_defaults() {
        let def = def_with_params(vec![ParameterSpec {
            name: "threshold".into(),
            param_type: ParamType::Number,
            default: Some(json!(100)),
            required: false,
            description: String::new(),
        }]);
        let mut supplied = HashMap::new();
        supplied.insert("threshold".to_string(), json!(50));
        let merged = def.merged_params(&supplied).unwrap();
        assert_eq!(merged["threshold"], json!(50.0));

        let defaulted = def.merged_params(&HashMap::new()).unwrap();
        assert_eq!(defaulted["threshold"], json!(100.0));
    }

    #[test]
    fn missing_required_parameter_is_invalid_input() {
        let def = def_with_params(vec![ParameterSpec {
            name: "threshold".into(),
            param_type: ParamType::Number,
            default: None,
            required: true,
            description: String::new(),
        }]);
        let err = def.merged_params(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidInput(_)));
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn undeclared_caller_values_are_ignored() {
        let def = def_with_params(vec![]);
        let mut supplied = HashMap::new();
        supplied.insert("unrelated".to_string(), json!(true));
        let merged = def.merged_params(&supplied).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn coercion_errors_propagate() {
        let def = def_with_params(vec![ParameterSpec {
            name: "threshold".into(),
            param_type: ParamType::Number,
            default: None,
            required: true,
            description: String::new(),
        }]);
        let mut supplied = HashMap::new();
        supplied.insert("threshold".to_string(), json!("not-a-number"));
        assert!(def.merged_params(&supplied).is_err());
    }

    #[test]
    fn definitions_deserialize_from_camel_case() {
        let raw = json!({
            "id": "high_value_orders",
            "name": "High value orders",
            "description": "Orders above a total threshold",
            "category": "orders",
            "kind": "record",
            "expression": "filter(number(.OrderTotal.Amount) > $threshold)",
            "estimatedReductionPercent": 70,
            "endpoints": ["listOrders"],
            "parameters": [
                {"name": "threshold", "type": "number", "default": 100, "required": false}
            ],
            "tags": ["orders", "value"]
        });
        let def: FilterDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.kind, FilterKind::Record);
        assert_eq!(def.estimated_reduction_percent, Some(70));
        assert!(def.active);
        assert_eq!(def.version, "1.0");
        assert_eq!(def.parameters[0].param_type, ParamType::Number);
    }
}
