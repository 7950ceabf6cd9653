//! Built-in seed documents.
//!
//! Each seed is a JSON document of the shape `{"filters": [definition…]}`,
//! shipped inside the crate. Importing a seed twice is a no-op: upsert by
//! id leaves an identical catalog behind.

use serde::Deserialize;

use spg_domain::error::{ErrorKind, Result};

use crate::types::FilterDefinition;

/// One embedded seed file.
#[derive(Debug, Clone, Copy)]
pub struct SeedDocument {
    pub name: &'static str,
    pub raw: &'static str,
}

/// The seed set imported on first open.
pub fn builtin_seeds() -> Vec<SeedDocument> {
    vec![
        SeedDocument {
            name: "orders",
            raw: include_str!("../seeds/orders.json"),
        },
        SeedDocument {
            name: "order_items",
            raw: include_str!("../seeds/order_items.json"),
        },
        SeedDocument {
            name: "inventory",
            raw: include_str!("../seeds/inventory.json"),
        },
        SeedDocument {
            name: "common",
            raw: include_str!("../seeds/common.json"),
        },
        SeedDocument {
            name: "chains",
            raw: include_str!("../seeds/chains.json"),
        },
    ]
}

#[derive(Deserialize)]
struct SeedFile {
    filters: Vec<FilterDefinition>,
}

/// Parse seed documents into definitions, preserving order.
pub fn parse_seeds(seeds: &[SeedDocument]) -> Result<Vec<FilterDefinition>> {
    let mut defs = Vec::new();
    for seed in seeds {
        let parsed: SeedFile = serde_json::from_str(seed.raw).map_err(|e| {
            ErrorKind::Internal(format!("seed document '{}' is malformed: {e}", seed.name))
        })?;
        defs.extend(parsed.filters);
    }
    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterKind;
    use std::collections::HashMap;

    #[test]
    fn builtin_seeds_parse() {
        let defs = parse_seeds(&builtin_seeds()).unwrap();
        assert!(defs.len() >= 12);
        let ids: Vec<&str> = defs.iter().map(|d| d.id.as_str()).collect();
        for required in [
            "order_summary",
            "high_value_orders",
            "high_value_items",
            "pending_orders",
            "in_stock_only",
            "low_stock",
            "inventory_compact",
            "orders_high_value_summary",
        ] {
            assert!(ids.contains(&required), "missing seed {required}");
        }
    }

    #[test]
    fn seed_expressions_parse_in_the_engine() {
        for def in parse_seeds(&builtin_seeds()).unwrap() {
            if def.kind != FilterKind::Chain {
                spg_filter::parse(&def.expression)
                    .unwrap_or_else(|e| panic!("seed '{}' does not parse: {e}", def.id));
            }
        }
    }

    #[test]
    fn seed_ids_are_unique() {
        let defs = parse_seeds(&builtin_seeds()).unwrap();
        let mut seen = std::collections::BTreeSet::new();
        for def in &defs {
            assert!(seen.insert(def.id.clone()), "duplicate seed id {}", def.id);
        }
    }

    #[test]
    fn stored_seed_tests_pass_through_the_engine() {
        for def in parse_seeds(&builtin_seeds()).unwrap() {
            if def.kind == FilterKind::Chain {
                continue;
            }
            // Run each stored example with declared defaults only.
            let params = def.merged_params(&HashMap::new()).unwrap();
            for (i, case) in def.tests.iter().enumerate() {
                let out = spg_filter::apply(&def.expression, &case.input_json, &params)
                    .unwrap_or_else(|e| panic!("seed '{}' test {i} failed: {e}", def.id));
                assert_eq!(
                    out, case.expected_json,
                    "seed '{}' test {i} produced unexpected output",
                    def.id
                );
            }
        }
    }
}
