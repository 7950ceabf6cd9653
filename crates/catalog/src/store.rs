//! Durable catalog store.
//!
//! The whole catalog lives in one JSON document on disk. Reads take a
//! shared file lock, writes an exclusive one; after open the document is
//! cached in memory behind a `RwLock` (reads are the common case; writes
//! only happen on import).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use spg_domain::error::{ErrorKind, Result};

use crate::migrate;
use crate::seed;
use crate::types::{FilterDefinition, FilterKind, ParameterSpec};

/// Current document schema version.
pub const SCHEMA_VERSION: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogDocument {
    schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seeded_at: Option<String>,
    #[serde(default)]
    filters: BTreeMap<String, FilterDefinition>,
}

impl Default for CatalogDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            seeded_at: None,
            filters: BTreeMap::new(),
        }
    }
}

/// Search criteria; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub endpoint: Option<String>,
    pub category: Option<String>,
    pub kind: Option<FilterKind>,
    /// Case-insensitive substring over name, description and tags.
    pub term: Option<String>,
}

/// Outcome of an import pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: usize,
    pub updated: usize,
}

/// The filter catalog.
pub struct CatalogStore {
    path: PathBuf,
    doc: RwLock<CatalogDocument>,
}

impl CatalogStore {
    /// Open (or create) the catalog at `path`.
    ///
    /// Applies pending schema migrations, then imports the built-in seed
    /// documents on first open. Both steps persist their outcome.
    pub fn open(path: &Path) -> Result<Self> {
        let mut dirty = false;

        let doc = if path.exists() {
            let mut raw = read_document(path)?;
            if !raw.is_object() {
                return Err(ErrorKind::Internal(format!(
                    "catalog at {} is not a JSON document",
                    path.display()
                )));
            }
            let loaded_version = raw
                .get("schema_version")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            migrate::migrate_to(&mut raw, SCHEMA_VERSION)?;
            if loaded_version != SCHEMA_VERSION {
                dirty = true;
            }
            serde_json::from_value(raw)
                .map_err(|e| ErrorKind::Internal(format!("corrupt catalog document: {e}")))?
        } else {
            dirty = true;
            CatalogDocument::default()
        };

        let store = Self {
            path: path.to_path_buf(),
            doc: RwLock::new(doc),
        };

        if store.doc.read().seeded_at.is_none() {
            let defs = seed::parse_seeds(&seed::builtin_seeds())?;
            let stats = store.upsert_validated(defs)?;
            store.doc.write().seeded_at = Some(spg_domain::envelope::iso_now());
            tracing::info!(
                inserted = stats.inserted,
                updated = stats.updated,
                "catalog seeded"
            );
            dirty = true;
        }

        if dirty {
            store.persist()?;
        }

        let count = store.doc.read().filters.len();
        tracing::info!(filters = count, path = %path.display(), "catalog opened");
        Ok(store)
    }

    /// Look up one definition by id.
    pub fn get(&self, id: &str) -> Option<FilterDefinition> {
        self.doc.read().filters.get(id).cloned()
    }

    /// Search active definitions by any subset of criteria.
    pub fn search(&self, query: &SearchQuery) -> Vec<FilterDefinition> {
        let doc = self.doc.read();
        doc.filters
            .values()
            .filter(|def| def.active)
            .filter(|def| match &query.endpoint {
                Some(ep) => def.endpoints.contains(ep),
                None => true,
            })
            .filter(|def| match &query.category {
                Some(cat) => def.category.eq_ignore_ascii_case(cat),
                None => true,
            })
            .filter(|def| match query.kind {
                Some(kind) => def.kind == kind,
                None => true,
            })
            .filter(|def| match &query.term {
                Some(term) => {
                    let needle = term.to_lowercase();
                    def.name.to_lowercase().contains(&needle)
                        || def.description.to_lowercase().contains(&needle)
                        || def.tags.iter().any(|t| t.to_lowercase().contains(&needle))
                }
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Operation names a definition binds to.
    pub fn endpoints_for(&self, id: &str) -> Vec<String> {
        self.get(id)
            .map(|def| def.endpoints.into_iter().collect())
            .unwrap_or_default()
    }

    /// Declared parameters of a definition, in declaration order.
    pub fn parameters(&self, id: &str) -> Vec<ParameterSpec> {
        self.get(id).map(|def| def.parameters).unwrap_or_default()
    }

    /// Resolve a chain's steps into their definitions, in order.
    ///
    /// Every step must exist, be active, and not itself be a chain.
    pub fn chain_steps(&self, id: &str) -> Result<Vec<FilterDefinition>> {
        let def = self
            .get(id)
            .ok_or_else(|| ErrorKind::InvalidInput(format!("unknown filter id '{id}'")))?;
        if def.kind != FilterKind::Chain {
            return Err(ErrorKind::InvalidInput(format!(
                "filter '{id}' is not a chain"
            )));
        }
        def.steps
            .iter()
            .map(|step| {
                let resolved = self.get(step).ok_or_else(|| {
                    ErrorKind::InvalidInput(format!("chain '{id}' references unknown step '{step}'"))
                })?;
                if !resolved.active {
                    return Err(ErrorKind::InvalidInput(format!(
                        "chain '{id}' references inactive step '{step}'"
                    )));
                }
                if resolved.kind == FilterKind::Chain {
                    return Err(ErrorKind::InvalidInput(format!(
                        "chain '{id}' step '{step}' is itself a chain"
                    )));
                }
                Ok(resolved)
            })
            .collect()
    }

    /// The default reduction filter for an operation, if one is tagged.
    pub fn default_for(&self, endpoint: &str) -> Option<FilterDefinition> {
        let doc = self.doc.read();
        doc.filters
            .values()
            .find(|def| {
                def.active && def.tags.contains("default") && def.endpoints.contains(endpoint)
            })
            .cloned()
    }

    /// Import definitions (upsert by id), validate, persist.
    pub fn import(&self, defs: Vec<FilterDefinition>) -> Result<ImportStats> {
        let stats = self.upsert_validated(defs)?;
        self.persist()?;
        Ok(stats)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn upsert_validated(&self, defs: Vec<FilterDefinition>) -> Result<ImportStats> {
        // Validate against the union of current and incoming definitions
        // so chains may reference steps from the same import batch.
        let mut union: BTreeMap<String, FilterDefinition> = self.doc.read().filters.clone();
        for def in &defs {
            validate_definition(def)?;
            union.insert(def.id.clone(), def.clone());
        }
        validate_references(&union)?;
        detect_cycles(&union)?;

        let mut doc = self.doc.write();
        let mut stats = ImportStats::default();
        for def in defs {
            if doc.filters.insert(def.id.clone(), def).is_some() {
                stats.updated += 1;
            } else {
                stats.inserted += 1;
            }
        }
        Ok(stats)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ErrorKind::Internal(format!("creating catalog directory: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&*self.doc.read())
            .map_err(|e| ErrorKind::Internal(format!("serializing catalog: {e}")))?;

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| ErrorKind::Internal(format!("opening catalog for write: {e}")))?;
        fs2::FileExt::lock_exclusive(&file)
            .map_err(|e| ErrorKind::Internal(format!("catalog lock failed: {e}")))?;
        let mut writer = std::io::BufWriter::new(file);
        std::io::Write::write_all(&mut writer, json.as_bytes())
            .map_err(|e| ErrorKind::Internal(format!("writing catalog: {e}")))?;
        // Lock released when the file handle drops.
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Value> {
    let file = std::fs::File::open(path)
        .map_err(|e| ErrorKind::Internal(format!("opening catalog: {e}")))?;
    fs2::FileExt::lock_shared(&file)
        .map_err(|e| ErrorKind::Internal(format!("catalog lock failed: {e}")))?;
    let raw = std::io::read_to_string(&file)
        .map_err(|e| ErrorKind::Internal(format!("reading catalog: {e}")))?;
    fs2::FileExt::unlock(&file)
        .map_err(|e| ErrorKind::Internal(format!("catalog unlock failed: {e}")))?;
    serde_json::from_str(&raw)
        .map_err(|e| ErrorKind::Internal(format!("corrupt catalog document: {e}")))
}

fn validate_definition(def: &FilterDefinition) -> Result<()> {
    if def.id.is_empty() {
        return Err(ErrorKind::InvalidInput("filter id must not be empty".into()));
    }
    match def.kind {
        FilterKind::Chain => {
            if def.steps.is_empty() {
                return Err(ErrorKind::InvalidInput(format!(
                    "chain '{}' has no steps",
                    def.id
                )));
            }
        }
        _ => {
            spg_filter::parse(&def.expression).map_err(|e| {
                ErrorKind::InvalidInput(format!("filter '{}' expression invalid: {e}", def.id))
            })?;
        }
    }
    Ok(())
}

fn validate_references(union: &BTreeMap<String, FilterDefinition>) -> Result<()> {
    for def in union.values() {
        for step in &def.steps {
            if !union.contains_key(step) {
                return Err(ErrorKind::InvalidInput(format!(
                    "chain '{}' references unknown step '{step}'",
                    def.id
                )));
            }
        }
    }
    Ok(())
}

/// Depth-first traversal over chain steps; a back-edge is a cycle.
fn detect_cycles(union: &BTreeMap<String, FilterDefinition>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        InStack,
        Done,
    }

    fn visit(
        id: &str,
        union: &BTreeMap<String, FilterDefinition>,
        states: &mut BTreeMap<String, State>,
    ) -> Result<()> {
        match states.get(id) {
            Some(State::Done) => return Ok(()),
            Some(State::InStack) => {
                return Err(ErrorKind::InvalidInput(format!(
                    "chain cycle detected through '{id}'"
                )))
            }
            None => {}
        }
        states.insert(id.to_string(), State::InStack);
        if let Some(def) = union.get(id) {
            for step in &def.steps {
                visit(step, union, states)?;
            }
        }
        states.insert(id.to_string(), State::Done);
        Ok(())
    }

    let mut states = BTreeMap::new();
    for def in union.values() {
        if def.kind == FilterKind::Chain {
            visit(&def.id, union, &mut states)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(id: &str, steps: &[&str]) -> FilterDefinition {
        FilterDefinition {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            category: "test".into(),
            kind: FilterKind::Chain,
            expression: String::new(),
            author: String::new(),
            version: "1.0".into(),
            active: true,
            estimated_reduction_percent: None,
            endpoints: Default::default(),
            parameters: Vec::new(),
            examples: Vec::new(),
            tags: Default::default(),
            tests: Vec::new(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn record(id: &str) -> FilterDefinition {
        FilterDefinition {
            kind: FilterKind::Record,
            expression: "filter(.x > 0)".into(),
            steps: Vec::new(),
            ..chain(id, &[])
        }
    }

    #[test]
    fn cycle_detection_finds_loops() {
        let mut union = BTreeMap::new();
        union.insert("a".to_string(), chain("a", &["b"]));
        union.insert("b".to_string(), chain("b", &["a"]));
        assert!(detect_cycles(&union).is_err());
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut union = BTreeMap::new();
        union.insert("a".to_string(), chain("a", &["a"]));
        assert!(detect_cycles(&union).is_err());
    }

    #[test]
    fn acyclic_chains_pass() {
        let mut union = BTreeMap::new();
        union.insert("r1".to_string(), record("r1"));
        union.insert("r2".to_string(), record("r2"));
        union.insert("c".to_string(), chain("c", &["r1", "r2"]));
        assert!(detect_cycles(&union).is_ok());
        assert!(validate_references(&union).is_ok());
    }

    #[test]
    fn chain_without_steps_is_rejected() {
        let err = validate_definition(&chain("empty", &[])).unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidInput(_)));
    }

    #[test]
    fn bad_expression_is_rejected() {
        let mut def = record("broken");
        def.expression = "filter(".into();
        assert!(validate_definition(&def).is_err());
    }

    #[test]
    fn dangling_step_is_rejected() {
        let mut union = BTreeMap::new();
        union.insert("c".to_string(), chain("c", &["ghost"]));
        assert!(validate_references(&union).is_err());
    }
}
