//! Definition resolver and loading context.
//!
//! A query file is resolved completely (extends chains, quantities, query
//! sets) before anything from it is committed to the [`LoadingContext`].
//! Files are loaded in a deterministic order, so later files may refer to
//! earlier ones but never the reverse.
//!
//! `extends` is a tree merge on the generic data form, performed before
//! the concrete query type is constructed:
//!
//! ```yaml
//! queries:
//!   - query-name: energy
//!     query-type: RegexQuery
//!     quantity: FloatQuantity
//!     properties: {file_ext: stdout, search_regex: 'E =\s+(\S+)'}
//!   - query-name: energy_loose
//!     extends: energy
//!     with:
//!       quantity: {parameters: {abs_tol: 0.01}}
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{HarnessError, Result};
use crate::quantity::Quantity;
use crate::query::{load_query, Query};
use crate::query_set::QuerySet;
use crate::registry::TypeRegistry;
use crate::value::{Data, ParamMap};

/// Deep-merge `overlay` into `base`: mappings merge key by key, anything
/// else in the overlay replaces the corresponding node of the base.
pub fn merge_tree(base: &mut Data, overlay: &Data) {
    match (base, overlay) {
        (Data::Object(base), Data::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(slot) => merge_tree(slot, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Expand abbreviated quantities and missing mappings so overrides can merge into them.
fn canonical_quantity(quantity: &mut Data) {
    match quantity {
        Data::String(name) => {
            let name = std::mem::take(name);
            let mut map = ParamMap::new();
            map.insert("quantity-type".to_string(), Data::String(name));
            map.insert("parameters".to_string(), Data::Object(ParamMap::new()));
            *quantity = Data::Object(map);
        }
        Data::Object(map) => {
            let parameters = map
                .entry("parameters")
                .or_insert_with(|| Data::Object(ParamMap::new()));
            if parameters.is_null() {
                *parameters = Data::Object(ParamMap::new());
            }
            if let Some(wrapped) = parameters
                .as_object_mut()
                .and_then(|p| p.get_mut("wrapped_quantity"))
            {
                canonical_quantity(wrapped);
            }
        }
        _ => {}
    }
}

fn canonical_query(def: &ParamMap) -> Data {
    let mut map = def.clone();
    if let Some(quantity) = map.get_mut("quantity") {
        canonical_quantity(quantity);
    }
    let properties = map
        .entry("properties")
        .or_insert_with(|| Data::Object(ParamMap::new()));
    if properties.is_null() {
        *properties = Data::Object(ParamMap::new());
    }
    Data::Object(map)
}

fn entries<'d>(file: &'d ParamMap, key: &str, origin: &str) -> Result<Vec<&'d ParamMap>> {
    match file.get(key) {
        None | Some(Data::Null) => Ok(Vec::new()),
        Some(Data::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| {
                    HarnessError::malformed(
                        "query file",
                        origin,
                        format!("every entry of {key} must be a mapping"),
                    )
                })
            })
            .collect(),
        Some(_) => Err(HarnessError::malformed(
            "query file",
            origin,
            format!("{key} must be a sequence"),
        )),
    }
}

fn name_of<'d>(def: &'d ParamMap, key: &str, what: &'static str, origin: &str) -> Result<&'d str> {
    def.get(key)
        .and_then(Data::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| HarnessError::malformed(what, origin, format!("missing {key}")))
}

fn names_in<'d>(
    def: &'d ParamMap,
    key: &str,
    set_name: &str,
    origin: &str,
) -> Result<Vec<&'d str>> {
    match def.get(key) {
        None | Some(Data::Null) => Ok(Vec::new()),
        Some(Data::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    HarnessError::malformed(
                        "query set",
                        origin,
                        format!("{key} of {set_name:?} must list names"),
                    )
                })
            })
            .collect(),
        Some(_) => Err(HarnessError::malformed(
            "query set",
            origin,
            format!("{key} of {set_name:?} must be a sequence"),
        )),
    }
}

/// Same loading root is a duplicate; different roots is a conflict.
fn collision<T>(
    kind: &'static str,
    name: &str,
    existing: &Entry<T>,
    root: &Path,
    incoming: &Path,
) -> HarnessError {
    let existing_root = existing.root.as_path();
    let existing = existing.origin.as_path();
    if existing_root == root {
        HarnessError::DuplicateName {
            kind,
            name: name.to_string(),
            origin: format!(
                "{} (first defined in {})",
                incoming.display(),
                existing.display()
            ),
        }
    } else {
        HarnessError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            detail: format!(
                "defined in both {} and {}",
                existing.display(),
                incoming.display()
            ),
        }
    }
}

struct SetDef<'d> {
    name: &'d str,
    queries: Vec<&'d str>,
    sets: Vec<&'d str>,
}

#[derive(Debug)]
struct Entry<T> {
    item: T,
    origin: PathBuf,
    root: PathBuf,
}

/// What one query file contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub queries: usize,
    pub query_sets: usize,
}

/// Accumulated queries and query sets of one load session.
#[derive(Debug)]
pub struct LoadingContext {
    registry: Arc<TypeRegistry>,
    queries: BTreeMap<String, Entry<Arc<dyn Query>>>,
    query_sets: BTreeMap<String, Entry<QuerySet>>,
}

impl LoadingContext {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            queries: BTreeMap::new(),
            query_sets: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn query(&self, name: &str) -> Option<&Arc<dyn Query>> {
        self.queries.get(name).map(|e| &e.item)
    }

    pub fn query_set(&self, name: &str) -> Option<&QuerySet> {
        self.query_sets.get(name).map(|e| &e.item)
    }

    /// Quantity of a known query, used to (de)serialize its results.
    pub fn quantity_of(&self, query_name: &str) -> Option<&dyn Quantity> {
        self.query(query_name).map(|q| q.quantity().as_ref())
    }

    /// File a query was loaded from.
    pub fn query_origin(&self, name: &str) -> Option<&Path> {
        self.queries.get(name).map(|e| e.origin.as_path())
    }

    pub fn query_names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn query_set_names(&self) -> impl Iterator<Item = &str> {
        self.query_sets.keys().map(String::as_str)
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    pub fn query_set_count(&self) -> usize {
        self.query_sets.len()
    }

    /// Resolve one query file and commit it, taking its directory as the loading root.
    pub fn load_file(&mut self, origin: &Path, data: &Data) -> Result<LoadSummary> {
        let root = origin.parent().unwrap_or_else(|| Path::new(""));
        self.load_file_in(root, origin, data)
    }

    /// Resolve one query file found under the search directory `root` and
    /// commit it. On error nothing from the file is kept.
    pub fn load_file_in(&mut self, root: &Path, origin: &Path, data: &Data) -> Result<LoadSummary> {
        let label = origin.display().to_string();
        let file = match data {
            Data::Null => return Ok(LoadSummary::default()),
            Data::Object(map) => map,
            _ => {
                return Err(HarnessError::malformed(
                    "query file",
                    &label,
                    "expected a mapping",
                ))
            }
        };
        if let Some(key) = file
            .keys()
            .find(|k| !matches!(k.as_str(), "queries" | "query-sets"))
        {
            return Err(HarnessError::malformed(
                "query file",
                &label,
                format!("unexpected key {key:?}"),
            ));
        }

        let queries = self.resolve_queries(&entries(file, "queries", &label)?, &label)?;
        let sets = self.resolve_query_sets(&entries(file, "query-sets", &label)?, &queries, &label)?;
        let summary = self.commit(root, origin, queries, sets)?;
        tracing::debug!(
            origin = %label,
            queries = summary.queries,
            query_sets = summary.query_sets,
            "query file loaded"
        );
        Ok(summary)
    }

    fn resolve_queries(&self, defs: &[&ParamMap], origin: &str) -> Result<Vec<Arc<dyn Query>>> {
        let mut names = Vec::with_capacity(defs.len());
        let mut seen = HashSet::new();
        for def in defs {
            let name = name_of(def, "query-name", "query", origin)?;
            if !seen.insert(name) {
                return Err(HarnessError::DuplicateName {
                    kind: "query",
                    name: name.to_string(),
                    origin: origin.to_string(),
                });
            }
            names.push(name);
        }

        let mut trees: HashMap<&str, Data> = HashMap::new();
        let mut pending: Vec<(&str, &str, Option<&Data>)> = Vec::new();
        for (def, &name) in defs.iter().zip(&names) {
            match def.get("extends") {
                None => {
                    trees.insert(name, canonical_query(def));
                }
                Some(Data::String(base)) => {
                    if let Some(key) = def
                        .keys()
                        .find(|k| !matches!(k.as_str(), "query-name" | "extends" | "with"))
                    {
                        return Err(HarnessError::malformed(
                            "query",
                            origin,
                            format!("{name:?} uses extends and may only set with, not {key:?}"),
                        ));
                    }
                    let with = match def.get("with") {
                        None | Some(Data::Null) => None,
                        Some(w @ Data::Object(_)) => Some(w),
                        Some(_) => {
                            return Err(HarnessError::malformed(
                                "query",
                                origin,
                                format!("with of {name:?} must be a mapping"),
                            ))
                        }
                    };
                    pending.push((name, base.as_str(), with));
                }
                Some(_) => {
                    return Err(HarnessError::malformed(
                        "query",
                        origin,
                        format!("extends of {name:?} must be a query name"),
                    ))
                }
            }
        }

        // Chains resolve in as many passes as they are long.
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|&(name, base, with)| {
                let Some(mut tree) = trees.get(base).cloned() else {
                    return true;
                };
                if let Some(with) = with {
                    merge_tree(&mut tree, with);
                }
                if let Data::Object(map) = &mut tree {
                    map.insert("query-name".to_string(), Data::String(name.to_string()));
                }
                trees.insert(name, tree);
                false
            });
            if pending.len() == before {
                let (name, base, _) = pending[0];
                let reason = if pending.iter().any(|(n, _, _)| *n == base) {
                    "cyclic extends chain".to_string()
                } else if let Some(entry) = self.queries.get(base) {
                    format!(
                        "base is defined in another file ({}); extends only works within one file",
                        entry.origin.display()
                    )
                } else {
                    "no query of that name in this file".to_string()
                };
                return Err(HarnessError::ExtendsNotFound {
                    name: name.to_string(),
                    base: base.to_string(),
                    origin: origin.to_string(),
                    reason,
                });
            }
        }

        names
            .iter()
            .map(|&name| {
                let tree = trees.get(name).ok_or_else(|| {
                    HarnessError::malformed("query", origin, format!("{name:?} was not resolved"))
                })?;
                load_query(tree, &self.registry).map_err(|err| err.in_definition(origin, name))
            })
            .collect()
    }

    fn resolve_query_sets(
        &self,
        defs: &[&ParamMap],
        local: &[Arc<dyn Query>],
        origin: &str,
    ) -> Result<Vec<QuerySet>> {
        let local: HashMap<&str, &Arc<dyn Query>> = local.iter().map(|q| (q.name(), q)).collect();

        let mut parsed = Vec::with_capacity(defs.len());
        let mut seen = HashSet::new();
        for def in defs {
            let name = name_of(def, "query-set-name", "query set", origin)?;
            if let Some(key) = def
                .keys()
                .find(|k| !matches!(k.as_str(), "query-set-name" | "queries" | "query-sets"))
            {
                return Err(HarnessError::malformed(
                    "query set",
                    origin,
                    format!("unexpected key {key:?} in {name:?}"),
                ));
            }
            if !seen.insert(name) {
                return Err(HarnessError::DuplicateName {
                    kind: "query set",
                    name: name.to_string(),
                    origin: origin.to_string(),
                });
            }
            parsed.push(SetDef {
                name,
                queries: names_in(def, "queries", name, origin)?,
                sets: names_in(def, "query-sets", name, origin)?,
            });
        }

        for def in &parsed {
            if let Some(missing) = def
                .sets
                .iter()
                .find(|s| !seen.contains(*s) && !self.query_sets.contains_key(**s))
            {
                return Err(HarnessError::UnknownQuerySet {
                    name: missing.to_string(),
                    origin: format!("{origin} (query set {:?})", def.name),
                });
            }
        }

        let mut built: HashMap<&str, QuerySet> = HashMap::new();
        let mut pending: Vec<&SetDef<'_>> = parsed.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for def in pending {
                // File-local sets take precedence and must be built first.
                if def
                    .sets
                    .iter()
                    .any(|s| seen.contains(s) && !built.contains_key(s))
                {
                    waiting.push(def);
                    continue;
                }
                let mut queries: Vec<Arc<dyn Query>> = Vec::new();
                for s in &def.sets {
                    let nested = built
                        .get(s)
                        .or_else(|| self.query_sets.get(*s).map(|e| &e.item));
                    if let Some(nested) = nested {
                        queries.extend(nested.queries().iter().cloned());
                    }
                }
                for q in &def.queries {
                    let query = local
                        .get(q)
                        .map(|q| Arc::clone(*q))
                        .or_else(|| self.queries.get(*q).map(|e| Arc::clone(&e.item)))
                        .ok_or_else(|| HarnessError::UnknownQuery {
                            name: q.to_string(),
                            origin: format!("{origin} (query set {:?})", def.name),
                        })?;
                    queries.push(query);
                }
                built.insert(def.name, QuerySet::new(def.name, queries));
            }
            if waiting.len() == before {
                return Err(HarnessError::malformed(
                    "query set",
                    origin,
                    format!("cyclic query-sets reference involving {:?}", waiting[0].name),
                ));
            }
            pending = waiting;
        }

        Ok(parsed
            .iter()
            .filter_map(|def| built.remove(def.name))
            .collect())
    }

    fn commit(
        &mut self,
        root: &Path,
        origin: &Path,
        queries: Vec<Arc<dyn Query>>,
        sets: Vec<QuerySet>,
    ) -> Result<LoadSummary> {
        for query in &queries {
            if let Some(existing) = self.queries.get(query.name()) {
                return Err(collision("query", query.name(), existing, root, origin));
            }
        }
        for set in &sets {
            if let Some(existing) = self.query_sets.get(set.name()) {
                return Err(collision("query set", set.name(), existing, root, origin));
            }
        }

        let summary = LoadSummary {
            queries: queries.len(),
            query_sets: sets.len(),
        };
        for query in queries {
            self.queries.insert(
                query.name().to_string(),
                Entry {
                    item: query,
                    origin: origin.to_path_buf(),
                    root: root.to_path_buf(),
                },
            );
        }
        for set in sets {
            self.query_sets.insert(
                set.name().to_string(),
                Entry {
                    item: set,
                    origin: origin.to_path_buf(),
                    root: root.to_path_buf(),
                },
            );
        }
        Ok(summary)
    }
}
