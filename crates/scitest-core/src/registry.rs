//! Catalog of constructible query and quantity types.
//!
//! Registration happens on a [`RegistryBuilder`]; [`RegistryBuilder::build`]
//! freezes it into a read-only [`TypeRegistry`] that is shared with every
//! loading context and suite run through an `Arc`. There is no process-wide
//! global: callers pass the registry down explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::quantity::Quantity;
use crate::query::Query;
use crate::value::ParamMap;

/// The two kinds of registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Query,
    Quantity,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Query => write!(f, "query"),
            TypeKind::Quantity => write!(f, "quantity"),
        }
    }
}

/// Inputs handed to a query factory.
pub struct QueryParts<'a> {
    pub name: String,
    pub quantity: Arc<dyn Quantity>,
    pub properties: &'a ParamMap,
}

/// Builds a quantity from its parameter mapping.
pub type QuantityFactory =
    Arc<dyn Fn(&ParamMap, &TypeRegistry) -> Result<Arc<dyn Quantity>> + Send + Sync>;

/// Builds a query from its name, resolved quantity and property mapping.
pub type QueryFactory =
    Arc<dyn Fn(QueryParts<'_>, &TypeRegistry) -> Result<Arc<dyn Query>> + Send + Sync>;

/// A registered constructor of either kind.
#[derive(Clone)]
pub enum Factory {
    Quantity(QuantityFactory),
    Query(QueryFactory),
}

impl Factory {
    /// Wrap a quantity constructor.
    pub fn quantity<F>(f: F) -> Self
    where
        F: Fn(&ParamMap, &TypeRegistry) -> Result<Arc<dyn Quantity>> + Send + Sync + 'static,
    {
        Factory::Quantity(Arc::new(f))
    }

    /// Wrap a query constructor.
    pub fn query<F>(f: F) -> Self
    where
        F: Fn(QueryParts<'_>, &TypeRegistry) -> Result<Arc<dyn Query>> + Send + Sync + 'static,
    {
        Factory::Query(Arc::new(f))
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Factory::Quantity(_) => TypeKind::Quantity,
            Factory::Query(_) => TypeKind::Query,
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factory({})", self.kind())
    }
}

// ---------------------------------------------------------------------------
// Builder (writable phase)
// ---------------------------------------------------------------------------

/// Writable registry used during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<(TypeKind, String), Factory>,
}

impl RegistryBuilder {
    /// An empty builder with no types at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder pre-populated with the built-in quantity and query types.
    pub fn with_builtins() -> Self {
        let mut builder = Self::new();
        crate::quantity::register_builtins(&mut builder);
        crate::query::register_builtins(&mut builder);
        builder
    }

    /// Register a new type. Fails with `Conflict` if the name is taken for this kind.
    pub fn register(&mut self, name: &str, factory: Factory) -> Result<&mut Self> {
        let key = (factory.kind(), name.to_string());
        if self.entries.contains_key(&key) {
            return Err(HarnessError::Conflict {
                kind: format!("{} type", key.0),
                name: name.to_string(),
                detail: "already registered; use register_override to replace it".to_string(),
            });
        }
        self.entries.insert(key, factory);
        Ok(self)
    }

    /// Register a type, replacing any existing registration of the same name.
    pub fn register_override(&mut self, name: &str, factory: Factory) -> &mut Self {
        let key = (factory.kind(), name.to_string());
        if self.entries.insert(key, factory).is_some() {
            tracing::debug!(type_name = %name, "registry entry overridden");
        }
        self
    }

    /// Freeze into an immutable, shareable registry.
    pub fn build(self) -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry {
            entries: self.entries,
        })
    }

    /// Used by the built-in tables, whose names are distinct by construction.
    pub(crate) fn insert_builtin(&mut self, name: &str, factory: Factory) {
        self.entries.insert((factory.kind(), name.to_string()), factory);
    }
}

// ---------------------------------------------------------------------------
// Frozen registry (read-only phase)
// ---------------------------------------------------------------------------

/// Read-only catalog used while loading definitions and running suites.
#[derive(Debug)]
pub struct TypeRegistry {
    entries: BTreeMap<(TypeKind, String), Factory>,
}

impl TypeRegistry {
    /// The frozen built-in registry.
    pub fn builtin() -> Arc<TypeRegistry> {
        RegistryBuilder::with_builtins().build()
    }

    pub fn resolve(&self, kind: TypeKind, name: &str) -> Result<&Factory> {
        self.entries
            .get(&(kind, name.to_string()))
            .ok_or_else(|| HarnessError::UnknownType {
                kind,
                name: name.to_string(),
            })
    }

    pub fn quantity_factory(&self, name: &str) -> Result<&QuantityFactory> {
        match self.resolve(TypeKind::Quantity, name)? {
            Factory::Quantity(f) => Ok(f),
            Factory::Query(_) => unreachable!("entries are keyed by their factory kind"),
        }
    }

    pub fn query_factory(&self, name: &str) -> Result<&QueryFactory> {
        match self.resolve(TypeKind::Query, name)? {
            Factory::Query(f) => Ok(f),
            Factory::Quantity(_) => unreachable!("entries are keyed by their factory kind"),
        }
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: TypeKind) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::BoolQuantity;

    fn bool_factory() -> Factory {
        Factory::quantity(|params, _| {
            Ok(Arc::new(BoolQuantity::from_parameters(params)?) as Arc<dyn Quantity>)
        })
    }

    #[test]
    fn test_builtins_present() {
        let registry = TypeRegistry::builtin();
        let quantities = registry.names(TypeKind::Quantity);
        assert!(quantities.contains(&"FloatQuantity"));
        assert!(quantities.contains(&"MappingQuantity"));
        let queries = registry.names(TypeKind::Query);
        assert!(queries.contains(&"RegexQuery"));
        assert!(queries.contains(&"TableQuery"));
    }

    #[test]
    fn test_register_conflict() {
        let mut builder = RegistryBuilder::with_builtins();
        let err = builder.register("BoolQuantity", bool_factory()).unwrap_err();
        assert!(matches!(err, HarnessError::Conflict { .. }));
    }

    #[test]
    fn test_same_name_different_kind_is_allowed() {
        let mut builder = RegistryBuilder::new();
        builder.register("Thing", bool_factory()).expect("first registration");
        let query_factory = Factory::query(|parts, _| {
            Err(HarnessError::InvalidParameter {
                owner: parts.name,
                parameter: "-".to_string(),
                reason: "never built".to_string(),
            })
        });
        builder
            .register("Thing", query_factory)
            .expect("query kind is a separate namespace");
        let registry = builder.build();
        assert!(registry.resolve(TypeKind::Quantity, "Thing").is_ok());
        assert!(registry.resolve(TypeKind::Query, "Thing").is_ok());
    }

    #[test]
    fn test_override_replaces() {
        let mut builder = RegistryBuilder::with_builtins();
        builder.register_override("BoolQuantity", bool_factory());
        let registry = builder.build();
        assert!(registry.quantity_factory("BoolQuantity").is_ok());
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = TypeRegistry::builtin();
        let err = registry.resolve(TypeKind::Query, "NoSuchQuery").unwrap_err();
        assert!(matches!(
            err,
            HarnessError::UnknownType {
                kind: TypeKind::Query,
                ..
            }
        ));
    }
}
