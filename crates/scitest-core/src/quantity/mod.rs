//! Quantity model: the type of a query result plus its equality policy.
//!
//! A quantity is written either in full form
//!
//! ```yaml
//! quantity:
//!   quantity-type: FloatQuantity
//!   parameters:
//!     abs_tol: 1.0e-6
//! ```
//!
//! or, when every parameter keeps its default, as a bare type name
//! (`quantity: FloatQuantity`).

mod scalar;
mod wrapper;

use std::fmt;
use std::sync::Arc;

pub use scalar::{BoolQuantity, FloatQuantity, IntegerQuantity, StringQuantity};
pub use wrapper::{MappingQuantity, OptionalQuantity, SequenceQuantity};

use crate::error::{HarnessError, Result};
use crate::registry::{Factory, RegistryBuilder, TypeRegistry};
use crate::value::{Data, ParamMap, Value, ValueError};

/// Default width of the short (table cell) representation.
pub const DEFAULT_WIDTH: usize = 16;

/// Behaviour shared by every quantity type.
///
/// `equal` must be reflexive and symmetric, and must return `false`
/// (never panic) when handed values of the wrong shape.
pub trait Quantity: fmt::Debug + Send + Sync {
    /// Registry key of this type.
    fn type_name(&self) -> &str;

    /// Parameters that differ from their defaults.
    fn parameters(&self) -> ParamMap;

    /// Tolerance-aware equality.
    fn equal(&self, a: &Value, b: &Value) -> bool;

    /// Validate and convert a generic tree into a value of this quantity.
    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError>;

    /// Convert a value back into the generic tree.
    fn serialize(&self, value: &Value) -> Data {
        value.to_data()
    }

    /// Width used by [`Quantity::str_short`] when none is given.
    fn width(&self) -> usize;

    /// Representation that fits in `max_width` characters.
    fn str_short(&self, value: &Value, max_width: usize) -> String;

    /// Full representation.
    fn str_long(&self, value: &Value) -> String;

    /// Explain the comparison of a reference and a test value.
    fn compare_msg(&self, reference: &Value, test: &Value) -> String;
}

impl dyn Quantity {
    /// Serialized definition: bare type name when no parameter differs from its default.
    pub fn definition(&self) -> Data {
        let parameters = self.parameters();
        if parameters.is_empty() {
            return Data::String(self.type_name().to_string());
        }
        let mut map = ParamMap::new();
        map.insert(
            "quantity-type".to_string(),
            Data::String(self.type_name().to_string()),
        );
        map.insert("parameters".to_string(), Data::Object(parameters));
        Data::Object(map)
    }
}

impl PartialEq for dyn Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.parameters() == other.parameters()
    }
}

/// Resolve a quantity definition (full or abbreviated form) through the registry.
pub fn load_quantity(data: &Data, registry: &TypeRegistry) -> Result<Arc<dyn Quantity>> {
    let empty = ParamMap::new();
    let (type_name, parameters) = match data {
        Data::String(name) => (name.as_str(), &empty),
        Data::Object(map) => {
            if let Some(key) = map
                .keys()
                .find(|k| *k != "quantity-type" && *k != "parameters")
            {
                return Err(HarnessError::malformed(
                    "quantity",
                    "definition",
                    format!("unexpected key {key:?}"),
                ));
            }
            let type_name = map
                .get("quantity-type")
                .and_then(Data::as_str)
                .ok_or_else(|| {
                    HarnessError::malformed("quantity", "definition", "missing quantity-type")
                })?;
            let parameters = match map.get("parameters") {
                None | Some(Data::Null) => &empty,
                Some(Data::Object(p)) => p,
                Some(_) => {
                    return Err(HarnessError::malformed(
                        "quantity",
                        "definition",
                        "parameters must be a mapping",
                    ))
                }
            };
            (type_name, parameters)
        }
        _ => {
            return Err(HarnessError::malformed(
                "quantity",
                "definition",
                "expected a type name or a mapping",
            ))
        }
    };
    let factory = registry.quantity_factory(type_name)?;
    factory(parameters, registry)
}

/// Symmetric tolerance test: `|a-b| <= abs_tol + rel_tol * max(|a|, |b|)`.
///
/// The relative term scales by the larger magnitude rather than by the
/// reference alone, so swapping the arguments never changes the verdict.
/// With `rel_tol` 0.1, `111` against `100` passes in either order
/// (`11 <= 11.1`). Exact equality always passes (covers matching
/// infinities); NaN never does.
pub fn within_tolerance(a: f64, b: f64, abs_tol: f64, rel_tol: f64) -> bool {
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    diff <= abs_tol + rel_tol * a.abs().max(b.abs())
}

/// Cut a string down to at most `width` characters.
pub(crate) fn clip(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

macro_rules! builtin_quantity {
    ($builder:expr, $ty:ty) => {
        $builder.insert_builtin(
            <$ty>::TYPE_NAME,
            Factory::quantity(|params, _registry| {
                Ok(Arc::new(<$ty>::from_parameters(params)?) as Arc<dyn Quantity>)
            }),
        )
    };
}

macro_rules! builtin_wrapper {
    ($builder:expr, $ty:ty) => {
        $builder.insert_builtin(
            <$ty>::TYPE_NAME,
            Factory::quantity(|params, registry| {
                Ok(Arc::new(<$ty>::from_parameters(params, registry)?) as Arc<dyn Quantity>)
            }),
        )
    };
}

pub(crate) fn register_builtins(builder: &mut RegistryBuilder) {
    builtin_quantity!(builder, BoolQuantity);
    builtin_quantity!(builder, StringQuantity);
    builtin_quantity!(builder, IntegerQuantity);
    builtin_quantity!(builder, FloatQuantity);
    builtin_wrapper!(builder, OptionalQuantity);
    builtin_wrapper!(builder, SequenceQuantity);
    builtin_wrapper!(builder, MappingQuantity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_name_uses_defaults() {
        let registry = TypeRegistry::builtin();
        let q = load_quantity(&json!("FloatQuantity"), &registry).expect("load");
        assert_eq!(q.type_name(), "FloatQuantity");
        assert!(q.parameters().is_empty());
        assert_eq!(q.definition(), json!("FloatQuantity"));
    }

    #[test]
    fn test_full_form_with_defaults_abbreviates() {
        let registry = TypeRegistry::builtin();
        let data = json!({"quantity-type": "FloatQuantity", "parameters": {"abs_tol": 0.0001}});
        let q = load_quantity(&data, &registry).expect("load");
        assert_eq!(q.definition(), json!("FloatQuantity"));
    }

    #[test]
    fn test_definition_roundtrip() {
        let registry = TypeRegistry::builtin();
        let data = json!({
            "quantity-type": "SequenceQuantity",
            "parameters": {
                "wrapped_quantity": {
                    "quantity-type": "FloatQuantity",
                    "parameters": {"abs_tol": 0.5, "precision": 3}
                }
            }
        });
        let q = load_quantity(&data, &registry).expect("load");
        assert_eq!(q.definition(), data);
        let again = load_quantity(&q.definition(), &registry).expect("reload");
        assert!(*q == *again);
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::builtin();
        let err = load_quantity(&json!("ComplexQuantity"), &registry).unwrap_err();
        assert!(matches!(err, HarnessError::UnknownType { .. }));
    }

    #[test]
    fn test_unknown_parameter() {
        let registry = TypeRegistry::builtin();
        let data = json!({"quantity-type": "IntegerQuantity", "parameters": {"tolerance": 1}});
        let err = load_quantity(&data, &registry).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidParameter { .. }));
    }

    #[test]
    fn test_unexpected_top_level_key() {
        let registry = TypeRegistry::builtin();
        let data = json!({"quantity-type": "IntegerQuantity", "abs_tol": 1});
        assert!(load_quantity(&data, &registry).is_err());
    }

    #[test]
    fn test_within_tolerance_boundary() {
        assert!(within_tolerance(1.0, 1.5, 0.5, 0.0));
        assert!(!within_tolerance(1.0, 1.5 + 1e-9, 0.5, 0.0));
        assert!(within_tolerance(100.0, 101.0, 0.0, 0.01));
        assert!(!within_tolerance(f64::NAN, f64::NAN, 1.0, 1.0));
        assert!(within_tolerance(f64::INFINITY, f64::INFINITY, 0.0, 0.0));
    }

    #[test]
    fn test_relative_tolerance_scales_by_larger_magnitude() {
        assert!(within_tolerance(100.0, 111.0, 0.0, 0.1));
        assert!(within_tolerance(111.0, 100.0, 0.0, 0.1));
        assert!(!within_tolerance(100.0, 111.2, 0.0, 0.1));
        assert!(!within_tolerance(111.2, 100.0, 0.0, 0.1));
        assert!(within_tolerance(-100.0, -105.0, 1.0, 0.04));
        assert!(!within_tolerance(-100.0, -106.0, 1.0, 0.04));
    }
}
