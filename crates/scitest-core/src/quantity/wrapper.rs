//! Structural quantities that delegate element comparison to a wrapped quantity.

use std::sync::Arc;

use super::{clip, load_quantity, Quantity, DEFAULT_WIDTH};
use crate::error::Result;
use crate::params::{put_if_changed, Params};
use crate::registry::TypeRegistry;
use crate::value::{Data, ParamMap, Value, ValueError};

const WRAPPED: &str = "wrapped_quantity";

fn read_wrapper(
    owner: &str,
    params: &ParamMap,
    registry: &TypeRegistry,
) -> Result<(Arc<dyn Quantity>, usize)> {
    let mut p = Params::new(owner, params);
    let width = p.positive_or("width", DEFAULT_WIDTH)?;
    let wrapped = load_quantity(p.required(WRAPPED)?, registry)?;
    p.finish()?;
    Ok((wrapped, width))
}

fn wrapper_parameters(wrapped: &Arc<dyn Quantity>, width: usize) -> ParamMap {
    let mut map = ParamMap::new();
    put_if_changed(&mut map, "width", width, DEFAULT_WIDTH);
    map.insert(WRAPPED.to_string(), wrapped.definition());
    map
}

/// Multi-line listing used by the long representations.
fn listing(items: Vec<String>, open: char, close: char) -> String {
    if items.is_empty() {
        return format!("{open}{close}");
    }
    let body = items
        .iter()
        .map(|item| format!("  {item}"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{open}\n{body},\n{close}")
}

// ---------------------------------------------------------------------------
// OptionalQuantity
// ---------------------------------------------------------------------------

/// A wrapped quantity that may also be null.
#[derive(Debug, Clone)]
pub struct OptionalQuantity {
    pub wrapped: Arc<dyn Quantity>,
    pub width: usize,
}

impl OptionalQuantity {
    pub const TYPE_NAME: &'static str = "OptionalQuantity";

    pub fn new(wrapped: Arc<dyn Quantity>) -> Self {
        Self {
            wrapped,
            width: DEFAULT_WIDTH,
        }
    }

    pub fn from_parameters(params: &ParamMap, registry: &TypeRegistry) -> Result<Self> {
        let (wrapped, width) = read_wrapper(Self::TYPE_NAME, params, registry)?;
        Ok(Self { wrapped, width })
    }
}

impl Quantity for OptionalQuantity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn parameters(&self) -> ParamMap {
        wrapper_parameters(&self.wrapped, self.width)
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => self.wrapped.equal(a, b),
        }
    }

    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError> {
        match data {
            Data::Null => Ok(Value::Null),
            other => self.wrapped.deserialize(other),
        }
    }

    fn serialize(&self, value: &Value) -> Data {
        match value {
            Value::Null => Data::Null,
            other => self.wrapped.serialize(other),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn str_short(&self, value: &Value, max_width: usize) -> String {
        match value {
            Value::Null => "-".repeat(max_width.min(4)),
            other => self.wrapped.str_short(other, max_width),
        }
    }

    fn str_long(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            other => self.wrapped.str_long(other),
        }
    }

    fn compare_msg(&self, reference: &Value, test: &Value) -> String {
        match (reference, test) {
            (Value::Null, Value::Null) => "Values match".to_string(),
            (Value::Null, t) => format!("Expected null value, got {t}"),
            (r, Value::Null) => format!("Expected {r}, got null value"),
            (r, t) => self.wrapped.compare_msg(r, t),
        }
    }
}

// ---------------------------------------------------------------------------
// SequenceQuantity
// ---------------------------------------------------------------------------

/// Ordered sequences compared element by element.
#[derive(Debug, Clone)]
pub struct SequenceQuantity {
    pub wrapped: Arc<dyn Quantity>,
    pub width: usize,
}

impl SequenceQuantity {
    pub const TYPE_NAME: &'static str = "SequenceQuantity";

    pub fn new(wrapped: Arc<dyn Quantity>) -> Self {
        Self {
            wrapped,
            width: DEFAULT_WIDTH,
        }
    }

    pub fn from_parameters(params: &ParamMap, registry: &TypeRegistry) -> Result<Self> {
        let (wrapped, width) = read_wrapper(Self::TYPE_NAME, params, registry)?;
        Ok(Self { wrapped, width })
    }

    fn mismatches(&self, a: &[Value], b: &[Value]) -> usize {
        a.iter()
            .zip(b)
            .filter(|(x, y)| !self.wrapped.equal(x, y))
            .count()
    }
}

impl Quantity for SequenceQuantity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn parameters(&self) -> ParamMap {
        wrapper_parameters(&self.wrapped, self.width)
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Seq(x), Value::Seq(y)) => x.len() == y.len() && self.mismatches(x, y) == 0,
            _ => false,
        }
    }

    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError> {
        match data {
            Data::Array(items) => items
                .iter()
                .map(|item| self.wrapped.deserialize(item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Seq),
            other => Err(ValueError::expected("a sequence", other)),
        }
    }

    fn serialize(&self, value: &Value) -> Data {
        match value {
            Value::Seq(items) => {
                Data::Array(items.iter().map(|v| self.wrapped.serialize(v)).collect())
            }
            other => other.to_data(),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn str_short(&self, _value: &Value, max_width: usize) -> String {
        clip("<sequence>", max_width)
    }

    fn str_long(&self, value: &Value) -> String {
        match value {
            Value::Seq(items) => listing(
                items.iter().map(|v| self.wrapped.str_long(v)).collect(),
                '[',
                ']',
            ),
            other => other.to_string(),
        }
    }

    fn compare_msg(&self, reference: &Value, test: &Value) -> String {
        if self.equal(reference, test) {
            return "All elements match".to_string();
        }
        match (reference, test) {
            (Value::Seq(r), Value::Seq(t)) if r.len() != t.len() => {
                "Sequence lengths differ".to_string()
            }
            (Value::Seq(r), Value::Seq(t)) => {
                format!("Errors in {} elements", self.mismatches(r, t))
            }
            _ => format!("Expected {reference} got {test}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MappingQuantity
// ---------------------------------------------------------------------------

/// String-keyed mappings compared key by key.
#[derive(Debug, Clone)]
pub struct MappingQuantity {
    pub wrapped: Arc<dyn Quantity>,
    pub width: usize,
}

impl MappingQuantity {
    pub const TYPE_NAME: &'static str = "MappingQuantity";

    pub fn new(wrapped: Arc<dyn Quantity>) -> Self {
        Self {
            wrapped,
            width: DEFAULT_WIDTH,
        }
    }

    pub fn from_parameters(params: &ParamMap, registry: &TypeRegistry) -> Result<Self> {
        let (wrapped, width) = read_wrapper(Self::TYPE_NAME, params, registry)?;
        Ok(Self { wrapped, width })
    }
}

impl Quantity for MappingQuantity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn parameters(&self) -> ParamMap {
        wrapper_parameters(&self.wrapped, self.width)
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Map(x), Value::Map(y)) => {
                x.len() == y.len()
                    && x.iter().all(|(k, v)| {
                        y.get(k).map_or(false, |other| self.wrapped.equal(v, other))
                    })
            }
            _ => false,
        }
    }

    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError> {
        match data {
            Data::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.wrapped.deserialize(v)?)))
                .collect::<std::result::Result<_, ValueError>>()
                .map(Value::Map),
            other => Err(ValueError::expected("a mapping", other)),
        }
    }

    fn serialize(&self, value: &Value) -> Data {
        match value {
            Value::Map(map) => Data::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.wrapped.serialize(v)))
                    .collect(),
            ),
            other => other.to_data(),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn str_short(&self, _value: &Value, max_width: usize) -> String {
        clip("<mapping>", max_width)
    }

    fn str_long(&self, value: &Value) -> String {
        match value {
            Value::Map(map) => listing(
                map.iter()
                    .map(|(k, v)| format!("{k}: {}", self.wrapped.str_long(v)))
                    .collect(),
                '{',
                '}',
            ),
            other => other.to_string(),
        }
    }

    fn compare_msg(&self, reference: &Value, test: &Value) -> String {
        if self.equal(reference, test) {
            return "All elements match".to_string();
        }
        match (reference, test) {
            (Value::Map(r), Value::Map(t)) if r.keys().ne(t.keys()) => {
                "Different keys are present".to_string()
            }
            (Value::Map(r), Value::Map(t)) => {
                let errors = r
                    .iter()
                    .filter(|(k, v)| !self.wrapped.equal(v, &t[k.as_str()]))
                    .count();
                format!("Errors in {errors} elements")
            }
            _ => format!("Expected {reference} got {test}"),
        }
    }
}
