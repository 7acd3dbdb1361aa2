//! Query model: named extraction procedures run against program output.
//!
//! A query reads the file `<prefix>.<file_ext>` through a [`ProgramOutput`]
//! handle and extracts one value, which is then validated by the query's
//! quantity. Extraction failures never propagate as errors: [`run`]
//! turns them into an error [`QueryResult`].
//!
//! [`run`]: trait.Query.html#method.run

mod column;
mod pattern;
mod table;

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use column::ColumnQuery;
pub use pattern::{CountQuery, RegexQuery};
pub use table::TableQuery;

use crate::error::{HarnessError, Result};
use crate::params::{put_if_changed, Params};
use crate::quantity::{load_quantity, Quantity};
use crate::registry::{Factory, QueryParts, RegistryBuilder, TypeRegistry};
use crate::results::QueryResult;
use crate::value::{Data, ParamMap, Value};

/// Extraction failed: the target was missing or could not be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct ExtractionError {
    pub reason: String,
}

impl ExtractionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Read access to the files a program run left behind.
pub trait ProgramOutput: Send + Sync {
    /// File name prefix of this run (usually the test prefix).
    fn prefix(&self) -> &str;

    /// Contents of `<prefix>.<file_ext>`.
    fn read(&self, file_ext: &str) -> std::result::Result<String, ExtractionError>;
}

/// Behaviour shared by every query type.
pub trait Query: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Registry key of this type.
    fn type_name(&self) -> &str;

    fn quantity(&self) -> &Arc<dyn Quantity>;

    /// Extension of the output file this query reads.
    fn file_ext(&self) -> &str;

    /// Type-specific properties that differ from their defaults (excluding `file_ext`).
    fn properties(&self) -> ParamMap;

    /// Extract a raw value from the text of the target file.
    fn extract(&self, text: &str) -> std::result::Result<Value, ExtractionError>;
}

impl dyn Query {
    /// Run against program output. Never fails: extraction problems become error results.
    pub fn run(&self, output: &dyn ProgramOutput) -> QueryResult {
        match self.try_run(output) {
            Ok(value) => QueryResult::value(self.name(), value),
            Err(err) => {
                tracing::debug!(query = %self.name(), reason = %err, "query extraction failed");
                QueryResult::error(self.name())
            }
        }
    }

    fn try_run(&self, output: &dyn ProgramOutput) -> std::result::Result<Value, ExtractionError> {
        if self.file_ext().is_empty() {
            return Err(ExtractionError::new("Query file extension not provided"));
        }
        let text = output.read(self.file_ext())?;
        let raw = self.extract(&text)?;
        let quantity = self.quantity();
        quantity
            .deserialize(&quantity.serialize(&raw))
            .map_err(|err| ExtractionError::new(format!("result does not fit quantity: {err}")))
    }

    /// Serialized definition in direct form.
    pub fn definition(&self) -> Data {
        let mut properties = ParamMap::new();
        put_if_changed(&mut properties, "file_ext", self.file_ext(), "");
        properties.extend(self.properties());

        let mut map = ParamMap::new();
        map.insert("query-name".to_string(), Data::String(self.name().to_string()));
        map.insert(
            "query-type".to_string(),
            Data::String(self.type_name().to_string()),
        );
        map.insert("quantity".to_string(), self.quantity().definition());
        map.insert("properties".to_string(), Data::Object(properties));
        Data::Object(map)
    }
}

impl PartialEq for dyn Query {
    fn eq(&self, other: &Self) -> bool {
        self.definition() == other.definition()
    }
}

/// Build a query from a direct-form definition.
pub fn load_query(data: &Data, registry: &TypeRegistry) -> Result<Arc<dyn Query>> {
    let Data::Object(map) = data else {
        return Err(HarnessError::malformed(
            "query",
            "definition",
            "expected a mapping",
        ));
    };
    if let Some(key) = map
        .keys()
        .find(|k| !matches!(k.as_str(), "query-name" | "query-type" | "quantity" | "properties"))
    {
        return Err(HarnessError::malformed(
            "query",
            "definition",
            format!("unexpected key {key:?}"),
        ));
    }
    let field = |key: &str| {
        map.get(key).and_then(Data::as_str).ok_or_else(|| {
            HarnessError::malformed("query", "definition", format!("missing string {key:?}"))
        })
    };
    let name = field("query-name")?;
    let type_name = field("query-type")?;
    let quantity = map
        .get("quantity")
        .ok_or_else(|| HarnessError::malformed("query", name, "missing quantity"))?;
    let quantity = load_quantity(quantity, registry)?;
    let empty = ParamMap::new();
    let properties = match map.get("properties") {
        None | Some(Data::Null) => &empty,
        Some(Data::Object(p)) => p,
        Some(_) => {
            return Err(HarnessError::malformed(
                "query",
                name,
                "properties must be a mapping",
            ))
        }
    };
    let factory = registry.query_factory(type_name)?;
    factory(
        QueryParts {
            name: name.to_string(),
            quantity,
            properties,
        },
        registry,
    )
}

// ---------------------------------------------------------------------------
// Shared building blocks for the built-in query types
// ---------------------------------------------------------------------------

/// How the matched text is converted into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    #[default]
    Float,
    Int,
    Str,
    YesNo,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Float => "float",
            ResultType::Int => "int",
            ResultType::Str => "str",
            ResultType::YesNo => "yesno",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "float" => Some(ResultType::Float),
            "int" => Some(ResultType::Int),
            "str" => Some(ResultType::Str),
            "yesno" => Some(ResultType::YesNo),
            _ => None,
        }
    }

    pub fn parse(&self, text: &str) -> std::result::Result<Value, ExtractionError> {
        let trimmed = text.trim();
        let bad = || ExtractionError::new(format!("cannot parse {trimmed:?} as {}", self.as_str()));
        match self {
            ResultType::Float => parse_float(trimmed).map(Value::Float).ok_or_else(bad),
            ResultType::Int => trimmed.parse::<i64>().map(Value::Int).map_err(|_| bad()),
            ResultType::Str => Ok(Value::Str(text.to_string())),
            ResultType::YesNo => match trimmed.to_ascii_lowercase().as_str() {
                "yes" => Ok(Value::Bool(true)),
                "no" => Ok(Value::Bool(false)),
                _ => Err(bad()),
            },
        }
    }
}

/// Float parsing that also accepts Fortran-style `D` exponents.
fn parse_float(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .or_else(|| text.replace(['D', 'd'], "e").parse::<f64>().ok())
}

/// Compile a pattern that must match at the start of a line.
pub(crate) fn anchored(params: &Params<'_>, key: &str, pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})"))
        .map_err(|err| params.invalid(key, format!("invalid regex: {err}")))
}

/// Optional start/end markers that restrict which lines are searched.
///
/// Searching begins at the first line matching `start` (inclusive) and stops
/// before the first subsequent line matching `end`.
#[derive(Debug, Clone, Default)]
pub struct SearchRegion {
    start: Option<(String, Regex)>,
    end: Option<(String, Regex)>,
}

impl SearchRegion {
    pub(crate) fn from_params(p: &mut Params<'_>) -> Result<Self> {
        let mut read = |key: &'static str| -> Result<Option<(String, Regex)>> {
            match p.string_or(key, "")? {
                s if s.is_empty() => Ok(None),
                s => {
                    let re = anchored(&*p, key, &s)?;
                    Ok(Some((s, re)))
                }
            }
        };
        let start = read("search_start_regex")?;
        let end = read("search_end_regex")?;
        Ok(Self { start, end })
    }

    pub(crate) fn write(&self, map: &mut ParamMap) {
        if let Some((s, _)) = &self.start {
            map.insert("search_start_regex".to_string(), Data::String(s.clone()));
        }
        if let Some((s, _)) = &self.end {
            map.insert("search_end_regex".to_string(), Data::String(s.clone()));
        }
    }

    /// Lines of `text` inside the region.
    pub fn lines<'t>(&'t self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        let mut started = self.start.is_none();
        text.lines()
            .filter(move |line| {
                if !started {
                    started = self
                        .start
                        .as_ref()
                        .map_or(true, |(_, re)| re.is_match(line));
                }
                started
            })
            .take_while(move |line| !self.end.as_ref().map_or(false, |(_, re)| re.is_match(line)))
    }
}

/// Resolve a possibly negative index against a length.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        let i = usize::try_from(index).ok()?;
        (i < len).then_some(i)
    } else {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        len.checked_sub(back)
    }
}

pub(crate) fn read_result_type(p: &mut Params<'_>) -> Result<ResultType> {
    let name = p.string_or("result_type", ResultType::Float.as_str())?;
    ResultType::from_name(&name).ok_or_else(|| {
        p.invalid(
            "result_type",
            format!("{name:?} is not one of float, int, str, yesno"),
        )
    })
}

pub(crate) fn write_result_type(map: &mut ParamMap, result_type: ResultType) {
    put_if_changed(
        map,
        "result_type",
        result_type.as_str(),
        ResultType::default().as_str(),
    );
}

macro_rules! builtin_query {
    ($builder:expr, $ty:ty) => {
        $builder.insert_builtin(
            <$ty>::TYPE_NAME,
            Factory::query(|parts, _registry| Ok(Arc::new(<$ty>::from_parts(parts)?) as Arc<dyn Query>)),
        )
    };
}

pub(crate) fn register_builtins(builder: &mut RegistryBuilder) {
    builtin_query!(builder, RegexQuery);
    builtin_query!(builder, CountQuery);
    builtin_query!(builder, TableQuery);
    builtin_query!(builder, ColumnQuery);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryOutput;
    use serde_json::json;

    fn energy_query() -> Arc<dyn Query> {
        let registry = TypeRegistry::builtin();
        load_query(
            &json!({
                "query-name": "energy",
                "query-type": "RegexQuery",
                "quantity": "FloatQuantity",
                "properties": {"file_ext": "stdout", "search_regex": "Energy:\\s+(\\S+)"}
            }),
            &registry,
        )
        .expect("load query")
    }

    #[test]
    fn test_run_extracts_value() {
        let output = MemoryOutput::new("t1").with_stdout("header\nEnergy:  -1.25\n");
        let result = energy_query().run(&output);
        assert_eq!(result, QueryResult::value("energy", Value::Float(-1.25)));
    }

    #[test]
    fn test_run_missing_file_is_error_result() {
        let output = MemoryOutput::new("t1");
        let result = energy_query().run(&output);
        assert!(result.is_error());
    }

    #[test]
    fn test_run_without_file_ext_is_error_result() {
        let registry = TypeRegistry::builtin();
        let query = load_query(
            &json!({
                "query-name": "energy",
                "query-type": "RegexQuery",
                "quantity": "FloatQuantity",
                "properties": {"search_regex": "E=(\\S+)"}
            }),
            &registry,
        )
        .unwrap();
        let output = MemoryOutput::new("t1").with_stdout("E=1.0\n");
        assert!(query.run(&output).is_error());
    }

    #[test]
    fn test_value_must_fit_quantity() {
        let registry = TypeRegistry::builtin();
        let query = load_query(
            &json!({
                "query-name": "converged",
                "query-type": "RegexQuery",
                "quantity": "IntegerQuantity",
                "properties": {"file_ext": "stdout", "search_regex": "Converged: (\\S+)", "result_type": "yesno"}
            }),
            &registry,
        )
        .unwrap();
        let output = MemoryOutput::new("t1").with_stdout("Converged: yes\n");
        assert!(query.run(&output).is_error());
    }

    #[test]
    fn test_definition_roundtrip() {
        let registry = TypeRegistry::builtin();
        let query = energy_query();
        let again = load_query(&query.definition(), &registry).unwrap();
        assert!(*query == *again);
        assert_eq!(
            query.definition()["properties"],
            json!({"file_ext": "stdout", "search_regex": "Energy:\\s+(\\S+)"})
        );
    }

    #[test]
    fn test_load_query_unknown_type() {
        let registry = TypeRegistry::builtin();
        let err = load_query(
            &json!({"query-name": "q", "query-type": "XmlQuery", "quantity": "FloatQuantity"}),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownType { .. }));
    }

    #[test]
    fn test_result_type_parsing() {
        assert_eq!(ResultType::Float.parse(" 1.5D-3 ").unwrap(), Value::Float(1.5e-3));
        assert_eq!(ResultType::Int.parse("42").unwrap(), Value::Int(42));
        assert_eq!(ResultType::YesNo.parse("Yes").unwrap(), Value::Bool(true));
        assert!(ResultType::Int.parse("4.2").is_err());
        assert!(ResultType::YesNo.parse("maybe").is_err());
    }

    #[test]
    fn test_search_region() {
        let m = serde_json::Map::from_iter([
            ("search_start_regex".to_string(), json!("BEGIN")),
            ("search_end_regex".to_string(), json!("END")),
        ]);
        let mut p = Params::new("test", &m);
        let region = SearchRegion::from_params(&mut p).unwrap();
        let lines: Vec<_> = region.lines("a\nBEGIN\nb\nEND\nc\n").collect();
        assert_eq!(lines, vec!["BEGIN", "b"]);
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 3), Some(0));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-4, 3), None);
    }
}
