//! Query results, result sets and suite records.
//!
//! Values are (de)serialized through the quantity of the query that
//! produced them, looked up by name in the loading context. Results of
//! queries the context does not know are kept as untyped values so that a
//! stale record still loads and can be reported as a schema mismatch.

use crate::error::{HarnessError, Result};
use crate::quantity::Quantity;
use crate::resolver::LoadingContext;
use crate::value::{Data, ParamMap, Value};
use crate::version::Version;

/// Value or error flag produced by one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Error,
}

/// One query's output for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query_name: String,
    pub outcome: Outcome,
}

impl QueryResult {
    pub fn value(query_name: impl Into<String>, value: Value) -> Self {
        Self {
            query_name: query_name.into(),
            outcome: Outcome::Value(value),
        }
    }

    pub fn error(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            outcome: Outcome::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error)
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Value(v) => Some(v),
            Outcome::Error => None,
        }
    }

    pub fn to_data(&self, quantity: Option<&dyn Quantity>) -> Data {
        let mut map = ParamMap::new();
        map.insert(
            "query-name".to_string(),
            Data::String(self.query_name.clone()),
        );
        match &self.outcome {
            Outcome::Value(v) => {
                let data = quantity.map_or_else(|| v.to_data(), |q| q.serialize(v));
                map.insert("result".to_string(), data);
            }
            Outcome::Error => {
                map.insert("result".to_string(), Data::Null);
                map.insert("error".to_string(), Data::Bool(true));
            }
        }
        Data::Object(map)
    }

    pub fn from_data(data: &Data, quantity: Option<&dyn Quantity>, origin: &str) -> Result<Self> {
        let map = data
            .as_object()
            .ok_or_else(|| HarnessError::malformed("query result", origin, "expected a mapping"))?;
        if let Some(key) = map
            .keys()
            .find(|k| !matches!(k.as_str(), "query-name" | "result" | "error"))
        {
            return Err(HarnessError::malformed(
                "query result",
                origin,
                format!("unexpected key {key:?}"),
            ));
        }
        let name = map
            .get("query-name")
            .and_then(Data::as_str)
            .ok_or_else(|| HarnessError::malformed("query result", origin, "missing query-name"))?;
        let is_error = match map.get("error") {
            None | Some(Data::Null) => false,
            Some(Data::Bool(b)) => *b,
            Some(_) => {
                return Err(HarnessError::malformed(
                    "query result",
                    origin,
                    format!("error flag of {name:?} must be a boolean"),
                ))
            }
        };
        if is_error {
            return Ok(Self::error(name));
        }
        let raw = map.get("result").ok_or_else(|| {
            HarnessError::malformed("query result", origin, format!("{name:?} has no result"))
        })?;
        let value = match quantity {
            Some(q) => q.deserialize(raw).map_err(|err| {
                HarnessError::malformed("query result", origin, format!("{name:?}: {err}"))
            })?,
            None => Value::from_data(raw),
        };
        Ok(Self::value(name, value))
    }
}

/// Ordered results of running one query set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub query_set: String,
    pub results: Vec<QueryResult>,
}

impl ResultSet {
    pub fn new(query_set: impl Into<String>, results: Vec<QueryResult>) -> Self {
        Self {
            query_set: query_set.into(),
            results,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.query_name.as_str())
    }

    pub fn get(&self, query_name: &str) -> Option<&QueryResult> {
        self.results.iter().find(|r| r.query_name == query_name)
    }

    pub fn to_data(&self, ctx: &LoadingContext) -> Data {
        let results = self
            .results
            .iter()
            .map(|r| r.to_data(ctx.quantity_of(&r.query_name)))
            .collect();
        let mut map = ParamMap::new();
        map.insert("query-set".to_string(), Data::String(self.query_set.clone()));
        map.insert("results".to_string(), Data::Array(results));
        Data::Object(map)
    }

    pub fn from_data(data: &Data, ctx: &LoadingContext, origin: &str) -> Result<Self> {
        let map = data
            .as_object()
            .ok_or_else(|| HarnessError::malformed("result set", origin, "expected a mapping"))?;
        let query_set = map
            .get("query-set")
            .and_then(Data::as_str)
            .ok_or_else(|| HarnessError::malformed("result set", origin, "missing query-set"))?;
        let results = match map.get("results") {
            Some(Data::Array(items)) => items
                .iter()
                .map(|item| {
                    let name = item.get("query-name").and_then(Data::as_str).unwrap_or("");
                    QueryResult::from_data(item, ctx.quantity_of(name), origin)
                })
                .collect::<Result<Vec<_>>>()?,
            Some(Data::Null) | None => Vec::new(),
            Some(_) => {
                return Err(HarnessError::malformed(
                    "result set",
                    origin,
                    "results must be a sequence",
                ))
            }
        };
        Ok(Self::new(query_set, results))
    }
}

/// All result sets of one suite at one version, tests in run order.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteResult {
    pub suite_name: String,
    pub version: Version,
    pub results: Vec<(String, Vec<ResultSet>)>,
}

impl SuiteResult {
    pub fn new(suite_name: impl Into<String>, version: Version) -> Self {
        Self {
            suite_name: suite_name.into(),
            version,
            results: Vec::new(),
        }
    }

    /// Add a test's result sets; a test already present is replaced in place.
    pub fn insert(&mut self, test_name: impl Into<String>, result_sets: Vec<ResultSet>) {
        let test_name = test_name.into();
        match self.results.iter_mut().find(|(name, _)| *name == test_name) {
            Some((_, sets)) => *sets = result_sets,
            None => self.results.push((test_name, result_sets)),
        }
    }

    pub fn test_names(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains_test(&self, test_name: &str) -> bool {
        self.result_sets(test_name).is_some()
    }

    pub fn result_sets(&self, test_name: &str) -> Option<&[ResultSet]> {
        self.results
            .iter()
            .find(|(name, _)| name == test_name)
            .map(|(_, sets)| sets.as_slice())
    }

    pub fn result_set(&self, test_name: &str, query_set: &str) -> Option<&ResultSet> {
        self.result_sets(test_name)?
            .iter()
            .find(|rs| rs.query_set == query_set)
    }

    pub fn to_data(&self, ctx: &LoadingContext) -> Data {
        let tests = self
            .results
            .iter()
            .map(|(test, sets)| {
                let sets = sets.iter().map(|rs| rs.to_data(ctx)).collect();
                (test.clone(), Data::Array(sets))
            })
            .collect();
        let mut map = ParamMap::new();
        map.insert(
            "suite-name".to_string(),
            Data::String(self.suite_name.clone()),
        );
        map.insert("version".to_string(), Data::String(self.version.to_string()));
        map.insert("suite-results".to_string(), Data::Object(tests));
        Data::Object(map)
    }

    pub fn from_data(data: &Data, ctx: &LoadingContext, origin: &str) -> Result<Self> {
        let map = data
            .as_object()
            .ok_or_else(|| HarnessError::malformed("suite record", origin, "expected a mapping"))?;
        let suite_name = map
            .get("suite-name")
            .and_then(Data::as_str)
            .ok_or_else(|| HarnessError::malformed("suite record", origin, "missing suite-name"))?;
        let version = map
            .get("version")
            .and_then(Data::as_str)
            .ok_or_else(|| HarnessError::malformed("suite record", origin, "missing version"))?;
        let mut record = Self::new(suite_name, Version::parse(version)?);
        match map.get("suite-results") {
            Some(Data::Object(tests)) => {
                for (test, sets) in tests {
                    let sets = sets.as_array().ok_or_else(|| {
                        HarnessError::malformed(
                            "suite record",
                            origin,
                            format!("results of test {test:?} must be a sequence"),
                        )
                    })?;
                    let sets = sets
                        .iter()
                        .map(|rs| ResultSet::from_data(rs, ctx, origin))
                        .collect::<Result<Vec<_>>>()?;
                    record.insert(test.clone(), sets);
                }
            }
            Some(Data::Null) | None => {}
            Some(_) => {
                return Err(HarnessError::malformed(
                    "suite record",
                    origin,
                    "suite-results must be a mapping",
                ))
            }
        }
        Ok(record)
    }
}
