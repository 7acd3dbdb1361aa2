//! Named, ordered groups of queries.

use std::collections::HashSet;
use std::sync::Arc;

use crate::query::{ProgramOutput, Query};
use crate::results::ResultSet;
use crate::value::{Data, ParamMap};

/// Ordered, name-unique list of queries applied together to one run.
#[derive(Debug, Clone)]
pub struct QuerySet {
    name: String,
    queries: Vec<Arc<dyn Query>>,
}

impl QuerySet {
    /// Build a set, keeping the first occurrence of every query name.
    pub fn new(name: impl Into<String>, queries: impl IntoIterator<Item = Arc<dyn Query>>) -> Self {
        let mut seen = HashSet::new();
        let queries = queries
            .into_iter()
            .filter(|q| seen.insert(q.name().to_string()))
            .collect();
        Self {
            name: name.into(),
            queries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queries(&self) -> &[Arc<dyn Query>] {
        &self.queries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.iter().map(|q| q.name())
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Run every query in declared order. Extraction failures become error results.
    pub fn run(&self, output: &dyn ProgramOutput) -> ResultSet {
        let results = self.queries.iter().map(|q| q.run(output)).collect();
        ResultSet::new(self.name.clone(), results)
    }

    /// Serialized (flattened) definition.
    pub fn definition(&self) -> Data {
        let mut map = ParamMap::new();
        map.insert("query-set-name".to_string(), Data::String(self.name.clone()));
        map.insert(
            "queries".to_string(),
            Data::Array(self.names().map(|n| Data::String(n.to_string())).collect()),
        );
        Data::Object(map)
    }
}
