//! Line-oriented regex queries.

use std::sync::Arc;

use regex::Regex;

use super::{
    anchored, read_result_type, write_result_type, ExtractionError, Query, ResultType,
    SearchRegion,
};
use crate::error::Result;
use crate::params::{put_if_changed, Params};
use crate::quantity::Quantity;
use crate::registry::QueryParts;
use crate::value::{Data, ParamMap, Value};

/// Which capture group of `search_regex` carries the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureGroup {
    Index(usize),
    Name(String),
}

impl CaptureGroup {
    fn to_data(&self) -> Data {
        match self {
            CaptureGroup::Index(i) => Data::from(*i),
            CaptureGroup::Name(n) => Data::String(n.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// RegexQuery
// ---------------------------------------------------------------------------

/// First line inside the search region that matches `search_regex`.
#[derive(Debug, Clone)]
pub struct RegexQuery {
    name: String,
    quantity: Arc<dyn Quantity>,
    file_ext: String,
    search_regex: String,
    regex: Regex,
    group: CaptureGroup,
    result_type: ResultType,
    region: SearchRegion,
}

impl RegexQuery {
    pub const TYPE_NAME: &'static str = "RegexQuery";

    pub fn from_parts(parts: QueryParts<'_>) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, parts.properties);
        let file_ext = p.string_or("file_ext", "")?;
        let search_regex = p.required_string("search_regex")?;
        let regex = anchored(&p, "search_regex", &search_regex)?;
        let group = match p.take("regex_group") {
            None => CaptureGroup::Index(1),
            Some(Data::String(name)) => CaptureGroup::Name(name.clone()),
            Some(other) => match other.as_u64() {
                Some(i) => CaptureGroup::Index(i as usize),
                None => return Err(p.invalid("regex_group", "expected a group index or name")),
            },
        };
        let group_exists = match &group {
            CaptureGroup::Index(i) => *i < regex.captures_len(),
            CaptureGroup::Name(n) => regex.capture_names().flatten().any(|c| c == n),
        };
        if !group_exists {
            return Err(p.invalid("regex_group", "group does not exist in search_regex"));
        }
        let result_type = read_result_type(&mut p)?;
        let region = SearchRegion::from_params(&mut p)?;
        p.finish()?;
        Ok(Self {
            name: parts.name,
            quantity: parts.quantity,
            file_ext,
            search_regex,
            regex,
            group,
            result_type,
            region,
        })
    }
}

impl Query for RegexQuery {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn quantity(&self) -> &Arc<dyn Quantity> {
        &self.quantity
    }

    fn file_ext(&self) -> &str {
        &self.file_ext
    }

    fn properties(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "search_regex".to_string(),
            Data::String(self.search_regex.clone()),
        );
        if self.group != CaptureGroup::Index(1) {
            map.insert("regex_group".to_string(), self.group.to_data());
        }
        write_result_type(&mut map, self.result_type);
        self.region.write(&mut map);
        map
    }

    fn extract(&self, text: &str) -> std::result::Result<Value, ExtractionError> {
        for line in self.region.lines(text) {
            let Some(caps) = self.regex.captures(line) else {
                continue;
            };
            let matched = match &self.group {
                CaptureGroup::Index(i) => caps.get(*i),
                CaptureGroup::Name(n) => caps.name(n),
            };
            let matched = matched
                .ok_or_else(|| ExtractionError::new("Capture group did not participate in match"))?;
            return self.result_type.parse(matched.as_str());
        }
        Err(ExtractionError::new("Could not find matching line"))
    }
}

// ---------------------------------------------------------------------------
// CountQuery
// ---------------------------------------------------------------------------

/// Number of lines inside the search region matching `pattern` (all lines if empty).
#[derive(Debug, Clone)]
pub struct CountQuery {
    name: String,
    quantity: Arc<dyn Quantity>,
    file_ext: String,
    pattern: Option<(String, Regex)>,
    region: SearchRegion,
}

impl CountQuery {
    pub const TYPE_NAME: &'static str = "CountQuery";

    pub fn from_parts(parts: QueryParts<'_>) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, parts.properties);
        let file_ext = p.string_or("file_ext", "")?;
        let pattern = match p.string_or("pattern", "")? {
            s if s.is_empty() => None,
            s => {
                let re = anchored(&p, "pattern", &s)?;
                Some((s, re))
            }
        };
        let region = SearchRegion::from_params(&mut p)?;
        p.finish()?;
        Ok(Self {
            name: parts.name,
            quantity: parts.quantity,
            file_ext,
            pattern,
            region,
        })
    }
}

impl Query for CountQuery {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn quantity(&self) -> &Arc<dyn Quantity> {
        &self.quantity
    }

    fn file_ext(&self) -> &str {
        &self.file_ext
    }

    fn properties(&self) -> ParamMap {
        let mut map = ParamMap::new();
        if let Some((s, _)) = &self.pattern {
            put_if_changed(&mut map, "pattern", s.as_str(), "");
        }
        self.region.write(&mut map);
        map
    }

    fn extract(&self, text: &str) -> std::result::Result<Value, ExtractionError> {
        let count = self
            .region
            .lines(text)
            .filter(|line| self.pattern.as_ref().map_or(true, |(_, re)| re.is_match(line)))
            .count();
        Ok(Value::Int(count as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::load_query;
    use crate::registry::TypeRegistry;
    use serde_json::json;

    fn query(definition: Data) -> Arc<dyn Query> {
        load_query(&definition, &TypeRegistry::builtin()).expect("load query")
    }

    const LOG: &str = "\
step 1 energy = 10.5
step 2 energy = 9.25
== final ==
step 3 energy = 8.0
converged: yes
";

    #[test]
    fn test_first_match_wins() {
        let q = query(json!({
            "query-name": "e", "query-type": "RegexQuery", "quantity": "FloatQuantity",
            "properties": {"search_regex": "step \\d+ energy = (\\S+)"}
        }));
        assert_eq!(q.extract(LOG).unwrap(), Value::Float(10.5));
    }

    #[test]
    fn test_search_start_region() {
        let q = query(json!({
            "query-name": "e", "query-type": "RegexQuery", "quantity": "FloatQuantity",
            "properties": {"search_regex": "step \\d+ energy = (\\S+)", "search_start_regex": "== final"}
        }));
        assert_eq!(q.extract(LOG).unwrap(), Value::Float(8.0));
    }

    #[test]
    fn test_search_end_region_hides_match() {
        let q = query(json!({
            "query-name": "c", "query-type": "RegexQuery", "quantity": "BoolQuantity",
            "properties": {"search_regex": "converged: (\\w+)", "result_type": "yesno", "search_end_regex": "== final"}
        }));
        let err = q.extract(LOG).unwrap_err();
        assert_eq!(err.reason, "Could not find matching line");
    }

    #[test]
    fn test_named_group() {
        let q = query(json!({
            "query-name": "s", "query-type": "RegexQuery", "quantity": "IntegerQuantity",
            "properties": {"search_regex": "step (?P<n>\\d+) energy = 9", "regex_group": "n", "result_type": "int"}
        }));
        assert_eq!(q.extract(LOG).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_match_is_anchored_at_line_start() {
        let q = query(json!({
            "query-name": "e", "query-type": "RegexQuery", "quantity": "FloatQuantity",
            "properties": {"search_regex": "energy = (\\S+)"}
        }));
        assert!(q.extract(LOG).is_err());
    }

    #[test]
    fn test_missing_group_rejected_at_load() {
        let err = load_query(
            &json!({
                "query-name": "e", "query-type": "RegexQuery", "quantity": "FloatQuantity",
                "properties": {"search_regex": "energy = (\\S+)", "regex_group": 2}
            }),
            &TypeRegistry::builtin(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("regex_group"));
    }

    #[test]
    fn test_invalid_regex_rejected_at_load() {
        let err = load_query(
            &json!({
                "query-name": "e", "query-type": "RegexQuery", "quantity": "FloatQuantity",
                "properties": {"search_regex": "energy = (\\S+"}
            }),
            &TypeRegistry::builtin(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn test_count_lines() {
        let all = query(json!({
            "query-name": "n", "query-type": "CountQuery", "quantity": "IntegerQuantity"
        }));
        assert_eq!(all.extract(LOG).unwrap(), Value::Int(5));

        let steps = query(json!({
            "query-name": "n", "query-type": "CountQuery", "quantity": "IntegerQuantity",
            "properties": {"pattern": "step"}
        }));
        assert_eq!(steps.extract(LOG).unwrap(), Value::Int(3));
    }
}
