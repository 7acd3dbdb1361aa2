//! Tabular output: one value per row of a delimited table.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use super::{
    anchored, read_result_type, resolve_index, write_result_type, ExtractionError, Query,
    ResultType, SearchRegion,
};
use crate::error::Result;
use crate::params::{put_if_changed, Params};
use crate::quantity::Quantity;
use crate::registry::QueryParts;
use crate::value::{Data, ParamMap, Value};

const DEFAULT_TABLE_END: &str = r"^\s*$";

/// Extracts `result_field` from every row between `table_start` and `table_end`.
///
/// The header line matching `table_start` counts towards `table_skip_rows`.
/// With `key_field` set the result is a mapping keyed by that column,
/// otherwise a sequence in row order.
#[derive(Debug, Clone)]
pub struct TableQuery {
    name: String,
    quantity: Arc<dyn Quantity>,
    file_ext: String,
    table_start: (String, Regex),
    table_end: (String, Regex),
    skip_rows: usize,
    delimiter: Option<String>,
    key_field: Option<i64>,
    result_field: i64,
    allow_ragged: bool,
    allow_empty: bool,
    result_type: ResultType,
    region: SearchRegion,
}

impl TableQuery {
    pub const TYPE_NAME: &'static str = "TableQuery";

    pub fn from_parts(parts: QueryParts<'_>) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, parts.properties);
        let file_ext = p.string_or("file_ext", "")?;
        let start = p.required_string("table_start")?;
        let start_re = anchored(&p, "table_start", &start)?;
        let end = p.string_or("table_end", DEFAULT_TABLE_END)?;
        let end_re = anchored(&p, "table_end", &end)?;
        let skip_rows = p.usize_or("table_skip_rows", 0)?;
        let delimiter = p.optional_string("table_delimiter")?;
        if delimiter.as_deref() == Some("") {
            return Err(p.invalid("table_delimiter", "must not be empty"));
        }
        let key_field = p.optional_i64("key_field")?;
        let result_field = p
            .optional_i64("result_field")?
            .ok_or_else(|| p.invalid("result_field", "required parameter is missing"))?;
        let allow_ragged = p.bool_or("allow_ragged", false)?;
        let allow_empty = p.bool_or("allow_empty", false)?;
        let result_type = read_result_type(&mut p)?;
        let region = SearchRegion::from_params(&mut p)?;
        p.finish()?;
        Ok(Self {
            name: parts.name,
            quantity: parts.quantity,
            file_ext,
            table_start: (start, start_re),
            table_end: (end, end_re),
            skip_rows,
            delimiter,
            key_field,
            result_field,
            allow_ragged,
            allow_empty,
            result_type,
            region,
        })
    }

    fn split<'l>(&self, row: &'l str) -> Vec<&'l str> {
        match &self.delimiter {
            Some(d) => row.split(d.as_str()).collect(),
            None => row.split_whitespace().collect(),
        }
    }

    fn parse_row(
        &self,
        row: &str,
        columns: &mut Option<usize>,
    ) -> std::result::Result<(Option<String>, Value), ExtractionError> {
        let cells = self.split(row);
        let expected = *columns.get_or_insert(cells.len());
        if !self.allow_ragged && cells.len() != expected {
            return Err(ExtractionError::new("Table is ragged"));
        }

        let cell = resolve_index(self.result_field, cells.len()).map(|i| cells[i].trim());
        let value = match cell {
            Some(text) if !(text.is_empty() && self.allow_empty) => self.result_type.parse(text)?,
            _ if self.allow_empty => Value::Null,
            _ => {
                return Err(ExtractionError::new(format!(
                    "Could not get column {}",
                    self.result_field
                )))
            }
        };

        let key = match self.key_field {
            None => None,
            Some(k) => {
                let i = resolve_index(k, cells.len())
                    .ok_or_else(|| ExtractionError::new(format!("Could not get column {k}")))?;
                Some(cells[i].trim().to_string())
            }
        };
        Ok((key, value))
    }
}

impl Query for TableQuery {
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
            "table_start".to_string(),
            Data::String(self.table_start.0.clone()),
        );
        put_if_changed(
            &mut map,
            "table_end",
            self.table_end.0.as_str(),
            DEFAULT_TABLE_END,
        );
        put_if_changed(&mut map, "table_skip_rows", self.skip_rows, 0);
        if let Some(d) = &self.delimiter {
            map.insert("table_delimiter".to_string(), Data::String(d.clone()));
        }
        if let Some(k) = self.key_field {
            map.insert("key_field".to_string(), Data::from(k));
        }
        map.insert("result_field".to_string(), Data::from(self.result_field));
        put_if_changed(&mut map, "allow_ragged", self.allow_ragged, false);
        put_if_changed(&mut map, "allow_empty", self.allow_empty, false);
        write_result_type(&mut map, self.result_type);
        self.region.write(&mut map);
        map
    }

    fn extract(&self, text: &str) -> std::result::Result<Value, ExtractionError> {
        let mut in_table = false;
        let mut skipped = 0;
        let mut columns = None;
        let mut rows = Vec::new();

        for line in self.region.lines(text) {
            if !in_table && self.table_start.1.is_match(line) {
                in_table = true;
            }
            if !in_table {
                continue;
            }
            if skipped < self.skip_rows {
                skipped += 1;
                continue;
            }
            if self.table_end.1.is_match(line) {
                return Ok(if self.key_field.is_some() {
                    Value::Map(
                        rows.into_iter()
                            .map(|(k, v): (Option<String>, Value)| (k.unwrap_or_default(), v))
                            .collect::<BTreeMap<_, _>>(),
                    )
                } else {
                    Value::Seq(rows.into_iter().map(|(_, v)| v).collect())
                });
            }
            rows.push(self.parse_row(line, &mut columns)?);
        }

        if in_table {
            Err(ExtractionError::new("End of table not found"))
        } else {
            Err(ExtractionError::new("Could not find table"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::load_query;
    use crate::registry::TypeRegistry;
    use serde_json::json;

    const OUTPUT: &str = "\
Results
  atom   charge   spin
  H1     0.25     0.0
  O1    -0.50     1.0
  H2     0.25     0.0

done
";

    fn table(properties: Data, quantity: Data) -> Arc<dyn Query> {
        load_query(
            &json!({
                "query-name": "charges",
                "query-type": "TableQuery",
                "quantity": quantity,
                "properties": properties,
            }),
            &TypeRegistry::builtin(),
        )
        .expect("load table query")
    }

    fn seq_of_floats() -> Data {
        json!({"quantity-type": "SequenceQuantity", "parameters": {"wrapped_quantity": "FloatQuantity"}})
    }

    #[test]
    fn test_sequence_result() {
        let q = table(
            json!({"table_start": "\\s+atom", "table_skip_rows": 1, "result_field": 1}),
            seq_of_floats(),
        );
        assert_eq!(
            q.extract(OUTPUT).unwrap(),
            Value::Seq(vec![
                Value::Float(0.25),
                Value::Float(-0.5),
                Value::Float(0.25)
            ])
        );
    }

    #[test]
    fn test_mapping_result() {
        let q = table(
            json!({"table_start": "\\s+atom", "table_skip_rows": 1, "key_field": 0, "result_field": -1}),
            json!({"quantity-type": "MappingQuantity", "parameters": {"wrapped_quantity": "FloatQuantity"}}),
        );
        let Value::Map(map) = q.extract(OUTPUT).unwrap() else {
            panic!("expected a mapping");
        };
        assert_eq!(map.len(), 3);
        assert_eq!(map["O1"], Value::Float(1.0));
    }

    #[test]
    fn test_table_not_found() {
        let q = table(
            json!({"table_start": "Energies", "result_field": 1}),
            seq_of_floats(),
        );
        assert_eq!(q.extract(OUTPUT).unwrap_err().reason, "Could not find table");
    }

    #[test]
    fn test_end_not_found() {
        let q = table(
            json!({"table_start": "\\s+atom", "table_skip_rows": 1, "table_end": "END", "result_field": 1}),
            seq_of_floats(),
        );
        assert_eq!(q.extract(OUTPUT).unwrap_err().reason, "End of table not found");
    }

    #[test]
    fn test_ragged_table() {
        let text = "T\na,1\nb,2,extra\n\n";
        let strict = table(
            json!({"table_start": "T", "table_skip_rows": 1, "table_delimiter": ",", "result_field": 1}),
            seq_of_floats(),
        );
        assert_eq!(strict.extract(text).unwrap_err().reason, "Table is ragged");

        let lenient = table(
            json!({"table_start": "T", "table_skip_rows": 1, "table_delimiter": ",", "result_field": 1, "allow_ragged": true}),
            seq_of_floats(),
        );
        assert_eq!(
            lenient.extract(text).unwrap(),
            Value::Seq(vec![Value::Float(1.0), Value::Float(2.0)])
        );
    }

    #[test]
    fn test_allow_empty_cells() {
        let text = "T\na,1\nb,\n\n";
        let q = table(
            json!({"table_start": "T", "table_skip_rows": 1, "table_delimiter": ",", "result_field": 1, "allow_empty": true}),
            json!({"quantity-type": "SequenceQuantity", "parameters": {"wrapped_quantity": {
                "quantity-type": "OptionalQuantity", "parameters": {"wrapped_quantity": "FloatQuantity"}}}}),
        );
        assert_eq!(
            q.extract(text).unwrap(),
            Value::Seq(vec![Value::Float(1.0), Value::Null])
        );
    }

    #[test]
    fn test_result_field_required() {
        let err = load_query(
            &json!({"query-name": "t", "query-type": "TableQuery", "quantity": "FloatQuantity",
                    "properties": {"table_start": "T"}}),
            &TypeRegistry::builtin(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("result_field"));
    }
}
