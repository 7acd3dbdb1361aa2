//! Fixed-offset reads: a given line, optionally a given whitespace-separated field.

use std::sync::Arc;

use super::{read_result_type, resolve_index, write_result_type, ExtractionError, Query, ResultType};
use crate::error::Result;
use crate::params::Params;
use crate::quantity::Quantity;
use crate::registry::QueryParts;
use crate::value::{Data, ParamMap, Value};

/// Reads line `line` (negative counts from the end) and, if set, field `field` of it.
#[derive(Debug, Clone)]
pub struct ColumnQuery {
    name: String,
    quantity: Arc<dyn Quantity>,
    file_ext: String,
    line: i64,
    field: Option<i64>,
    result_type: ResultType,
}

impl ColumnQuery {
    pub const TYPE_NAME: &'static str = "ColumnQuery";

    pub fn from_parts(parts: QueryParts<'_>) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, parts.properties);
        let file_ext = p.string_or("file_ext", "")?;
        let line = p
            .optional_i64("line")?
            .ok_or_else(|| p.invalid("line", "required parameter is missing"))?;
        let field = p.optional_i64("field")?;
        let result_type = read_result_type(&mut p)?;
        p.finish()?;
        Ok(Self {
            name: parts.name,
            quantity: parts.quantity,
            file_ext,
            line,
            field,
            result_type,
        })
    }
}

impl Query for ColumnQuery {
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
        map.insert("line".to_string(), Data::from(self.line));
        if let Some(field) = self.field {
            map.insert("field".to_string(), Data::from(field));
        }
        write_result_type(&mut map, self.result_type);
        map
    }

    fn extract(&self, text: &str) -> std::result::Result<Value, ExtractionError> {
        let lines: Vec<&str> = text.lines().collect();
        let line = resolve_index(self.line, lines.len())
            .map(|i| lines[i])
            .ok_or_else(|| ExtractionError::new(format!("Line {} not found", self.line)))?;
        let Some(field) = self.field else {
            return self.result_type.parse(line);
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        let cell = resolve_index(field, fields.len())
            .map(|i| fields[i])
            .ok_or_else(|| ExtractionError::new(format!("Could not get column {field}")))?;
        self.result_type.parse(cell)
    }
}
