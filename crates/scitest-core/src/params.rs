//! Typed access to parameter and property mappings.
//!
//! [`Params`] reads options out of a definition mapping, fills in
//! defaults, and rejects anything left unread when [`Params::finish`]
//! is called. [`put_if_changed`] is the writing side: only values that
//! differ from the default are serialized.

use std::collections::BTreeSet;

use crate::error::{HarnessError, Result};
use crate::value::{describe_data, Data, ParamMap};

/// Reader over a parameter mapping owned by a quantity or query type.
pub struct Params<'a> {
    owner: &'a str,
    map: &'a ParamMap,
    seen: BTreeSet<&'a str>,
}

impl<'a> Params<'a> {
    pub fn new(owner: &'a str, map: &'a ParamMap) -> Self {
        Self {
            owner,
            map,
            seen: BTreeSet::new(),
        }
    }

    /// Build an `InvalidParameter` error for this owner.
    pub fn invalid(&self, parameter: &str, reason: impl Into<String>) -> HarnessError {
        HarnessError::InvalidParameter {
            owner: self.owner.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Raw access; marks the key as consumed. Explicit nulls read as absent.
    pub fn take(&mut self, key: &'a str) -> Option<&'a Data> {
        self.seen.insert(key);
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn bool_or(&mut self, key: &'a str, default: bool) -> Result<bool> {
        match self.take(key) {
            None => Ok(default),
            Some(Data::Bool(b)) => Ok(*b),
            Some(other) => Err(self.wrong_type(key, "a boolean", other)),
        }
    }

    pub fn i64_or(&mut self, key: &'a str, default: i64) -> Result<i64> {
        Ok(self.optional_i64(key)?.unwrap_or(default))
    }

    pub fn optional_i64(&mut self, key: &'a str) -> Result<Option<i64>> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.wrong_type(key, "an integer", v)),
        }
    }

    pub fn usize_or(&mut self, key: &'a str, default: usize) -> Result<usize> {
        let value = self.i64_or(key, default as i64)?;
        usize::try_from(value).map_err(|_| self.invalid(key, "must not be negative"))
    }

    /// Positive width-like option.
    pub fn positive_or(&mut self, key: &'a str, default: usize) -> Result<usize> {
        let value = self.usize_or(key, default)?;
        if value == 0 {
            return Err(self.invalid(key, "must be at least 1"));
        }
        Ok(value)
    }

    /// Non-negative float option; integers are accepted.
    pub fn tolerance_or(&mut self, key: &'a str, default: f64) -> Result<f64> {
        let value = match self.take(key) {
            None => default,
            Some(v) => v
                .as_f64()
                .ok_or_else(|| self.wrong_type(key, "a number", v))?,
        };
        if !(value >= 0.0) || !value.is_finite() {
            return Err(self.invalid(key, format!("must be a finite non-negative number, got {value}")));
        }
        Ok(value)
    }

    pub fn string_or(&mut self, key: &'a str, default: &str) -> Result<String> {
        Ok(self.optional_string(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn optional_string(&mut self, key: &'a str) -> Result<Option<String>> {
        match self.take(key) {
            None => Ok(None),
            Some(Data::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.wrong_type(key, "a string", other)),
        }
    }

    pub fn required_string(&mut self, key: &'a str) -> Result<String> {
        self.optional_string(key)?
            .ok_or_else(|| self.invalid(key, "required parameter is missing"))
    }

    pub fn required(&mut self, key: &'a str) -> Result<&'a Data> {
        self.take(key)
            .ok_or_else(|| self.invalid(key, "required parameter is missing"))
    }

    /// Reject keys that no reader consumed.
    pub fn finish(self) -> Result<()> {
        match self.map.keys().find(|k| !self.seen.contains(k.as_str())) {
            Some(unknown) => Err(self.invalid(unknown, "unknown parameter")),
            None => Ok(()),
        }
    }

    fn wrong_type(&self, key: &str, expected: &str, found: &Data) -> HarnessError {
        self.invalid(
            key,
            format!("expected {expected}, found {}", describe_data(found)),
        )
    }
}

/// Insert `value` under `key` unless it equals `default`.
pub fn put_if_changed<T>(map: &mut ParamMap, key: &str, value: T, default: T)
where
    T: PartialEq + Into<Data>,
{
    if value != default {
        map.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(data: Data) -> ParamMap {
        match data {
            Data::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_defaults_fill_missing_values() {
        let m = map(json!({}));
        let mut p = Params::new("FloatQuantity", &m);
        assert_eq!(p.tolerance_or("abs_tol", 1e-4).unwrap(), 1e-4);
        assert_eq!(p.positive_or("width", 16).unwrap(), 16);
        p.finish().expect("no unknown keys");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let m = map(json!({"abs_tol": 0.1, "bogus": 1}));
        let mut p = Params::new("FloatQuantity", &m);
        p.tolerance_or("abs_tol", 0.0).unwrap();
        let err = p.finish().unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let m = map(json!({"rel_tol": -0.5}));
        let mut p = Params::new("FloatQuantity", &m);
        assert!(p.tolerance_or("rel_tol", 0.0).is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let m = map(json!({"width": "wide"}));
        let mut p = Params::new("IntegerQuantity", &m);
        let err = p.positive_or("width", 16).unwrap_err();
        assert!(err.to_string().contains("expected an integer"));
    }

    #[test]
    fn test_put_if_changed_skips_defaults() {
        let mut m = ParamMap::new();
        put_if_changed(&mut m, "width", 16u64, 16u64);
        put_if_changed(&mut m, "precision", 8u64, 6u64);
        assert_eq!(Data::Object(m), json!({"precision": 8}));
    }
}
