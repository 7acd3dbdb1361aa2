//! Scalar quantities: booleans, strings, integers and floats.

use super::{clip, within_tolerance, Quantity, DEFAULT_WIDTH};
use crate::error::Result;
use crate::params::{put_if_changed, Params};
use crate::value::{Data, ParamMap, Value, ValueError};

const CONSISTENT: &str = "Values are consistent";

// ---------------------------------------------------------------------------
// BoolQuantity
// ---------------------------------------------------------------------------

/// Exact comparison of truth values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolQuantity {
    pub width: usize,
}

impl BoolQuantity {
    pub const TYPE_NAME: &'static str = "BoolQuantity";

    pub fn from_parameters(params: &ParamMap) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, params);
        let width = p.positive_or("width", DEFAULT_WIDTH)?;
        p.finish()?;
        Ok(Self { width })
    }
}

impl Default for BoolQuantity {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
        }
    }
}

impl Quantity for BoolQuantity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn parameters(&self) -> ParamMap {
        let mut map = ParamMap::new();
        put_if_changed(&mut map, "width", self.width, DEFAULT_WIDTH);
        map
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        matches!((a, b), (Value::Bool(x), Value::Bool(y)) if x == y)
    }

    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError> {
        match data {
            Data::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(ValueError::expected("a boolean", other)),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn str_short(&self, value: &Value, max_width: usize) -> String {
        match value {
            Value::Bool(b) if max_width < 5 => (if *b { "T" } else { "F" }).to_string(),
            other => clip(&other.to_string(), max_width),
        }
    }

    fn str_long(&self, value: &Value) -> String {
        value.to_string()
    }

    fn compare_msg(&self, reference: &Value, test: &Value) -> String {
        if self.equal(reference, test) {
            return CONSISTENT.to_string();
        }
        format!("Expected {reference} got {test}")
    }
}

// ---------------------------------------------------------------------------
// StringQuantity
// ---------------------------------------------------------------------------

/// Exact string match, optionally ignoring case and surrounding whitespace.
#[derive(Debug, Clone, PartialEq)]
pub struct StringQuantity {
    pub width: usize,
    pub ignore_case: bool,
    pub strip: bool,
}

impl StringQuantity {
    pub const TYPE_NAME: &'static str = "StringQuantity";

    pub fn from_parameters(params: &ParamMap) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, params);
        let quantity = Self {
            width: p.positive_or("width", DEFAULT_WIDTH)?,
            ignore_case: p.bool_or("ignore_case", false)?,
            strip: p.bool_or("strip", false)?,
        };
        p.finish()?;
        Ok(quantity)
    }

    fn normalize<'v>(&self, s: &'v str) -> std::borrow::Cow<'v, str> {
        let s = if self.strip { s.trim() } else { s };
        if self.ignore_case {
            std::borrow::Cow::Owned(s.to_lowercase())
        } else {
            std::borrow::Cow::Borrowed(s)
        }
    }
}

impl Default for StringQuantity {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            ignore_case: false,
            strip: false,
        }
    }
}

impl Quantity for StringQuantity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn parameters(&self) -> ParamMap {
        let mut map = ParamMap::new();
        put_if_changed(&mut map, "width", self.width, DEFAULT_WIDTH);
        put_if_changed(&mut map, "ignore_case", self.ignore_case, false);
        put_if_changed(&mut map, "strip", self.strip, false);
        map
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => self.normalize(x) == self.normalize(y),
            _ => false,
        }
    }

    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError> {
        match data {
            Data::String(s) => Ok(Value::Str(s.clone())),
            other => Err(ValueError::expected("a string", other)),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn str_short(&self, value: &Value, max_width: usize) -> String {
        match value {
            Value::Str(s) => clip(s, max_width),
            other => clip(&other.to_string(), max_width),
        }
    }

    fn str_long(&self, value: &Value) -> String {
        match value {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn compare_msg(&self, reference: &Value, test: &Value) -> String {
        if self.equal(reference, test) {
            return CONSISTENT.to_string();
        }
        format!("Expected {reference} got {test}")
    }
}

// ---------------------------------------------------------------------------
// IntegerQuantity
// ---------------------------------------------------------------------------

/// Integers, exact by default, with optional absolute and relative tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerQuantity {
    pub width: usize,
    pub abs_tol: i64,
    pub rel_tol: f64,
}

impl IntegerQuantity {
    pub const TYPE_NAME: &'static str = "IntegerQuantity";

    pub fn from_parameters(params: &ParamMap) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, params);
        let width = p.positive_or("width", DEFAULT_WIDTH)?;
        let abs_tol = p.i64_or("abs_tol", 0)?;
        if abs_tol < 0 {
            return Err(p.invalid("abs_tol", "must not be negative"));
        }
        let rel_tol = p.tolerance_or("rel_tol", 0.0)?;
        p.finish()?;
        Ok(Self {
            width,
            abs_tol,
            rel_tol,
        })
    }
}

impl Default for IntegerQuantity {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            abs_tol: 0,
            rel_tol: 0.0,
        }
    }
}

impl Quantity for IntegerQuantity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn parameters(&self) -> ParamMap {
        let mut map = ParamMap::new();
        put_if_changed(&mut map, "width", self.width, DEFAULT_WIDTH);
        put_if_changed(&mut map, "abs_tol", self.abs_tol, 0);
        put_if_changed(&mut map, "rel_tol", self.rel_tol, 0.0);
        map
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        let (Value::Int(x), Value::Int(y)) = (a, b) else {
            return false;
        };
        let diff = (i128::from(*x) - i128::from(*y)).unsigned_abs();
        if diff <= self.abs_tol as u128 {
            return true;
        }
        if self.rel_tol == 0.0 {
            return false;
        }
        within_tolerance(*x as f64, *y as f64, self.abs_tol as f64, self.rel_tol)
    }

    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError> {
        if let Some(i) = data.as_i64() {
            return Ok(Value::Int(i));
        }
        // Whole floats such as `42.0` are accepted.
        match data.as_f64() {
            Some(x) if x.fract() == 0.0 && x.abs() < 9.2e18 => Ok(Value::Int(x as i64)),
            _ => Err(ValueError::expected("an integer", data)),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn str_short(&self, value: &Value, max_width: usize) -> String {
        let text = value.to_string();
        if text.chars().count() <= max_width {
            text
        } else {
            "#".repeat(max_width)
        }
    }

    fn str_long(&self, value: &Value) -> String {
        value.to_string()
    }

    fn compare_msg(&self, reference: &Value, test: &Value) -> String {
        if self.equal(reference, test) {
            return CONSISTENT.to_string();
        }
        match (reference, test) {
            (Value::Int(r), Value::Int(t)) => {
                format!("Abs. error = {}", i128::from(*r) - i128::from(*t))
            }
            _ => format!("Expected {reference} got {test}"),
        }
    }
}

// ---------------------------------------------------------------------------
// FloatQuantity
// ---------------------------------------------------------------------------

/// Floating point values compared with absolute and relative tolerance.
///
/// Non-finite values serialize as the strings `nan`, `inf` and `-inf`.
///
/// Short formatting options:
/// - `signed`: positive values get a leading space where a `-` would go
/// - `allow_exp`: fall back to scientific notation when fixed point is too wide;
///   when disabled the precision shrinks instead
/// - `zero_pad`: pad with leading zeros to the full column width
#[derive(Debug, Clone, PartialEq)]
pub struct FloatQuantity {
    pub width: usize,
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub precision: usize,
    pub signed: bool,
    pub allow_exp: bool,
    pub zero_pad: bool,
}

#[derive(Clone, Copy)]
enum Notation {
    Fixed,
    Scientific,
}

impl FloatQuantity {
    pub const TYPE_NAME: &'static str = "FloatQuantity";
    pub const DEFAULT_ABS_TOL: f64 = 1e-4;
    pub const DEFAULT_PRECISION: usize = 6;

    pub fn from_parameters(params: &ParamMap) -> Result<Self> {
        let mut p = Params::new(Self::TYPE_NAME, params);
        let quantity = Self {
            width: p.positive_or("width", DEFAULT_WIDTH)?,
            abs_tol: p.tolerance_or("abs_tol", Self::DEFAULT_ABS_TOL)?,
            rel_tol: p.tolerance_or("rel_tol", 0.0)?,
            precision: p.usize_or("precision", Self::DEFAULT_PRECISION)?,
            signed: p.bool_or("signed", false)?,
            allow_exp: p.bool_or("allow_exp", true)?,
            zero_pad: p.bool_or("zero_pad", false)?,
        };
        p.finish()?;
        Ok(quantity)
    }

    fn sign(&self, x: f64) -> &'static str {
        if x.is_sign_negative() {
            "-"
        } else if self.signed {
            " "
        } else {
            ""
        }
    }

    fn render(&self, x: f64, precision: usize, notation: Notation, width: usize) -> String {
        let sign = self.sign(x);
        let body = match notation {
            Notation::Fixed => format!("{:.precision$}", x.abs()),
            Notation::Scientific => format!("{:.precision$e}", x.abs()),
        };
        let pad = if self.zero_pad {
            width.saturating_sub(sign.len() + body.len())
        } else {
            0
        };
        format!("{sign}{}{body}", "0".repeat(pad))
    }

    /// Fixed-point text if it fits. Otherwise scientific with shrinking
    /// precision, or fixed point with shrinking precision when `allow_exp`
    /// is off. A value that cannot fit is shown as `#` marks.
    pub fn format_short(&self, x: f64, max_width: usize) -> String {
        if !x.is_finite() {
            let text = if x.is_nan() { "nan" } else { "inf" };
            return clip(&format!("{}{text}", self.sign(x)), max_width);
        }
        let fits = |s: &str| s.chars().count() <= max_width;
        let fixed = self.render(x, self.precision, Notation::Fixed, max_width);
        if fits(&fixed) {
            return fixed;
        }
        let fallback = if self.allow_exp {
            Notation::Scientific
        } else {
            Notation::Fixed
        };
        (0..=self.precision)
            .rev()
            .map(|p| self.render(x, p, fallback, max_width))
            .find(|s| fits(s))
            .unwrap_or_else(|| "#".repeat(max_width))
    }
}

impl Default for FloatQuantity {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            abs_tol: Self::DEFAULT_ABS_TOL,
            rel_tol: 0.0,
            precision: Self::DEFAULT_PRECISION,
            signed: false,
            allow_exp: true,
            zero_pad: false,
        }
    }
}

impl Quantity for FloatQuantity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn parameters(&self) -> ParamMap {
        let mut map = ParamMap::new();
        put_if_changed(&mut map, "width", self.width, DEFAULT_WIDTH);
        put_if_changed(&mut map, "abs_tol", self.abs_tol, Self::DEFAULT_ABS_TOL);
        put_if_changed(&mut map, "rel_tol", self.rel_tol, 0.0);
        put_if_changed(&mut map, "precision", self.precision, Self::DEFAULT_PRECISION);
        put_if_changed(&mut map, "signed", self.signed, false);
        put_if_changed(&mut map, "allow_exp", self.allow_exp, true);
        put_if_changed(&mut map, "zero_pad", self.zero_pad, false);
        map
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
                match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => within_tolerance(x, y, self.abs_tol, self.rel_tol),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn deserialize(&self, data: &Data) -> std::result::Result<Value, ValueError> {
        match data {
            Data::Number(n) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| ValueError::expected("a float", data)),
            Data::String(s) => match s.to_ascii_lowercase().as_str() {
                "nan" => Ok(Value::Float(f64::NAN)),
                "inf" | "+inf" => Ok(Value::Float(f64::INFINITY)),
                "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
                _ => Err(ValueError::expected("a float", data)),
            },
            other => Err(ValueError::expected("a float", other)),
        }
    }

    fn serialize(&self, value: &Value) -> Data {
        match value {
            Value::Float(x) if x.is_nan() => Data::String("nan".to_string()),
            Value::Float(x) if x.is_infinite() => {
                Data::String(if *x > 0.0 { "inf" } else { "-inf" }.to_string())
            }
            other => other.to_data(),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn str_short(&self, value: &Value, max_width: usize) -> String {
        match value.as_f64() {
            Some(x) => self.format_short(x, max_width),
            None => clip(&value.to_string(), max_width),
        }
    }

    fn str_long(&self, value: &Value) -> String {
        match value.as_f64() {
            Some(x) => format!("{x:.prec$}", prec = self.precision),
            None => value.to_string(),
        }
    }

    fn compare_msg(&self, reference: &Value, test: &Value) -> String {
        if self.equal(reference, test) {
            return CONSISTENT.to_string();
        }
        match (reference.as_f64(), test.as_f64()) {
            (Some(r), Some(t)) => format!("Abs. error {:.prec$}", t - r, prec = self.precision),
            _ => format!("Expected {reference} got {test}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(data: Data) -> ParamMap {
        match data {
            Data::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_bool_exact() {
        let q = BoolQuantity::default();
        assert!(q.equal(&Value::Bool(true), &Value::Bool(true)));
        assert!(!q.equal(&Value::Bool(true), &Value::Bool(false)));
        assert!(!q.equal(&Value::Bool(true), &Value::Int(1)));
        assert_eq!(q.str_short(&Value::Bool(true), 3), "T");
        assert_eq!(
            q.compare_msg(&Value::Bool(true), &Value::Bool(false)),
            "Expected true got false"
        );
    }

    #[test]
    fn test_string_normalisation() {
        let q = StringQuantity::from_parameters(&params(json!({"ignore_case": true, "strip": true})))
            .expect("params");
        assert!(q.equal(&Value::Str(" Converged ".into()), &Value::Str("converged".into())));
        assert!(!StringQuantity::default()
            .equal(&Value::Str("A".into()), &Value::Str("a".into())));
    }

    #[test]
    fn test_integer_exact_by_default() {
        let q = IntegerQuantity::default();
        assert!(q.equal(&Value::Int(42), &Value::Int(42)));
        assert!(!q.equal(&Value::Int(42), &Value::Int(41)));
        assert_eq!(
            q.compare_msg(&Value::Int(42), &Value::Int(41)),
            "Abs. error = 1"
        );
    }

    #[test]
    fn test_integer_tolerances() {
        let q = IntegerQuantity::from_parameters(&params(json!({"abs_tol": 2}))).unwrap();
        assert!(q.equal(&Value::Int(10), &Value::Int(12)));
        assert!(!q.equal(&Value::Int(10), &Value::Int(13)));

        let q = IntegerQuantity::from_parameters(&params(json!({"rel_tol": 0.1}))).unwrap();
        assert!(q.equal(&Value::Int(100), &Value::Int(110)));
        assert!(!q.equal(&Value::Int(100), &Value::Int(112)));
    }

    #[test]
    fn test_integer_extremes_do_not_overflow() {
        let q = IntegerQuantity::default();
        assert!(!q.equal(&Value::Int(i64::MIN), &Value::Int(i64::MAX)));
        assert_eq!(
            q.compare_msg(&Value::Int(i64::MAX), &Value::Int(i64::MIN)),
            format!("Abs. error = {}", i128::from(i64::MAX) - i128::from(i64::MIN))
        );
    }

    #[test]
    fn test_integer_deserialize() {
        assert!(IntegerQuantity::default().deserialize(&json!(1.5)).is_err());
        assert!(IntegerQuantity::default().deserialize(&json!("7")).is_err());
        assert_eq!(
            IntegerQuantity::default().deserialize(&json!(42.0)).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            IntegerQuantity::default().deserialize(&json!(7)).unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn test_float_defaults_and_boundary() {
        let q = FloatQuantity::default();
        assert!(q.equal(&Value::Float(1.0), &Value::Float(1.00005)));
        assert!(!q.equal(&Value::Float(1.0), &Value::Float(1.001)));

        let q = FloatQuantity::from_parameters(&params(json!({"abs_tol": 0.5}))).unwrap();
        assert!(q.equal(&Value::Float(1.0), &Value::Float(1.5)));
        assert!(!q.equal(&Value::Float(1.0), &Value::Float(1.5 + 1e-9)));
    }

    #[test]
    fn test_float_accepts_integer_values() {
        let q = FloatQuantity::default();
        assert_eq!(q.deserialize(&json!(2)).unwrap(), Value::Float(2.0));
        assert!(q.equal(&Value::Int(2), &Value::Float(2.0)));
    }

    #[test]
    fn test_float_non_finite_roundtrip() {
        let q = FloatQuantity::default();
        for x in [f64::INFINITY, f64::NEG_INFINITY] {
            let data = q.serialize(&Value::Float(x));
            assert_eq!(q.deserialize(&data).unwrap(), Value::Float(x));
        }
        let data = q.serialize(&Value::Float(f64::NAN));
        assert_eq!(data, json!("nan"));
        assert!(matches!(q.deserialize(&data).unwrap(), Value::Float(x) if x.is_nan()));
    }

    #[test]
    fn test_float_short_format() {
        let q = FloatQuantity::default();
        assert_eq!(q.str_short(&Value::Float(1.5), 16), "1.500000");
        let wide = q.str_short(&Value::Float(123456789.123), 10);
        assert!(wide.chars().count() <= 10, "{wide}");
        assert!(wide.contains('e'));
    }

    #[test]
    fn test_float_formatting_options() {
        let q = FloatQuantity::from_parameters(&params(
            json!({"signed": true, "allow_exp": false, "zero_pad": true}),
        ))
        .unwrap();
        assert!(q.signed && !q.allow_exp && q.zero_pad);
        assert_eq!(q.str_short(&Value::Float(1.5), 12), " 0001.500000");
        assert_eq!(q.str_short(&Value::Float(-1.5), 12), "-0001.500000");

        // Without exponent form the precision gives way first.
        let wide = q.str_short(&Value::Float(123456789.123), 10);
        assert_eq!(wide, " 123456789");

        let signed = FloatQuantity {
            signed: true,
            ..FloatQuantity::default()
        };
        assert_eq!(signed.str_short(&Value::Float(2.0), 16), " 2.000000");
        assert_eq!(signed.str_short(&Value::Float(f64::INFINITY), 16), " inf");
        assert!(FloatQuantity::default()
            .str_short(&Value::Float(123456789.123), 10)
            .contains('e'));
        assert_eq!(FloatQuantity::default().str_short(&Value::Float(-0.25), 16), "-0.250000");
    }

    #[test]
    fn test_float_formatting_parameters_round_trip() {
        let q = FloatQuantity::from_parameters(&params(json!({"allow_exp": false}))).unwrap();
        assert_eq!(Data::Object(q.parameters()), json!({"allow_exp": false}));
        assert!(FloatQuantity::from_parameters(&params(json!({"signed": "yes"}))).is_err());
    }

    #[test]
    fn test_float_compare_msg() {
        let q = FloatQuantity::default();
        assert_eq!(
            q.compare_msg(&Value::Float(1.0), &Value::Float(1.25)),
            "Abs. error 0.250000"
        );
    }

    #[test]
    fn test_parameters_only_lists_changes() {
        let q = FloatQuantity::from_parameters(&params(json!({"precision": 3}))).unwrap();
        assert_eq!(Data::Object(q.parameters()), json!({"precision": 3}));
    }
}
