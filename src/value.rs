//! Dynamic values held by an [`crate::model::AttributeStore`].
//!
//! Plain data (scalars, dates, raw arrays and maps) is owned inline. Casted
//! objects and casted collections are shared handles, so cloning a [`Value`]
//! that holds one of them yields the *same* object, not a copy.
use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;

use crate::collection::CastedCollection;
use crate::model::Model;
use crate::typecast::time::format_time;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    Time(DateTime<FixedOffset>),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Model(Model),
    Collection(CastedCollection),
}

/// Knobs for the plain key→value projection.
#[derive(Debug, Clone)]
pub struct ProjectionOptions {
    /// Fractional second digits used when encoding times.
    pub fraction_digits: usize,
    /// Restrict the top-level keys of the projected object.
    pub only: Option<Vec<String>>,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self { fraction_digits: 3, only: None }
    }
}

impl ProjectionOptions {
    /// Options for nested objects: `only` applies to the top level alone.
    pub(crate) fn nested(&self) -> Self {
        Self { fraction_digits: self.fraction_digits, only: None }
    }

    pub(crate) fn admits(&self, key: &str) -> bool {
        match &self.only {
            None => true,
            Some(keys) => keys.iter().any(|k| k == key),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Value {
    /// Human name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Array(_) => "array",
            Value::Map(_) => "hash",
            Value::Model(_) => "model",
            Value::Collection(_) => "casted collection",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `Null`, a whitespace-only string, or an empty sequence/map.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(xs) => xs.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Collection(c) => c.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Value::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CastedCollection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Convert loosely-typed JSON input. Numbers become `Integer` when they fit
    /// an `i64`, otherwise `Float`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(xs) => Value::Array(xs.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => Value::Map(
                m.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }

    /// Plain JSON projection; casted objects recurse through
    /// [`Model::to_plain_with`].
    pub fn to_json(&self, options: &ProjectionOptions) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Integer(i) => J::from(*i),
            // non-finite floats have no JSON form
            Value::Float(f) => serde_json::Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
            Value::String(s) => J::String(s.clone()),
            Value::Date(d) => J::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => J::String(format_time(t, options.fraction_digits)),
            Value::Array(xs) => J::Array(xs.iter().map(|x| x.to_json(options)).collect()),
            Value::Map(m) => J::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json(options))).collect(),
            ),
            Value::Model(m) => m.to_plain_with(options),
            Value::Collection(c) => J::Array(c.to_vec().iter().map(|x| x.to_json(options)).collect()),
        }
    }
}

/// Casted objects compare by identity; everything else by content. A casted
/// collection equals a plain array holding the same elements.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => a.ptr_eq(b),
            (Value::Collection(a), Value::Collection(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Value::Collection(a), Value::Array(b)) | (Value::Array(b), Value::Collection(a)) => {
                a.to_vec() == *b
            }
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Value::Time(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(xs: Vec<Value>) -> Self {
        Value::Array(xs)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl From<Model> for Value {
    fn from(m: Model) -> Self {
        Value::Model(m)
    }
}

impl From<CastedCollection> for Value {
    fn from(c: CastedCollection) -> Self {
        Value::Collection(c)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

/// Turn a JSON object into an attribute mapping; anything else is an empty map.
pub fn attrs(json: serde_json::Value) -> IndexMap<String, Value> {
    match Value::from_json(&json) {
        Value::Map(m) => m,
        _ => IndexMap::new(),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_prefer_integers() {
        assert_eq!(Value::from_json(&json!(3)), Value::Integer(3));
        assert!(matches!(Value::from_json(&json!(3.5)), Value::Float(f) if f == 3.5));
        // u64 beyond i64 falls back to float
        assert!(matches!(Value::from_json(&json!(u64::MAX)), Value::Float(_)));
    }

    #[test]
    fn maps_keep_insertion_order() {
        let v = Value::from_json(&json!({"b": 1, "a": 2}));
        let keys: Vec<_> = v.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn blank_values() {
        assert!(Value::Null.is_blank());
        assert!(Value::from("  ").is_blank());
        assert!(Value::Array(vec![]).is_blank());
        assert!(!Value::from(0).is_blank());
        assert!(!Value::from(false).is_blank());
    }

    #[test]
    fn plain_projection_of_scalars() {
        let opts = ProjectionOptions::default();
        let d = NaiveDate::from_ymd_opt(2011, 5, 21).unwrap();
        assert_eq!(Value::from(d).to_json(&opts), json!("2011-05-21"));
        assert_eq!(Value::Float(f64::NAN).to_json(&opts), json!(null));
        let nested = Value::from_json(&json!({"a": [1, "x", null]}));
        assert_eq!(nested.to_json(&opts), json!({"a": [1, "x", null]}));
    }

    #[test]
    fn mixed_numeric_equality() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Integer(2), Value::from("2"));
    }
}
