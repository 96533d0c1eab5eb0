//! Typed property values
//!
//! Parsed documents arrive as `serde_json::Value`. Destination objects hold
//! [`Value`], which distinguishes the richer classes the value transformers
//! convert between (dates, URLs, decimals, sets, opaque data, objects).
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::object::ObjectRef;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// Arbitrary precision decimal kept in its canonical textual form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(String);

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("decimal pattern is valid")
    })
}

impl Decimal {
    /// Parse a decimal from text, returning `None` when the text is not numeric
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if !decimal_pattern().is_match(trimmed) {
            return None;
        }
        Some(Self(normalize_decimal(trimmed)))
    }

    /// Build a decimal from a finite float
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Self::parse(&value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0.parse().unwrap_or(f64::NAN)
    }
}

fn normalize_decimal(text: &str) -> String {
    let text = text.strip_prefix('+').unwrap_or(text);
    if text.contains(['e', 'E']) || !text.contains('.') {
        return text.to_string();
    }
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 || self.to_f64() == other.to_f64()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The class of a [`Value`], used to declare property types and to pick
/// value transformers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Float,
    Decimal,
    String,
    Url,
    Date,
    Data,
    Array,
    OrderedSet,
    Set,
    Dictionary,
    Object,
}

impl ValueKind {
    /// Numeric classes (booleans are numbers to the transformers)
    pub fn is_number(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Float | ValueKind::Bool)
    }

    pub fn is_collection(self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::OrderedSet | ValueKind::Set)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A property value held by a destination object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Url(Url),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
    Array(Vec<Value>),
    /// Unique elements in insertion order
    OrderedSet(Vec<Value>),
    /// Unique elements, order insignificant
    Set(Vec<Value>),
    Dictionary(IndexMap<String, Value>),
    /// A related object; never archived
    #[serde(skip)]
    Object(ObjectRef),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::String(_) => ValueKind::String,
            Value::Url(_) => ValueKind::Url,
            Value::Date(_) => ValueKind::Date,
            Value::Data(_) => ValueKind::Data,
            Value::Array(_) => ValueKind::Array,
            Value::OrderedSet(_) => ValueKind::OrderedSet,
            Value::Set(_) => ValueKind::Set,
            Value::Dictionary(_) => ValueKind::Dictionary,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
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
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Elements of a collection value
    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::OrderedSet(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Related objects held by a relationship value (empty for non-objects)
    pub fn objects(&self) -> Vec<ObjectRef> {
        match self {
            Value::Object(o) => vec![o.clone()],
            Value::Array(items) | Value::OrderedSet(items) | Value::Set(items) => {
                items.iter().filter_map(|v| v.as_object().cloned()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Build a set, dropping equivalent duplicates
    pub fn set_of(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Set(unique(items))
    }

    /// Build an ordered set, dropping equivalent duplicates and keeping the first
    pub fn ordered_set_of(items: impl IntoIterator<Item = Value>) -> Value {
        Value::OrderedSet(unique(items))
    }

    /// Deep equivalence used by the unchanged-value check.
    ///
    /// Numbers compare numerically across classes, sets ignore order, arrays
    /// and ordered sets compare element-wise and objects compare by identity
    /// token.
    pub fn is_equivalent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Url(a), Value::Url(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.object_id() == b.object_id(),
            (Value::Array(a), Value::Array(b)) | (Value::OrderedSet(a), Value::OrderedSet(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_equivalent(y))
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.is_equivalent(y)))
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.is_equivalent(w)))
            }
            (a, b) if is_numeric(a) && is_numeric(b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            _ => false,
        }
    }

    /// Canonical text used to build attribute cache keys.
    ///
    /// Numbers that are equal render identically regardless of class, so a
    /// string identifier and a numeric one with the same digits collide.
    pub fn cache_key(&self) -> String {
        match self {
            Value::Null => "\u{0}null".to_string(),
            Value::Bool(b) => (*b as i64).to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Decimal(d) => match d.as_str().parse::<f64>() {
                Ok(f) if !d.as_str().contains(['e', 'E']) => format_float(f),
                _ => d.as_str().to_string(),
            },
            Value::String(s) => s.clone(),
            Value::Url(u) => u.as_str().to_string(),
            Value::Date(d) => d.timestamp_millis().to_string(),
            Value::Data(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            Value::Object(o) => format!("#{}", o.object_id()),
            Value::Array(items) | Value::OrderedSet(items) | Value::Set(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.cache_key()).collect();
                format!("[{}]", parts.join(","))
            }
            Value::Dictionary(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v.cache_key())).collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }

    /// Render back into a parsed-document value
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null | Value::Object(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::Decimal(d) => serde_json::Number::from_f64(d.to_f64())
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(d.to_string())),
            Value::String(s) => Json::String(s.clone()),
            Value::Url(u) => Json::String(u.to_string()),
            Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Data(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            Value::Array(items) | Value::OrderedSet(items) | Value::Set(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dictionary(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Integer(_) | Value::Float(_) | Value::Decimal(_))
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

fn unique(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|existing| existing.is_equivalent(&item)) {
            out.push(item);
        }
    }
    out
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_equivalent(other)
    }
}

impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Dictionary(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            }
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from(&json)
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        let value = Value::from(json!({"id": 1, "score": 2.5, "tags": ["a"], "ok": true, "none": null}));
        let Value::Dictionary(map) = &value else { panic!("expected dictionary") };
        assert_eq!(map["id"].kind(), ValueKind::Integer);
        assert_eq!(map["score"].kind(), ValueKind::Float);
        assert_eq!(map["tags"].kind(), ValueKind::Array);
        assert_eq!(map["ok"].kind(), ValueKind::Bool);
        assert!(map["none"].is_null());
        assert_eq!(value.to_json(), json!({"id": 1, "score": 2.5, "tags": ["a"], "ok": true, "none": null}));
    }

    #[test]
    fn test_numeric_equivalence_across_classes() {
        assert!(Value::Integer(3).is_equivalent(&Value::Float(3.0)));
        assert!(Value::Decimal(Decimal::parse("3.50").unwrap()).is_equivalent(&Value::Float(3.5)));
        assert!(!Value::Integer(3).is_equivalent(&Value::String("3".into())));
    }

    #[test]
    fn test_set_equivalence_ignores_order() {
        let a = Value::set_of(vec![Value::from(1), Value::from(2)]);
        let b = Value::set_of(vec![Value::from(2), Value::from(1)]);
        assert_eq!(a, b);

        let ordered_a = Value::ordered_set_of(vec![Value::from(1), Value::from(2)]);
        let ordered_b = Value::ordered_set_of(vec![Value::from(2), Value::from(1)]);
        assert_ne!(ordered_a, ordered_b);
    }

    #[test]
    fn test_set_construction_drops_duplicates() {
        let set = Value::set_of(vec![Value::from(1), Value::from(1.0), Value::from(2)]);
        assert_eq!(set.as_collection().unwrap().len(), 2);
    }

    #[test]
    fn test_decimal_normalization() {
        assert_eq!(Decimal::parse("+12.500").unwrap().as_str(), "12.5");
        assert_eq!(Decimal::parse("0.000").unwrap().as_str(), "0");
        assert_eq!(Decimal::parse("1e3").unwrap().as_str(), "1e3");
        assert!(Decimal::parse("abc").is_none());
        assert!(Decimal::parse("").is_none());
    }

    #[test]
    fn test_cache_key_collapses_numeric_classes() {
        assert_eq!(Value::Integer(7).cache_key(), "7");
        assert_eq!(Value::Float(7.0).cache_key(), "7");
        assert_eq!(Value::String("7".into()).cache_key(), "7");
        assert_eq!(Value::Decimal(Decimal::parse("7.0").unwrap()).cache_key(), "7");
        assert_ne!(Value::Null.cache_key(), Value::String("null".into()).cache_key());
    }
}
