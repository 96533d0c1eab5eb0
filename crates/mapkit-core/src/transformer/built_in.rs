//! Built-in transformers for common coercions
//!
//! Each function returns a ready-to-register transformer. Reversible pairs
//! (string and URL, array and set, ...) are a single transformer that
//! validates both directions.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::types::{BlockValueTransformer, TransformError, TransformResult, ValueTransformer};
use crate::value::{Decimal, Value, ValueKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fmt::Write;
use std::sync::Arc;
use url::Url;

fn failed(transformer: &str, message: impl Into<String>) -> TransformError {
    TransformError::TransformationFailed {
        transformer: transformer.to_string(),
        message: message.into(),
    }
}

fn unsupported(transformer: &str, output: ValueKind) -> TransformError {
    TransformError::UnsupportedOutputClass {
        transformer: transformer.to_string(),
        output,
    }
}

/// Passes values through when input and output classes already agree
pub fn identity() -> Arc<dyn ValueTransformer> {
    Arc::new(BlockValueTransformer::new(
        "identity",
        |input, output| input == output,
        |value, _| Ok(value.clone()),
    ))
}

/// String and URL in both directions
pub fn string_to_url() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "string_to_url";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            matches!((input, output), (ValueKind::String, ValueKind::Url) | (ValueKind::Url, ValueKind::String))
        },
        |value, output| match (value, output) {
            (Value::String(s), ValueKind::Url) => Url::parse(s)
                .map(Value::Url)
                .map_err(|e| failed(NAME, format!("'{}' is not a URL: {}", s, e))),
            (Value::Url(u), ValueKind::String) => Ok(Value::String(u.to_string())),
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

const TRUE_STRINGS: [&str; 5] = ["true", "t", "yes", "y", "1"];
const FALSE_STRINGS: [&str; 5] = ["false", "f", "no", "n", "0"];

fn parse_number(name: &str, text: &str, output: ValueKind) -> TransformResult<Value> {
    let trimmed = text.trim();
    match output {
        ValueKind::Integer => trimmed
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| match trimmed.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::Integer(f as i64)),
                _ => Err(failed(name, format!("'{}' is not an integer", text))),
            }),
        ValueKind::Float => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| failed(name, format!("'{}' is not a number", text))),
        ValueKind::Bool => {
            let lowered = trimmed.to_ascii_lowercase();
            if TRUE_STRINGS.contains(&lowered.as_str()) {
                Ok(Value::Bool(true))
            } else if FALSE_STRINGS.contains(&lowered.as_str()) {
                Ok(Value::Bool(false))
            } else {
                Err(failed(name, format!("'{}' is not a boolean", text)))
            }
        }
        other => Err(unsupported(name, other)),
    }
}

/// Numbers (including booleans) and strings in both directions
pub fn number_to_string() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "number_to_string";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            (input.is_number() && output == ValueKind::String)
                || (input == ValueKind::String && output.is_number())
        },
        |value, output| match value {
            Value::String(s) => parse_number(NAME, s, output),
            Value::Integer(i) => Ok(Value::String(i.to_string())),
            Value::Float(f) => Ok(Value::String(f.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(failed(NAME, format!("cannot render {} as a string", other.kind()))),
        },
    ))
}

/// Integers, floats and booleans between each other
pub fn number_to_number() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "number_to_number";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| input.is_number() && output.is_number() && input != output,
        |value, output| {
            let number = value
                .as_f64()
                .ok_or_else(|| failed(NAME, format!("{} is not numeric", value.kind())))?;
            match output {
                ValueKind::Integer => Ok(Value::Integer(number.trunc() as i64)),
                ValueKind::Float => Ok(Value::Float(number)),
                ValueKind::Bool => Ok(Value::Bool(number != 0.0)),
                other => Err(unsupported(NAME, other)),
            }
        },
    ))
}

/// Array and ordered set in both directions
pub fn array_to_ordered_set() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "array_to_ordered_set";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            matches!(
                (input, output),
                (ValueKind::Array, ValueKind::OrderedSet) | (ValueKind::OrderedSet, ValueKind::Array)
            )
        },
        |value, output| match (value, output) {
            (Value::Array(items), ValueKind::OrderedSet) => Ok(Value::ordered_set_of(items.iter().cloned())),
            (Value::OrderedSet(items), ValueKind::Array) => Ok(Value::Array(items.clone())),
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

/// Array (or ordered set) and set in both directions
pub fn array_to_set() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "array_to_set";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            matches!(
                (input, output),
                (ValueKind::Array | ValueKind::OrderedSet, ValueKind::Set) | (ValueKind::Set, ValueKind::Array)
            )
        },
        |value, output| match (value, output) {
            (Value::Array(items) | Value::OrderedSet(items), ValueKind::Set) => Ok(Value::set_of(items.iter().cloned())),
            (Value::Set(items), ValueKind::Array) => Ok(Value::Array(items.clone())),
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

/// Decimal and binary numbers in both directions
pub fn decimal_to_number() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "decimal_to_number";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            (input == ValueKind::Decimal && matches!(output, ValueKind::Integer | ValueKind::Float))
                || (matches!(input, ValueKind::Integer | ValueKind::Float) && output == ValueKind::Decimal)
        },
        |value, output| match (value, output) {
            (Value::Decimal(d), ValueKind::Float) => Ok(Value::Float(d.to_f64())),
            (Value::Decimal(d), ValueKind::Integer) => {
                let f = d.to_f64();
                if f.is_finite() {
                    Ok(Value::Integer(f.trunc() as i64))
                } else {
                    Err(failed(NAME, format!("{} does not fit an integer", d)))
                }
            }
            (Value::Integer(i), ValueKind::Decimal) => Decimal::parse(&i.to_string())
                .map(Value::Decimal)
                .ok_or_else(|| failed(NAME, "integer did not produce a decimal")),
            (Value::Float(f), ValueKind::Decimal) => Decimal::from_f64(*f)
                .map(Value::Decimal)
                .ok_or_else(|| failed(NAME, format!("{} is not a finite number", f))),
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

/// Decimal and string in both directions
pub fn decimal_to_string() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "decimal_to_string";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            matches!(
                (input, output),
                (ValueKind::Decimal, ValueKind::String) | (ValueKind::String, ValueKind::Decimal)
            )
        },
        |value, output| match (value, output) {
            (Value::Decimal(d), ValueKind::String) => Ok(Value::String(d.to_string())),
            (Value::String(s), ValueKind::Decimal) => Decimal::parse(s)
                .map(Value::Decimal)
                .ok_or_else(|| failed(NAME, format!("'{}' is not a decimal", s))),
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

/// The null sentinel becomes nil for any output class
pub fn null_to_nil() -> Arc<dyn ValueTransformer> {
    Arc::new(BlockValueTransformer::new(
        "null_to_nil",
        |input, _| input == ValueKind::Null,
        |_, _| Ok(Value::Null),
    ))
}

/// Any archivable value to opaque data and back
pub fn keyed_archive() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "keyed_archive";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            (output == ValueKind::Data && !matches!(input, ValueKind::Data | ValueKind::Object | ValueKind::Null))
                || (input == ValueKind::Data && !matches!(output, ValueKind::Data | ValueKind::Object))
        },
        |value, output| match (value, output) {
            (Value::Data(bytes), output) => {
                let restored: Value = serde_json::from_slice(bytes)
                    .map_err(|e| failed(NAME, format!("data is not an archive: {}", e)))?;
                if restored.kind() == output {
                    Ok(restored)
                } else {
                    Err(unsupported(NAME, output))
                }
            }
            (value, ValueKind::Data) => serde_json::to_vec(value)
                .map(Value::Data)
                .map_err(|e| failed(NAME, format!("cannot archive {}: {}", value.kind(), e))),
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

fn date_from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round() as u32;
    let (whole, nanos) = if nanos >= 1_000_000_000 { (whole + 1.0, 0) } else { (whole, nanos) };
    Utc.timestamp_opt(whole as i64, nanos).single()
}

fn epoch_from_date(date: &DateTime<Utc>) -> f64 {
    date.timestamp() as f64 + f64::from(date.timestamp_subsec_nanos()) / 1_000_000_000.0
}

/// Seconds since the Unix epoch and timestamps in both directions,
/// keeping sub-second precision through floating point
pub fn timestamp_to_date() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "timestamp_to_date";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            (matches!(input, ValueKind::Integer | ValueKind::Float | ValueKind::Decimal) && output == ValueKind::Date)
                || (input == ValueKind::Date && matches!(output, ValueKind::Integer | ValueKind::Float))
        },
        |value, output| match (value, output) {
            (Value::Date(d), ValueKind::Float) => Ok(Value::Float(epoch_from_date(d))),
            (Value::Date(d), ValueKind::Integer) => Ok(Value::Integer(d.timestamp())),
            (value, ValueKind::Date) => value
                .as_f64()
                .and_then(date_from_epoch)
                .map(Value::Date)
                .ok_or_else(|| failed(NAME, format!("{} is not a representable timestamp", value.kind()))),
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

/// Anything with a natural string rendering to a string
pub fn string_value() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "string_value";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            output == ValueKind::String
                && matches!(
                    input,
                    ValueKind::Bool | ValueKind::Integer | ValueKind::Float | ValueKind::Decimal | ValueKind::Url
                )
        },
        |value, _| match value {
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Integer(i) => Ok(Value::String(i.to_string())),
            Value::Float(f) => Ok(Value::String(f.to_string())),
            Value::Decimal(d) => Ok(Value::String(d.to_string())),
            Value::Url(u) => Ok(Value::String(u.to_string())),
            other => Err(failed(NAME, format!("{} has no string value", other.kind()))),
        },
    ))
}

/// Wrap a singular value into a one-element collection
pub fn object_to_collection() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "object_to_collection";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| output.is_collection() && !input.is_collection() && input != ValueKind::Null,
        |value, output| match output {
            ValueKind::Array => Ok(Value::Array(vec![value.clone()])),
            ValueKind::OrderedSet => Ok(Value::OrderedSet(vec![value.clone()])),
            ValueKind::Set => Ok(Value::Set(vec![value.clone()])),
            other => Err(unsupported(NAME, other)),
        },
    ))
}

/// ISO 8601 / RFC 3339 strings and timestamps in both directions
pub fn iso8601_timestamp() -> Arc<dyn ValueTransformer> {
    const NAME: &str = "iso8601_timestamp";
    Arc::new(BlockValueTransformer::new(
        NAME,
        |input, output| {
            matches!(
                (input, output),
                (ValueKind::String, ValueKind::Date) | (ValueKind::Date, ValueKind::String)
            )
        },
        |value, output| match (value, output) {
            (Value::String(s), ValueKind::Date) => DateTime::parse_from_rfc3339(s.trim())
                .map(|d| Value::Date(d.with_timezone(&Utc)))
                .map_err(|e| failed(NAME, format!("'{}' is not ISO 8601: {}", s, e))),
            (Value::Date(d), ValueKind::String) => {
                Ok(Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)))
            }
            (_, output) => Err(unsupported(NAME, output)),
        },
    ))
}

fn parse_with_format(text: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_str(text, format) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Strings and timestamps through an ordered list of `strftime` formats.
///
/// Parsing tries each format in order; formatting uses the first one.
/// Formats without a zone are read as UTC.
pub fn date_formatter(formats: Vec<String>) -> Arc<dyn ValueTransformer> {
    let name = format!("date_formatter({})", formats.join(" | "));
    let transformer_name = name.clone();
    Arc::new(BlockValueTransformer::new(
        name,
        |input, output| {
            matches!(
                (input, output),
                (ValueKind::String, ValueKind::Date) | (ValueKind::Date, ValueKind::String)
            )
        },
        move |value, output| match (value, output) {
            (Value::String(s), ValueKind::Date) => formats
                .iter()
                .find_map(|format| parse_with_format(s.trim(), format))
                .map(Value::Date)
                .ok_or_else(|| failed(&transformer_name, format!("'{}' matches no date format", s))),
            (Value::Date(d), ValueKind::String) => {
                let format = formats
                    .first()
                    .ok_or_else(|| failed(&transformer_name, "no date formats configured"))?;
                let mut text = String::new();
                write!(text, "{}", d.format(format))
                    .map_err(|_| failed(&transformer_name, format!("'{}' is not a valid date format", format)))?;
                Ok(Value::String(text))
            }
            (_, output) => Err(unsupported(&transformer_name, output)),
        },
    ))
}

/// Default date formats tried after ISO 8601
pub fn default_date_formats() -> Vec<String> {
    vec![
        "%Y-%m-%dT%H:%M:%SZ".to_string(),
        "%Y-%m-%d %H:%M:%S".to_string(),
        "%m/%d/%Y".to_string(),
        "%Y-%m-%d".to_string(),
    ]
}
