//! Schema casting for loosely-typed input.
//!
//! CSV rows arrive as strings and JSON payloads arrive with whatever types the
//! client chose. These `serde` helpers coerce a field into the type its record
//! schema declares, or fail with a cast error that rejects the whole record.
//!
//! | Helper | Accepts |
//! |--------|---------|
//! | [`number`] | numbers, numeric strings, booleans (`1`/`0`) |
//! | [`integer`] | integral numbers and integral numeric strings |
//! | [`boolean`] | booleans, `true/false/1/0/yes/no` strings, `1`/`0` |
//! | [`string`] | strings, numbers, booleans |
//! | [`array`] | arrays, strings holding a JSON array, any single value |
//!
//! `null` and blank strings cast to "absent" everywhere.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("Cast to Number failed for value {}", n))),
        Value::Bool(b) => Ok(Some(if b { 1.0 } else { 0.0 })),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| {
                    D::Error::custom(format!("Cast to Number failed for value \"{}\"", s))
                })
        }
        other => Err(D::Error::custom(format!(
            "Cast to Number failed for value {}",
            other
        ))),
    }
}

pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let parsed = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| D::Error::custom("Cast to integer failed"))
}

fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.2e18 {
        Some(v as i64)
    } else {
        None
    }
}

pub fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b)),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Ok(Some(true)),
            Some(v) if v == 0.0 => Ok(Some(false)),
            _ => Err(D::Error::custom(format!(
                "Cast to Boolean failed for value {}",
                n
            ))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(D::Error::custom(format!(
                "Cast to Boolean failed for value \"{}\"",
                s
            ))),
        },
        other => Err(D::Error::custom(format!(
            "Cast to Boolean failed for value {}",
            other
        ))),
    }
}

/// Lenient flag: anything that is not recognisably "true" is `false`.
pub fn loose_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        ),
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    })
}

pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(D::Error::custom(format!(
            "Cast to String failed for value {}",
            other
        ))),
    }
}

pub fn required_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match string(deserializer)? {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(D::Error::custom("required value is missing or empty")),
    }
}

pub fn array<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<Value>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Array(items) => Ok(Some(items)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Some(Vec::new()));
            }
            if trimmed.starts_with('[') {
                if let Ok(Value::Array(items)) = serde_json::from_str(trimmed) {
                    return Ok(Some(items));
                }
            }
            Ok(Some(vec![Value::String(s)]))
        }
        other => Ok(Some(vec![other])),
    }
}

/// Render a float as a JSON integer when it has no fractional part.
pub fn number_value(v: f64) -> Value {
    match integral(v) {
        Some(i) if i.unsigned_abs() < (1u64 << 53) => Value::from(i),
        _ => Value::from(v),
    }
}

pub fn ser_number<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => number_value(*v).serialize(serializer),
        None => serializer.serialize_none(),
    }
}

pub fn ser_number_required<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    number_value(*value).serialize(serializer)
}
