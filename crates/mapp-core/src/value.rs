//! Typed values and the two conversion directions.
//!
//! `coerce_*` runs at module boundaries (CLI strings, JSON bodies, YAML
//! scalars) and is lenient unless told otherwise. `validate_type` runs at
//! validation time and never coerces.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Timelike};
use serde_json::json;

use crate::error::MappError;
use crate::types::ValueType;

/// The single wire format for datetimes, seconds precision.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Datetime(NaiveDateTime),
    List(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

/// A model instance, op params or op output keyed by snake field name.
pub type Record = BTreeMap<String, Value>;

const TRUE_WORDS: [&str; 5] = ["t", "true", "1", "yes", "on"];
const FALSE_WORDS: [&str; 5] = ["f", "false", "0", "no", "off"];

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Datetime(_) => "datetime",
            Self::List(_) => "list",
            Self::Struct(_) => "struct",
        }
    }

    /// Truthiness for branch predicates: bools are themselves, numbers are
    /// `!= 0`, strings and lists are `len > 0`, null is false, structs and
    /// datetimes are always truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Datetime(_) | Self::Struct(_) => true,
        }
    }

    /// Serialize to JSON; datetimes become canonical strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => json!(s),
            Self::Datetime(dt) => json!(dt.format(DATETIME_FORMAT).to_string()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Self::Struct(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Coerce a JSON value to a declared type. Boundary-level: lenient
    /// unless `strict` is set (strict booleans must be real booleans).
    pub fn from_json(raw: &serde_json::Value, ty: &ValueType, strict: bool) -> Result<Self, MappError> {
        if raw.is_null() {
            return Ok(Self::Null);
        }
        match ty {
            ValueType::Bool => match raw {
                serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
                serde_json::Value::String(s) if !strict => parse_lenient_bool(s),
                other => Err(type_error("bool", other)),
            },
            ValueType::Int => match raw {
                serde_json::Value::Number(n) => {
                    n.as_i64().map(Self::Int).ok_or_else(|| type_error("int", raw))
                }
                serde_json::Value::String(s) if !strict => s
                    .trim()
                    .parse::<i64>()
                    .map(Self::Int)
                    .map_err(|_| type_error("int", raw)),
                _ => Err(type_error("int", raw)),
            },
            ValueType::Float => match raw {
                serde_json::Value::Number(n) => {
                    n.as_f64().map(Self::Float).ok_or_else(|| type_error("float", raw))
                }
                serde_json::Value::String(s) if !strict => s
                    .trim()
                    .parse::<f64>()
                    .map(Self::Float)
                    .map_err(|_| type_error("float", raw)),
                _ => Err(type_error("float", raw)),
            },
            ValueType::Str => match raw {
                serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
                serde_json::Value::Bool(b) if !strict => Ok(Self::Str(b.to_string())),
                serde_json::Value::Number(n) if !strict => Ok(Self::Str(n.to_string())),
                _ => Err(type_error("str", raw)),
            },
            ValueType::Datetime => match raw {
                serde_json::Value::String(s) => parse_datetime(s),
                _ => Err(type_error("datetime", raw)),
            },
            ValueType::ForeignKey => match raw {
                serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
                serde_json::Value::Number(n) if !strict => Ok(Self::Str(n.to_string())),
                _ => Err(type_error("foreign_key", raw)),
            },
            ValueType::List(element) => match raw {
                serde_json::Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (position, item) in items.iter().enumerate() {
                        out.push(Self::from_json(item, element, strict).map_err(|e| {
                            MappError::TypeError(format!("list element {position}: {e}"))
                        })?);
                    }
                    Ok(Self::List(out))
                }
                _ => Err(type_error("list", raw)),
            },
            ValueType::Struct => match raw {
                serde_json::Value::Object(_) => Self::from_json_any(raw),
                _ => Err(type_error("struct", raw)),
            },
            ValueType::Any => Self::from_json_any(raw),
        }
    }

    /// Infer a typed value from bare JSON (untyped Lingo literals, struct
    /// members). Strings stay strings; no datetime sniffing.
    pub fn from_json_any(raw: &serde_json::Value) -> Result<Self, MappError> {
        match raw {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float).ok_or_else(|| type_error("number", raw))
                }
            }
            serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Self::from_json_any(item)?);
                }
                Ok(Self::List(out))
            }
            serde_json::Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k.clone(), Self::from_json_any(v)?);
                }
                Ok(Self::Struct(out))
            }
        }
    }

    /// Coerce a raw text value (CLI arguments, query strings).
    pub fn coerce_text(raw: &str, ty: &ValueType, strict: bool) -> Result<Self, MappError> {
        match ty {
            ValueType::Bool => parse_lenient_bool(raw),
            ValueType::Int => raw
                .trim()
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|_| MappError::TypeError(format!("expected int, got {raw:?}"))),
            ValueType::Float => raw
                .trim()
                .parse::<f64>()
                .map(Self::Float)
                .map_err(|_| MappError::TypeError(format!("expected float, got {raw:?}"))),
            ValueType::Str | ValueType::ForeignKey => Ok(Self::Str(raw.to_string())),
            ValueType::Datetime => parse_datetime(raw),
            ValueType::List(_) | ValueType::Struct | ValueType::Any => {
                let parsed: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|_| MappError::TypeError(format!("expected JSON for {}", ty.name())))?;
                Self::from_json(&parsed, ty, strict)
            }
        }
    }

    /// Coerce an already-typed value to another declared type.
    pub fn coerce(&self, ty: &ValueType) -> Result<Self, MappError> {
        if self.validate_type(ty).is_ok() {
            return Ok(self.clone());
        }
        match (self, ty) {
            (Self::Int(i), ValueType::Float) => Ok(Self::Float(*i as f64)),
            (Self::Str(s), ValueType::Datetime) => parse_datetime(s),
            (Self::Datetime(dt), ValueType::Str) => {
                Ok(Self::Str(dt.format(DATETIME_FORMAT).to_string()))
            }
            (Self::Str(s), ValueType::ForeignKey) => Ok(Self::Str(s.clone())),
            _ => Self::from_json(&self.to_json(), ty, false),
        }
    }

    /// Exact type check; no coercion. For lists the first mismatching
    /// element yields the error.
    pub fn validate_type(&self, ty: &ValueType) -> Result<(), MappError> {
        let ok = match (self, ty) {
            (_, ValueType::Any) => true,
            (Self::Bool(_), ValueType::Bool) => true,
            (Self::Int(_), ValueType::Int) => true,
            (Self::Float(_), ValueType::Float) => true,
            (Self::Str(_), ValueType::Str) => true,
            (Self::Str(_), ValueType::ForeignKey) => true,
            (Self::Datetime(_), ValueType::Datetime) => true,
            (Self::Struct(_), ValueType::Struct) => true,
            (Self::List(items), ValueType::List(element)) => {
                for (position, item) in items.iter().enumerate() {
                    item.validate_type(element).map_err(|_| {
                        MappError::TypeError(format!(
                            "list element {position} is {}, expected {}",
                            item.type_name(),
                            element.name()
                        ))
                    })?;
                }
                true
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(MappError::TypeError(format!(
                "expected {}, got {}",
                ty.name(),
                self.type_name()
            )))
        }
    }

    /// Human-facing rendering used by the document renderer.
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Datetime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Self::List(_) | Self::Struct(_) => self.to_json().to_string(),
        }
    }
}

/// Equality for switch cases and `compare.eq`: numeric kinds compare by
/// value across int/float, everything else by exact variant.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        _ => left == right,
    }
}

/// Parse the canonical datetime format; sub-second precision is truncated
/// on ingress.
pub fn parse_datetime(raw: &str) -> Result<Value, MappError> {
    let raw = raw.trim();
    let parsed = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| MappError::TypeError(format!("expected datetime {DATETIME_FORMAT}, got {raw:?}")))?;
    Ok(Value::Datetime(parsed.with_nanosecond(0).unwrap_or(parsed)))
}

fn parse_lenient_bool(raw: &str) -> Result<Value, MappError> {
    let word = raw.trim().to_lowercase();
    if TRUE_WORDS.contains(&word.as_str()) {
        Ok(Value::Bool(true))
    } else if FALSE_WORDS.contains(&word.as_str()) {
        Ok(Value::Bool(false))
    } else {
        Err(MappError::TypeError(format!("expected bool, got {raw:?}")))
    }
}

fn type_error(expected: &str, got: &serde_json::Value) -> MappError {
    MappError::TypeError(format!("expected {expected}, got {got}"))
}

/// Serialize a record to a JSON object with canonical datetime strings.
pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(record.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}
