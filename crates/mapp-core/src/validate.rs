//! Record validation and boundary coercion against a spec slice.
//!
//! A "spec slice" is any ordered field set: `model.fields`, `op.params` or
//! `op.output`. Errors accumulate per field (first error per field wins)
//! and raise atomically as a single `Validation` value.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::MappError;
use crate::field::Field;
use crate::ordered::OrderedMap;
use crate::types::BaseType;
use crate::value::{Record, Value};

/// Validate an already-typed record. No coercion; exact type match.
pub fn validate_record(
    scope: &str,
    fields: &OrderedMap<Field>,
    record: &Record,
) -> Result<(), MappError> {
    let mut field_errors: BTreeMap<String, String> = BTreeMap::new();
    for (key, field) in fields.iter() {
        let name = field_key(key, field);
        match record.get(name) {
            None | Some(Value::Null) => {
                if field.required {
                    field_errors.insert(name.to_string(), "field is missing".to_string());
                }
            }
            Some(value) => {
                if let Err(err) = check_value(field, value) {
                    field_errors.entry(name.to_string()).or_insert_with(|| err.to_string());
                }
            }
        }
    }
    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(MappError::Validation { scope: scope.to_string(), field_errors })
    }
}

/// Coerce a raw JSON body into a typed record and validate it in one pass.
/// Used at every module boundary (HTTP body, CLI payload, op params).
pub fn check_record(
    scope: &str,
    fields: &OrderedMap<Field>,
    raw: &serde_json::Value,
) -> Result<Record, MappError> {
    let body = raw.as_object().ok_or_else(|| MappError::Validation {
        scope: scope.to_string(),
        field_errors: BTreeMap::from([(
            "body".to_string(),
            "expected a JSON object".to_string(),
        )]),
    })?;

    let mut record = Record::new();
    let mut field_errors: BTreeMap<String, String> = BTreeMap::new();
    for (key, field) in fields.iter() {
        let name = field_key(key, field);
        match body.get(name) {
            None | Some(serde_json::Value::Null) => {
                if field.required {
                    field_errors.insert(name.to_string(), "field is missing".to_string());
                }
            }
            Some(raw_value) => {
                let ty = match field.value_type() {
                    Ok(ty) => ty,
                    Err(err) => {
                        field_errors.insert(name.to_string(), err.to_string());
                        continue;
                    }
                };
                match Value::from_json(raw_value, &ty, false) {
                    Ok(value) => {
                        if let Err(err) = check_value(field, &value) {
                            field_errors.insert(name.to_string(), err.to_string());
                        } else {
                            record.insert(name.to_string(), value);
                        }
                    }
                    Err(err) => {
                        field_errors.insert(name.to_string(), err.to_string());
                    }
                }
            }
        }
    }
    // The record id travels alongside the declared fields.
    if let Some(serde_json::Value::String(id)) = body.get("id") {
        record.insert("id".to_string(), Value::Str(id.clone()));
    }

    if field_errors.is_empty() {
        Ok(record)
    } else {
        Err(MappError::Validation { scope: scope.to_string(), field_errors })
    }
}

fn check_value(field: &Field, value: &Value) -> Result<(), MappError> {
    value.validate_type(&field.value_type()?)?;
    if let Some(allowed) = &field.enum_values {
        if let Value::Str(word) = value {
            if !allowed.iter().any(|a| a == word) {
                return Err(MappError::TypeError(format!(
                    "{word:?} is not one of {allowed:?}"
                )));
            }
        }
    }
    Ok(())
}

fn field_key<'a>(key: &'a str, field: &'a Field) -> &'a str {
    let snake = field.snake();
    if snake.is_empty() {
        key
    } else {
        snake
    }
}

/// A valid instance built from each field's first example.
pub fn example_record(fields: &OrderedMap<Field>) -> Result<Record, MappError> {
    let mut record = Record::new();
    for (key, field) in fields.iter() {
        record.insert(field_key(key, field).to_string(), field.example_value()?);
    }
    Ok(record)
}

/// A valid instance with randomized scalar values; enum fields draw from
/// their declared words, everything else from type-shaped ranges.
pub fn random_record(fields: &OrderedMap<Field>, rng: &mut StdRng) -> Result<Record, MappError> {
    let mut record = Record::new();
    for (key, field) in fields.iter() {
        let value = random_value(field, field.r#type, rng)?;
        record.insert(field_key(key, field).to_string(), value);
    }
    Ok(record)
}

fn random_value(field: &Field, base: BaseType, rng: &mut StdRng) -> Result<Value, MappError> {
    if let Some(allowed) = &field.enum_values {
        if !allowed.is_empty() && base == BaseType::Str {
            let pick = rng.gen_range(0..allowed.len());
            return Ok(Value::Str(allowed[pick].clone()));
        }
    }
    match base {
        BaseType::Bool => Ok(Value::Bool(rng.gen_bool(0.5))),
        BaseType::Int => Ok(Value::Int(rng.gen_range(0..1000))),
        BaseType::Float => Ok(Value::Float(rng.gen_range(0.0..100.0))),
        BaseType::Str => Ok(Value::Str(format!("{}_{}", field_label(field), rng.gen_range(0..10000)))),
        BaseType::ForeignKey => Ok(Value::Str(format!("id_{}", rng.gen_range(0..10000)))),
        BaseType::Datetime => {
            // Random instant inside a fixed year keeps generated data readable.
            let raw = format!(
                "2024-{:02}-{:02}T{:02}:{:02}:{:02}",
                rng.gen_range(1..=12),
                rng.gen_range(1..=28),
                rng.gen_range(0..24),
                rng.gen_range(0..60),
                rng.gen_range(0..60)
            );
            crate::value::parse_datetime(&raw)
        }
        BaseType::List => {
            let element = field.element_type.ok_or_else(|| {
                MappError::UnsupportedType("list without element_type".to_string())
            })?;
            let count = rng.gen_range(1..4);
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(random_value(field, element, rng)?);
            }
            Ok(Value::List(items))
        }
        BaseType::Struct => Ok(Value::Struct(Default::default())),
    }
}

fn field_label(field: &Field) -> &str {
    let snake = field.snake();
    if snake.is_empty() {
        "value"
    } else {
        snake
    }
}
