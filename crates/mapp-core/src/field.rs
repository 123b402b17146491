//! Field declarations.
//!
//! The same `Field` shape backs model fields, op params, op output fields
//! and Lingo page state (where `calc` carries a Lingo expression tree).

use serde::{Deserialize, Serialize};

use crate::error::MappError;
use crate::names::Name;
use crate::types::{type_id, BaseType, ValueType};
use crate::value::Value;

/// Foreign-key target metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub table: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Filled from the mapping key by the normalizer when absent.
    #[serde(default)]
    pub name: Option<Name>,
    pub r#type: BaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<BaseType>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<serde_json::Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Reference>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub secure_input: bool,
    /// Lingo expression recomputed before each render (page state only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calc: Option<serde_json::Value>,
    /// Derived; recomputed by the normalizer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub type_id: String,
}

fn default_true() -> bool {
    true
}

impl Field {
    /// Minimal constructor used by tests and generated specs.
    pub fn new(snake: &str, base: BaseType) -> Result<Self, MappError> {
        Ok(Self {
            name: Some(Name::from_snake(snake)?),
            r#type: base,
            element_type: None,
            required: true,
            examples: Vec::new(),
            enum_values: None,
            references: None,
            secure: false,
            secure_input: false,
            calc: None,
            type_id: type_id(base, None, false),
        })
    }

    /// Snake-case name; empty until the normalizer has run.
    pub fn snake(&self) -> &str {
        self.name.as_ref().map_or("", |n| n.snake.as_str())
    }

    pub fn value_type(&self) -> Result<ValueType, MappError> {
        ValueType::resolve(self.r#type, self.element_type)
    }

    pub fn compute_type_id(&self) -> String {
        type_id(self.r#type, self.element_type, self.enum_values.is_some())
    }

    /// First declared example, coerced to the field type.
    pub fn example_value(&self) -> Result<Value, MappError> {
        let raw = self.examples.first().ok_or_else(|| MappError::InvalidField {
            field: self.snake().to_string(),
            message: "field declares no examples".to_string(),
        })?;
        Value::from_json(raw, &self.value_type()?, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let field: Field = serde_json::from_str(
            r#"{"type": "str", "examples": ["red"], "enum": ["red", "green"]}"#,
        )
        .unwrap();
        assert!(field.required);
        assert!(!field.secure);
        assert_eq!(field.compute_type_id(), "str_enum");
    }

    #[test]
    fn test_list_field_type() {
        let field: Field = serde_json::from_str(
            r#"{"type": "list", "element_type": "str", "examples": [["a"]]}"#,
        )
        .unwrap();
        assert_eq!(field.compute_type_id(), "list_str");
        assert_eq!(
            field.value_type().unwrap(),
            ValueType::List(Box::new(ValueType::Str))
        );
    }

    #[test]
    fn test_example_value_coerced() {
        let mut field = Field::new("count", BaseType::Int).unwrap();
        field.examples = vec![serde_json::json!("36")];
        assert_eq!(field.example_value().unwrap(), Value::Int(36));
    }
}
