//! The canonical type system.
//!
//! `BaseType` is what spec authors write (`type: str`, `type: list`).
//! `ValueType` is the resolved runtime type the evaluator and validators
//! dispatch on; `Any` only appears in host-function descriptors, where
//! argument coercion is skipped.

use serde::{Deserialize, Serialize};

use crate::error::MappError;

/// Closed set of spec-level types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    Bool,
    Int,
    Float,
    Str,
    Datetime,
    ForeignKey,
    List,
    Struct,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Datetime => "datetime",
            Self::ForeignKey => "foreign_key",
            Self::List => "list",
            Self::Struct => "struct",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, MappError> {
        match raw {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "str" => Ok(Self::Str),
            "datetime" => Ok(Self::Datetime),
            "foreign_key" => Ok(Self::ForeignKey),
            "list" => Ok(Self::List),
            "struct" => Ok(Self::Struct),
            other => Err(MappError::UnsupportedType(other.to_string())),
        }
    }

    /// True for types a list element or scalar column may carry.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::List | Self::Struct)
    }
}

/// Resolved runtime type.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Datetime,
    ForeignKey,
    List(Box<ValueType>),
    Struct,
    /// Host-descriptor wildcard; never a declared field type.
    Any,
}

impl ValueType {
    pub fn name(&self) -> String {
        match self {
            Self::Bool => "bool".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::Str => "str".to_string(),
            Self::Datetime => "datetime".to_string(),
            Self::ForeignKey => "foreign_key".to_string(),
            Self::List(element) => format!("list<{}>", element.name()),
            Self::Struct => "struct".to_string(),
            Self::Any => "any".to_string(),
        }
    }

    /// Resolve from a spec base type plus optional list element type.
    pub fn resolve(base: BaseType, element: Option<BaseType>) -> Result<Self, MappError> {
        match base {
            BaseType::Bool => Ok(Self::Bool),
            BaseType::Int => Ok(Self::Int),
            BaseType::Float => Ok(Self::Float),
            BaseType::Str => Ok(Self::Str),
            BaseType::Datetime => Ok(Self::Datetime),
            BaseType::ForeignKey => Ok(Self::ForeignKey),
            BaseType::Struct => Ok(Self::Struct),
            BaseType::List => {
                let element = element
                    .ok_or_else(|| MappError::UnsupportedType("list without element_type".to_string()))?;
                if !element.is_primitive() {
                    return Err(MappError::UnsupportedType(format!(
                        "list<{}> is not supported",
                        element.as_str()
                    )));
                }
                Ok(Self::List(Box::new(Self::resolve(element, None)?)))
            }
        }
    }

    /// Parse a type name as written in `value` literals: a base type name
    /// or `list<element>`.
    pub fn parse(raw: &str) -> Result<Self, MappError> {
        if let Some(inner) = raw.strip_prefix("list<").and_then(|r| r.strip_suffix('>')) {
            let element = BaseType::parse(inner)?;
            return Self::resolve(BaseType::List, Some(element));
        }
        Self::resolve(BaseType::parse(raw)?, None)
    }
}

/// Derived type id: base type, plus `_<element>` for lists, plus `_enum`
/// when an enum is declared. Drives macro selection in the generator and
/// value handling in the runtime.
pub fn type_id(base: BaseType, element: Option<BaseType>, has_enum: bool) -> String {
    let mut id = base.as_str().to_string();
    if base == BaseType::List {
        if let Some(element) = element {
            id.push('_');
            id.push_str(element.as_str());
        }
    }
    if has_enum {
        id.push_str("_enum");
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_shapes() {
        assert_eq!(type_id(BaseType::Str, None, false), "str");
        assert_eq!(type_id(BaseType::Str, None, true), "str_enum");
        assert_eq!(type_id(BaseType::List, Some(BaseType::Int), false), "list_int");
        assert_eq!(type_id(BaseType::List, Some(BaseType::Str), true), "list_str_enum");
    }

    #[test]
    fn test_resolve_list_requires_element() {
        assert!(ValueType::resolve(BaseType::List, None).is_err());
        assert!(ValueType::resolve(BaseType::List, Some(BaseType::List)).is_err());
        assert_eq!(
            ValueType::resolve(BaseType::List, Some(BaseType::Str)).unwrap(),
            ValueType::List(Box::new(ValueType::Str))
        );
    }

    #[test]
    fn test_parse_value_type() {
        assert_eq!(ValueType::parse("int").unwrap(), ValueType::Int);
        assert_eq!(
            ValueType::parse("list<float>").unwrap(),
            ValueType::List(Box::new(ValueType::Float))
        );
        assert!(ValueType::parse("blob").is_err());
    }

    #[test]
    fn test_base_type_serde_names() {
        let ty: BaseType = serde_json::from_str("\"foreign_key\"").unwrap();
        assert_eq!(ty, BaseType::ForeignKey);
        assert_eq!(serde_json::to_string(&BaseType::Datetime).unwrap(), "\"datetime\"");
    }
}
