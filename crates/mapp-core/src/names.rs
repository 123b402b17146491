//! Canonical name derivation.
//!
//! Every spec entity carries one label written in `lower case` words; all
//! other casings are pure functions of it. Authors may pre-supply casings;
//! only the missing ones are derived.

use serde::{Deserialize, Serialize};

use crate::error::MappError;

/// The five casings of a spec label. `lower` split on single ASCII spaces
/// is the ground truth for the derived forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NameRepr")]
pub struct Name {
    #[serde(rename = "lower_case")]
    pub lower: String,
    #[serde(rename = "snake_case")]
    pub snake: String,
    #[serde(rename = "pascal_case")]
    pub pascal: String,
    #[serde(rename = "kebab_case")]
    pub kebab: String,
    #[serde(rename = "camel_case")]
    pub camel: String,
}

impl Name {
    /// Derive all casings from a `lower case` label.
    pub fn derive(lower: &str) -> Result<Self, MappError> {
        let parts: Vec<&str> = lower.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(MappError::InvalidField {
                field: "name".to_string(),
                message: "label is empty".to_string(),
            });
        }
        let lower = parts.join(" ");
        let pascal: String = parts.iter().map(|p| capitalize(p)).collect();
        Ok(Self {
            snake: parts.join("_"),
            kebab: parts.join("-"),
            camel: decapitalize(&pascal),
            pascal,
            lower,
        })
    }

    /// Derive from a `snake_case` key (mapping keys in spec files).
    pub fn from_snake(snake: &str) -> Result<Self, MappError> {
        Self::derive(&snake.replace('_', " "))
    }
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn decapitalize(pascal: &str) -> String {
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Accepted wire shapes: a bare label string, or a map with any subset of
/// pre-supplied casings. Missing casings are filled from `lower_case`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NameRepr {
    Label(String),
    Cased {
        lower_case: String,
        #[serde(default)]
        snake_case: Option<String>,
        #[serde(default)]
        pascal_case: Option<String>,
        #[serde(default)]
        kebab_case: Option<String>,
        #[serde(default)]
        camel_case: Option<String>,
    },
}

impl TryFrom<NameRepr> for Name {
    type Error = MappError;

    fn try_from(repr: NameRepr) -> Result<Self, Self::Error> {
        match repr {
            NameRepr::Label(label) => Name::derive(&label),
            NameRepr::Cased { lower_case, snake_case, pascal_case, kebab_case, camel_case } => {
                let derived = Name::derive(&lower_case)?;
                Ok(Name {
                    lower: derived.lower,
                    snake: snake_case.unwrap_or(derived.snake),
                    pascal: pascal_case.unwrap_or(derived.pascal),
                    kebab: kebab_case.unwrap_or(derived.kebab),
                    camel: camel_case.unwrap_or(derived.camel),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_derive_casings() {
        let name = Name::derive("todo item").unwrap();
        assert_eq!(name.lower, "todo item");
        assert_eq!(name.snake, "todo_item");
        assert_eq!(name.kebab, "todo-item");
        assert_eq!(name.pascal, "TodoItem");
        assert_eq!(name.camel, "todoItem");
    }

    #[test]
    fn test_single_word() {
        let name = Name::derive("user").unwrap();
        assert_eq!(name.snake, "user");
        assert_eq!(name.pascal, "User");
        assert_eq!(name.camel, "user");
    }

    #[test]
    fn test_empty_label_fails() {
        assert!(Name::derive("").is_err());
        assert!(Name::derive("   ").is_err());
    }

    #[test]
    fn test_from_snake() {
        let name = Name::from_snake("todo_item").unwrap();
        assert_eq!(name.lower, "todo item");
        assert_eq!(name.kebab, "todo-item");
    }

    #[test]
    fn test_deserialize_bare_label() {
        let name: Name = serde_json::from_str("\"todo item\"").unwrap();
        assert_eq!(name.pascal, "TodoItem");
    }

    #[test]
    fn test_deserialize_author_supplied_casing_wins() {
        let name: Name = serde_json::from_str(
            r#"{"lower_case": "todo item", "pascal_case": "TODOItem"}"#,
        )
        .unwrap();
        assert_eq!(name.pascal, "TODOItem");
        assert_eq!(name.snake, "todo_item");
    }

    #[test]
    fn test_roundtrip_is_identity() {
        let name = Name::derive("todo item").unwrap();
        let text = serde_json::to_string(&name).unwrap();
        let back: Name = serde_json::from_str(&text).unwrap();
        assert_eq!(name, back);
    }
}
