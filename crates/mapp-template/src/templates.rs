//! Template loading and management.
//!
//! Templates ship as a YAML document of named handlebars strings; the
//! default set is embedded in the crate and can be replaced by a file on
//! disk with the same shape.

use std::collections::HashMap;

use serde::Deserialize;

use mapp_core::MappError;

/// Top-level templates file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSet {
    pub version: String,
    pub templates: HashMap<String, Template>,
}

/// A single template definition.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub description: String,
    /// Output file name relative to the generation root.
    pub file: String,
    pub template: String,
}

const DEFAULT_TEMPLATES: &str = include_str!("templates.yaml");

impl TemplateSet {
    /// The embedded default set.
    pub fn default_set() -> Result<Self, MappError> {
        Self::from_yaml(DEFAULT_TEMPLATES)
    }

    pub fn load(path: &str) -> Result<Self, MappError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MappError::ServerError(format!("reading templates {path}: {e}")))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, MappError> {
        serde_yaml::from_str(yaml).map_err(|e| MappError::InvalidField {
            field: "templates".to_string(),
            message: e.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn list_templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_parses() {
        let set = TemplateSet::default_set().unwrap();
        assert_eq!(set.version, "1.0");
        assert_eq!(set.list_templates(), vec!["readme", "routes", "schema"]);
    }

    #[test]
    fn test_custom_set() {
        let set = TemplateSet::from_yaml(
            r#"
version: "1.0"
templates:
  hello:
    description: Smoke template
    file: hello.txt
    template: "Hello, {{name}}!"
"#,
        )
        .unwrap();
        assert!(set.get("hello").is_some());
        assert_eq!(set.get("hello").unwrap().file, "hello.txt");
    }
}
