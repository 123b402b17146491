//! Spec file loading.
//!
//! Dispatches on the file suffix, optionally retries missing paths against
//! the bundled demo specs, and enforces the `generator-beta-1` version tag
//! before handing the tree to the normalizer.

use std::path::Path;

use serde::Deserialize;

use mapp_core::version::{self, VersionTag, GENERATOR};
use mapp_core::MappError;

use crate::model::Spec;

/// Demo specs compiled into the binary, keyed by file stem.
pub const BUNDLED_SPECS: &[(&str, &str)] = &[
    ("todo", include_str!("../specs/todo.yaml")),
    ("blog", include_str!("../specs/blog.yaml")),
];

#[derive(Deserialize)]
struct VersionProbe {
    lingo: VersionTag,
}

/// Load a project spec from disk. When the path is missing and
/// `try_builtin_examples` is set, the file stem is retried against the
/// bundled demo specs.
pub fn load_spec(path: &Path, try_builtin_examples: bool) -> Result<Spec, MappError> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_spec(&text, is_json(path)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if try_builtin_examples {
                if let Some(text) = bundled_spec(path) {
                    tracing::debug!(path = %path.display(), "spec not on disk, using bundled example");
                    return parse_spec(text, false);
                }
            }
            Err(MappError::SpecFileNotFound(path.display().to_string()))
        }
        Err(err) => Err(MappError::ServerError(format!(
            "reading {}: {err}",
            path.display()
        ))),
    }
}

/// Load from an already-parsed tree (HTTP adapters, tests).
pub fn load_spec_value(tree: serde_json::Value) -> Result<Spec, MappError> {
    let probe: VersionProbe = serde_json::from_value(tree.clone())
        .map_err(|e| invalid_spec(&e.to_string()))?;
    version::check(&probe.lingo.version, GENERATOR)?;
    serde_json::from_value(tree).map_err(|e| invalid_spec(&e.to_string()))
}

fn parse_spec(text: &str, json: bool) -> Result<Spec, MappError> {
    let probe: VersionProbe = decode(text, json)?;
    version::check(&probe.lingo.version, GENERATOR)?;
    decode(text, json)
}

fn decode<T: serde::de::DeserializeOwned>(text: &str, json: bool) -> Result<T, MappError> {
    if json {
        serde_json::from_str(text).map_err(|e| invalid_spec(&e.to_string()))
    } else {
        serde_yaml::from_str(text).map_err(|e| invalid_spec(&e.to_string()))
    }
}

fn is_json(path: &Path) -> Result<bool, MappError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(true),
        Some("yml") | Some("yaml") => Ok(false),
        other => Err(invalid_spec(&format!(
            "unsupported spec suffix {:?}; expected .json, .yml or .yaml",
            other.unwrap_or("")
        ))),
    }
}

fn bundled_spec(path: &Path) -> Option<&'static str> {
    let stem = path.file_stem()?.to_str()?;
    BUNDLED_SPECS
        .iter()
        .find(|(name, _)| *name == stem)
        .map(|(_, text)| *text)
}

fn invalid_spec(message: &str) -> MappError {
    MappError::InvalidField {
        field: "spec".to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_bundled_retry() {
        let spec = load_spec(&PathBuf::from("/nowhere/todo.yaml"), true).unwrap();
        assert_eq!(spec.project.name.snake, "todo_app");
    }

    #[test]
    fn test_missing_without_retry() {
        let err = load_spec(&PathBuf::from("/nowhere/todo.yaml"), false).unwrap_err();
        assert_eq!(err.code(), "SPEC_FILE_NOT_FOUND");
    }

    #[test]
    fn test_version_tag_enforced() {
        let tree = serde_json::json!({
            "lingo": {"version": "generator-beta-2"},
            "project": {"name": "x"},
        });
        let err = load_spec_value(tree).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_VERSION");
    }

    #[test]
    fn test_json_suffix_dispatch() {
        assert!(is_json(&PathBuf::from("a/spec.json")).unwrap());
        assert!(!is_json(&PathBuf::from("a/spec.yml")).unwrap());
        assert!(is_json(&PathBuf::from("spec.toml")).is_err());
    }
}
