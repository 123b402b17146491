//! Built-in modules merged into every project spec.
//!
//! The auth module ships as an embedded `builtin-beta-1` document: a user
//! model, a hidden session model, and the register/login/logout ops whose
//! bodies call the `auth.*` host functions.

use serde::Deserialize;

use mapp_core::version::{self, VersionTag, BUILTIN};
use mapp_core::{MappError, OrderedMap};

use crate::model::Module;

const BUILTIN_YAML: &str = include_str!("builtin.yaml");

#[derive(Debug, Deserialize)]
struct BuiltinDoc {
    lingo: VersionTag,
    modules: OrderedMap<Module>,
}

/// Parse the embedded built-in module document.
pub fn builtin_modules() -> Result<OrderedMap<Module>, MappError> {
    let doc: BuiltinDoc = serde_yaml::from_str(BUILTIN_YAML).map_err(|e| {
        MappError::ServerError(format!("embedded builtin modules are malformed: {e}"))
    })?;
    version::check(&doc.lingo.version, BUILTIN)?;
    Ok(doc.modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_document_parses() {
        let modules = builtin_modules().unwrap();
        let auth = modules.get("auth").expect("auth module");
        assert!(auth.models.contains_key("user"));
        assert!(auth.models.contains_key("session"));
        assert!(auth.ops.contains_key("login"));
        assert!(auth.ops.contains_key("register"));
        assert!(auth.ops.contains_key("logout"));
    }

    #[test]
    fn test_session_model_is_hidden() {
        let modules = builtin_modules().unwrap();
        let session = modules.get("auth").unwrap().models.get("session").unwrap();
        assert!(session.hidden);
    }
}
