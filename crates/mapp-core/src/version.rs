//! Spec family version tags.

use serde::{Deserialize, Serialize};

use crate::error::MappError;

pub const GENERATOR: &str = "generator-beta-1";
pub const PAGE: &str = "page-beta-1";
pub const SCRIPT: &str = "script-beta-1";
pub const BUILTIN: &str = "builtin-beta-1";

/// The required top-level `lingo:` block of every spec file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTag {
    pub version: String,
}

pub fn check(found: &str, expected: &str) -> Result<(), MappError> {
    if found == expected {
        Ok(())
    } else {
        Err(MappError::UnsupportedVersion(format!(
            "expected {expected}, found {found}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_check() {
        assert!(check("page-beta-1", PAGE).is_ok());
        let err = check("page-beta-2", PAGE).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_VERSION");
    }
}
