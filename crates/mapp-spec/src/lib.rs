//! MApp Spec: the specification pipeline.
//!
//! Load (JSON/YAML, version-tagged) → normalize (idempotent canonical
//! form) → freeze. Everything downstream (storage layout, HTTP routes,
//! CLI verbs, code generation) is derived from the normalized spec.

pub mod builtin;
pub mod loader;
pub mod model;
pub mod normalizer;

pub use builtin::builtin_modules;
pub use loader::{load_spec, load_spec_value, BUNDLED_SPECS};
pub use model::{ClientConfig, Model, ModelAuth, Module, Op, Project, ServerConfig, Spec};
pub use normalizer::{normalize, resolved_auth};

use mapp_core::MappError;
use std::path::Path;

/// Load and normalize in one step; the common entry point for binaries.
pub fn load_normalized(path: &Path, try_builtin_examples: bool) -> Result<Spec, MappError> {
    normalize(load_spec(path, try_builtin_examples)?)
}
