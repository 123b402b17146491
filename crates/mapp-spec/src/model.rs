//! The spec data model: project, modules, models, ops.
//!
//! Created by the loader, mutated only by the normalizer, then frozen for
//! the life of the process.

use serde::{Deserialize, Serialize};

use mapp_core::{Field, MappError, Name, OrderedMap, Record};
use mapp_core::validate::{example_record, random_record};
use mapp_core::version::VersionTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub lingo: VersionTag,
    pub project: Project,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub modules: OrderedMap<Module>,
}

impl Spec {
    pub fn module(&self, snake: &str) -> Option<&Module> {
        self.modules.get(snake)
    }

    /// Locate an op by bare or `module.op` qualified name.
    pub fn find_op<'a>(&'a self, name: &'a str) -> Option<(&'a str, &'a Module, &'a Op)> {
        if let Some((module_name, op_name)) = name.split_once('.') {
            let module = self.modules.get(module_name)?;
            return module.ops.get(op_name).map(|op| (module_name, module, op));
        }
        for (module_name, module) in self.modules.iter() {
            if let Some(op) = module.ops.get(name) {
                return Some((module_name, module, op));
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: Name,
    #[serde(default = "default_true")]
    pub use_builtin_modules: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub name: Option<Name>,
    #[serde(default)]
    pub models: OrderedMap<Model>,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub ops: OrderedMap<Op>,
}

impl Module {
    pub fn model(&self, snake: &str) -> Option<&Model> {
        self.models.get(snake)
    }

    pub fn op(&self, snake: &str) -> Option<&Op> {
        self.ops.get(snake)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub name: Option<Name>,
    #[serde(default)]
    pub fields: OrderedMap<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ModelAuth>,
    #[serde(default)]
    pub hidden: bool,

    // Derived projections, all snake names sorted; recomputed by the
    // normalizer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_list_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorted_fields: Vec<String>,
    #[serde(default)]
    pub total_fields: usize,
}

impl Model {
    pub fn field(&self, snake: &str) -> Option<&Field> {
        self.fields.get(snake)
    }

    /// A valid instance built from field examples.
    pub fn example(&self) -> Result<Record, MappError> {
        example_record(&self.fields)
    }

    /// A valid instance with randomized values.
    pub fn random(&self, rng: &mut rand::rngs::StdRng) -> Result<Record, MappError> {
        random_record(&self.fields, rng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAuth {
    #[serde(default)]
    pub require_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_models_per_user: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    #[serde(default)]
    pub name: Option<Name>,
    #[serde(default)]
    pub params: OrderedMap<Field>,
    #[serde(default)]
    pub output: OrderedMap<Field>,
    /// Lingo expression tree; parsed once by the operation runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<serde_json::Value>,
    /// Legacy body form, rejected at runtime prep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}
