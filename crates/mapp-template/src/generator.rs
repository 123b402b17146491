//! Template expansion.
//!
//! A handlebars engine with casing helpers (`snake`, `pascal`, `kebab`,
//! `camel`, `upper`) and `sql_type`, which selects a column type by
//! `type_id`. `generate` renders every template in the set against a
//! context built from the normalized spec and writes the files.

use std::path::{Path, PathBuf};

use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
};
use serde_json::{json, Value};

use mapp_core::{MappError, Name};
use mapp_spec::Spec;

use crate::templates::TemplateSet;

pub struct ProjectGenerator<'a> {
    handlebars: Handlebars<'a>,
    templates: TemplateSet,
}

impl<'a> ProjectGenerator<'a> {
    pub fn new(templates: TemplateSet) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);

        handlebars.register_helper("snake", Box::new(CasingHelper::Snake));
        handlebars.register_helper("pascal", Box::new(CasingHelper::Pascal));
        handlebars.register_helper("kebab", Box::new(CasingHelper::Kebab));
        handlebars.register_helper("camel", Box::new(CasingHelper::Camel));
        handlebars.register_helper("upper", Box::new(UpperHelper));
        handlebars.register_helper("sql_type", Box::new(SqlTypeHelper));

        for (name, template) in &templates.templates {
            let _ = handlebars.register_template_string(name, &template.template);
        }

        ProjectGenerator { handlebars, templates }
    }

    pub fn with_defaults() -> Result<Self, MappError> {
        Ok(Self::new(TemplateSet::default_set()?))
    }

    pub fn render(&self, template_name: &str, data: &Value) -> Result<String, MappError> {
        self.handlebars
            .render(template_name, data)
            .map_err(|e| MappError::ServerError(format!("render {template_name}: {e}")))
    }

    /// Expand every template against the spec and write the project
    /// scaffold plus a normalized-spec snapshot. Deterministic for a
    /// fixed normalized spec.
    pub fn generate(&self, spec: &Spec, out_dir: &Path) -> Result<Vec<PathBuf>, MappError> {
        std::fs::create_dir_all(out_dir)
            .map_err(|e| MappError::ServerError(format!("creating {}: {e}", out_dir.display())))?;

        let data = context(spec);
        let mut written = Vec::new();
        for name in self.templates.list_templates() {
            let Some(template) = self.templates.get(name) else { continue };
            let rendered = self.render(name, &data)?;
            let path = out_dir.join(&template.file);
            std::fs::write(&path, rendered)
                .map_err(|e| MappError::ServerError(format!("writing {}: {e}", path.display())))?;
            tracing::debug!(file = %path.display(), "generated");
            written.push(path);
        }

        let snapshot = out_dir.join("spec.normalized.yaml");
        let yaml = serde_yaml::to_string(spec)
            .map_err(|e| MappError::ServerError(format!("serializing spec: {e}")))?;
        std::fs::write(&snapshot, yaml)
            .map_err(|e| MappError::ServerError(format!("writing {}: {e}", snapshot.display())))?;
        written.push(snapshot);

        Ok(written)
    }
}

/// Flatten the spec into the shape the templates iterate over.
fn context(spec: &Spec) -> Value {
    let modules: Vec<Value> = spec
        .modules
        .iter()
        .map(|(module_name, module)| {
            let models: Vec<Value> = module
                .models
                .iter()
                .map(|(model_name, model)| {
                    let fields: Vec<Value> = model
                        .fields
                        .iter()
                        .map(|(field_name, field)| {
                            json!({
                                "name": field_name,
                                "type_id": field.type_id,
                                "required": field.required,
                            })
                        })
                        .collect();
                    let scalars: Vec<Value> = model
                        .fields
                        .iter()
                        .filter(|(_, f)| f.r#type != mapp_core::BaseType::List)
                        .map(|(field_name, field)| {
                            json!({"name": field_name, "type_id": field.type_id})
                        })
                        .collect();
                    let lists: Vec<Value> = model
                        .fields
                        .iter()
                        .filter(|(_, f)| f.r#type == mapp_core::BaseType::List)
                        .map(|(field_name, field)| {
                            json!({
                                "name": field_name,
                                "child_table": format!("{module_name}_{model_name}__{field_name}"),
                                "owner_column": format!("{model_name}_id"),
                                "element_type_id": field
                                    .element_type
                                    .map(|e| e.as_str())
                                    .unwrap_or("str"),
                            })
                        })
                        .collect();
                    json!({
                        "name": model_name,
                        "table": format!("{module_name}_{model_name}"),
                        "hidden": model.hidden,
                        "fields": fields,
                        "scalars": scalars,
                        "lists": lists,
                    })
                })
                .collect();
            let ops: Vec<Value> = module
                .ops
                .iter()
                .map(|(op_name, op)| {
                    let fields = |set: &mapp_core::OrderedMap<mapp_core::Field>| -> Vec<Value> {
                        set.iter()
                            .map(|(n, f)| json!({"name": n, "type_id": f.type_id}))
                            .collect()
                    };
                    json!({
                        "name": op_name,
                        "params": fields(&op.params),
                        "output": fields(&op.output),
                    })
                })
                .collect();
            json!({"name": module_name, "models": models, "ops": ops})
        })
        .collect();

    json!({
        "project": serde_json::to_value(&spec.project).unwrap_or(Value::Null),
        "modules": modules,
    })
}

// ============================================================================
// Custom Helpers
// ============================================================================

/// Re-case a lower label (`{{pascal project.name.lower_case}}`).
enum CasingHelper {
    Snake,
    Pascal,
    Kebab,
    Camel,
}

impl HelperDef for CasingHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let label = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
        let cased = match Name::derive(label) {
            Ok(name) => match self {
                Self::Snake => name.snake,
                Self::Pascal => name.pascal,
                Self::Kebab => name.kebab,
                Self::Camel => name.camel,
            },
            Err(_) => String::new(),
        };
        out.write(&cased)?;
        Ok(())
    }
}

/// Uppercase a string.
struct UpperHelper;

impl HelperDef for UpperHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let text = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
        out.write(&text.to_uppercase())?;
        Ok(())
    }
}

/// Column type selection by `type_id` (`{{sql_type type_id}}`).
struct SqlTypeHelper;

impl HelperDef for SqlTypeHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let type_id = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("str");
        let base = type_id.strip_suffix("_enum").unwrap_or(type_id);
        let sql = match base {
            "bool" | "int" => "INTEGER",
            "float" => "REAL",
            _ => "TEXT",
        };
        out.write(sql)?;
        Ok(())
    }
}
