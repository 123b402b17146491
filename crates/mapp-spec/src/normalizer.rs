//! Spec normalization.
//!
//! Promotes a user-written spec into canonical form. Idempotent by
//! construction: every step either fills a missing value or recomputes a
//! pure derivation, so `normalize(normalize(s)) == normalize(s)`.

use mapp_core::{Field, MappError, Name, Reference};

use crate::builtin::builtin_modules;
use crate::model::{Model, ModelAuth, Module, Op, Spec};

/// Normalize a loaded spec. Steps run in a fixed order:
/// 1. project defaults
/// 2. built-in module merge (user-defined wins on the same key)
/// 3. name and flag defaults on every module/model/field/op
/// 4. derived field data: `type_id`, partitions, `total_fields`
/// 5. reserved `user_id` and auth constraints
/// 6. duplicate-name detection within each module
pub fn normalize(mut spec: Spec) -> Result<Spec, MappError> {
    if spec.project.use_builtin_modules {
        for (key, module) in builtin_modules()?.iter() {
            if !spec.modules.contains_key(key) {
                spec.modules.insert(key.to_string(), module.clone());
            }
        }
    }

    let use_builtins = spec.project.use_builtin_modules;
    for (module_key, module) in spec.modules.iter_mut() {
        let module_key = module_key.to_string();
        normalize_module(&module_key, module, use_builtins)?;
    }
    Ok(spec)
}

fn normalize_module(key: &str, module: &mut Module, use_builtins: bool) -> Result<(), MappError> {
    fill_name(&mut module.name, key)?;

    for (model_key, model) in module.models.iter_mut() {
        let model_key = model_key.to_string();
        normalize_model(key, &model_key, model, use_builtins)?;
    }
    for (op_key, op) in module.ops.iter_mut() {
        let op_key = op_key.to_string();
        normalize_op(&op_key, op)?;
    }

    // Model and op names share one namespace per module.
    let mut seen: Vec<String> = Vec::new();
    for name in module.models.keys().chain(module.ops.keys()) {
        if seen.iter().any(|s| s == name) {
            return Err(MappError::DuplicateName {
                module: key.to_string(),
                name: name.to_string(),
            });
        }
        seen.push(name.to_string());
    }
    Ok(())
}

fn normalize_model(
    module_key: &str,
    key: &str,
    model: &mut Model,
    use_builtins: bool,
) -> Result<(), MappError> {
    fill_name(&mut model.name, key)?;

    if model.fields.is_empty() {
        return Err(MappError::EmptyModel(format!("{module_key}.{key}")));
    }
    for (field_key, field) in model.fields.iter_mut() {
        let field_key = field_key.to_string();
        normalize_field(&field_key, field)?;
    }

    // Derived projections, all sorted by snake name.
    let mut non_list = Vec::new();
    let mut lists = Vec::new();
    let mut enums = Vec::new();
    let mut all = Vec::new();
    for field in model.fields.values() {
        let snake = field.snake().to_string();
        if field.r#type == mapp_core::BaseType::List {
            lists.push(snake.clone());
        } else {
            non_list.push(snake.clone());
        }
        if field.enum_values.is_some() {
            enums.push(snake.clone());
        }
        all.push(snake);
    }
    non_list.sort();
    lists.sort();
    enums.sort();
    all.sort();
    model.total_fields = all.len();
    model.non_list_fields = non_list;
    model.list_fields = lists;
    model.enum_fields = enums;
    model.sorted_fields = all;

    check_user_id(module_key, key, model)?;

    if model.auth.is_some() && !use_builtins {
        return Err(MappError::InvalidField {
            field: format!("{module_key}.{key}.auth"),
            message: "auth requires use_builtin_modules".to_string(),
        });
    }
    if let Some(auth) = &model.auth {
        // A cap of zero can never be satisfied.
        if auth.max_models_per_user == Some(0) {
            return Err(MappError::InvalidField {
                field: format!("{module_key}.{key}.auth.max_models_per_user"),
                message: "must be at least 1 when set".to_string(),
            });
        }
    }
    Ok(())
}

fn normalize_op(key: &str, op: &mut Op) -> Result<(), MappError> {
    fill_name(&mut op.name, key)?;
    for (field_key, field) in op.params.iter_mut() {
        let field_key = field_key.to_string();
        normalize_field(&field_key, field)?;
    }
    for (field_key, field) in op.output.iter_mut() {
        let field_key = field_key.to_string();
        normalize_field(&field_key, field)?;
    }
    Ok(())
}

fn normalize_field(key: &str, field: &mut Field) -> Result<(), MappError> {
    if field.name.is_none() {
        field.name = Some(Name::from_snake(key)?);
    }
    // Resolving the value type validates list element constraints.
    field.value_type().map_err(|e| MappError::InvalidField {
        field: key.to_string(),
        message: e.to_string(),
    })?;
    if field.examples.is_empty() {
        return Err(MappError::InvalidField {
            field: key.to_string(),
            message: "at least one example is required".to_string(),
        });
    }
    if field.enum_values.is_some() && field.r#type != mapp_core::BaseType::Str {
        return Err(MappError::InvalidField {
            field: key.to_string(),
            message: "enum is only supported on str fields".to_string(),
        });
    }
    field.type_id = field.compute_type_id();
    Ok(())
}

fn check_user_id(module_key: &str, model_key: &str, model: &mut Model) -> Result<(), MappError> {
    let Some(field) = model.fields.get_mut("user_id") else {
        return Ok(());
    };
    if field.r#type != mapp_core::BaseType::ForeignKey {
        return Err(MappError::InvalidField {
            field: format!("{module_key}.{model_key}.user_id"),
            message: "user_id is reserved and must be a foreign_key".to_string(),
        });
    }
    match &field.references {
        None => {
            field.references = Some(Reference {
                table: "user".to_string(),
                field: "id".to_string(),
            });
        }
        Some(r) if r.table == "user" && r.field == "id" => {}
        Some(r) => {
            return Err(MappError::InvalidField {
                field: format!("{module_key}.{model_key}.user_id"),
                message: format!("user_id must reference user.id, not {}.{}", r.table, r.field),
            });
        }
    }
    Ok(())
}

/// Resolved auth policy for a model (defaults applied).
pub fn resolved_auth(model: &Model) -> ModelAuth {
    model.auth.clone().unwrap_or(ModelAuth {
        require_login: false,
        max_models_per_user: None,
    })
}

fn fill_name(slot: &mut Option<Name>, key: &str) -> Result<(), MappError> {
    if slot.is_none() {
        *slot = Some(Name::from_snake(key)?);
    }
    Ok(())
}
