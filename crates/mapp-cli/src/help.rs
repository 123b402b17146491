//! Contextual help derived from the loaded spec.

use mapp_core::record_to_json;
use mapp_spec::{Model, Module, Op, Spec};

pub fn project(spec: &Spec) {
    println!("{} modules:", spec.project.name.lower);
    for (name, module) in spec.modules.iter() {
        let models: Vec<&str> =
            module.models.iter().filter(|(_, m)| !m.hidden).map(|(k, _)| k).collect();
        let ops: Vec<&str> = module.ops.keys().collect();
        println!("  {name}  models: [{}]  ops: [{}]", models.join(", "), ops.join(", "));
    }
    println!();
    println!("usage: mapp <module> <model|op> <db|http> <action> ['<json>']");
    println!("       model actions: create read update delete list create-table");
    println!("       op actions:    run http");
    println!("       flags:         --offset N --limit N --spec FILE");
}

pub fn module(name: &str, module: &Module) {
    println!("module {name}");
    for (model_name, model) in module.models.iter() {
        if model.hidden {
            continue;
        }
        println!("  model {model_name} ({} fields)", model.total_fields);
    }
    for (op_name, op) in module.ops.iter() {
        let params: Vec<&str> = op.params.keys().collect();
        println!("  op {op_name}({})", params.join(", "));
    }
    println!();
    println!("usage: mapp {name} <model|op> <db|http> <action> ['<json>']");
}

pub fn model(module_name: &str, model_name: &str, model: &Model) {
    println!("model {module_name}.{model_name}");
    for (field_name, field) in model.fields.iter() {
        let required = if field.required { "" } else { " (optional)" };
        println!("  {field_name}: {}{}", field.type_id, required);
    }
    if let Ok(example) = model.example() {
        println!();
        println!("example payload:");
        println!("  '{}'", record_to_json(&example));
    }
    println!();
    println!(
        "usage: mapp {module_name} {model_name} <db|http> <create|read|update|delete|list|create-table> ['<json>']"
    );
}

pub fn op(module_name: &str, op_name: &str, op: &Op) {
    println!("op {module_name}.{op_name}");
    for (param_name, field) in op.params.iter() {
        println!("  param {param_name}: {}", field.type_id);
    }
    for (output_name, field) in op.output.iter() {
        println!("  output {output_name}: {}", field.type_id);
    }
    if let Ok(example) = mapp_core::example_record(&op.params) {
        println!();
        println!("example payload:");
        println!("  '{}'", record_to_json(&example));
    }
    println!();
    println!("usage: mapp {module_name} {op_name} <run|http> ['<json>']");
}
