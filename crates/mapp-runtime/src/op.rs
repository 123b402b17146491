//! The operation runtime.
//!
//! At process start every op in the spec is prepared once: its `func`
//! tree is parsed, its param/output field sets are captured, and legacy
//! body forms are rejected. A prepared op runs at most once per call:
//! validate params → fresh `LingoApp` → evaluate → materialize and
//! validate output. Failures short-circuit with no partial output.

use std::collections::HashMap;
use std::sync::Arc;

use lingo::{parse, Evaluator, HostRegistry, LingoApp, Node, OpRunner, ProgramSpec};
use mapp_core::validate::{check_record, validate_record};
use mapp_core::{record_to_json, Ctx, Field, MappError, OrderedMap, Record, Value};
use mapp_spec::Spec;

#[derive(Clone)]
pub struct PreparedOp {
    pub module: String,
    pub name: String,
    pub params: OrderedMap<Field>,
    pub output: OrderedMap<Field>,
    func: Node,
}

pub struct OpRuntime {
    inner: Arc<RuntimeInner>,
}

impl std::fmt::Debug for OpRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpRuntime")
            .field("ops", &self.inner.ops.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct RuntimeInner {
    ops: HashMap<String, PreparedOp>,
    registry: Arc<HostRegistry>,
}

impl OpRuntime {
    /// Prepare every op in the spec. Fails fast on deprecated op forms.
    pub fn prepare(spec: &Spec, registry: Arc<HostRegistry>) -> Result<Self, MappError> {
        let mut ops = HashMap::new();
        for (module_key, module) in spec.modules.iter() {
            for (op_key, op) in module.ops.iter() {
                let qualified = format!("{module_key}.{op_key}");
                if op.python.is_some() || op.func.is_none() {
                    return Err(MappError::DeprecatedOpSpec(qualified));
                }
                let func = op
                    .func
                    .as_ref()
                    .map(parse)
                    .transpose()?
                    .ok_or_else(|| MappError::DeprecatedOpSpec(qualified.clone()))?;
                ops.insert(
                    qualified,
                    PreparedOp {
                        module: module_key.to_string(),
                        name: op_key.to_string(),
                        params: op.params.clone(),
                        output: op.output.clone(),
                        func,
                    },
                );
            }
        }
        Ok(Self { inner: Arc::new(RuntimeInner { ops, registry }) })
    }

    pub fn get(&self, module: &str, op: &str) -> Option<&PreparedOp> {
        self.inner.ops.get(&format!("{module}.{op}"))
    }

    /// Run an op from a raw JSON params body. The entry point shared by
    /// HTTP, CLI and local invocation.
    pub fn run(
        &self,
        ctx: &Ctx,
        module: &str,
        op: &str,
        params_body: &serde_json::Value,
    ) -> Result<Record, MappError> {
        let prepared = self
            .get(module, op)
            .ok_or_else(|| MappError::NotFound(format!("op {module}.{op}")))?
            .clone();
        let params = check_record(
            &format!("{module}.{op} params"),
            &prepared.params,
            params_body,
        )?;
        exec(&self.inner, &prepared, ctx, params)
    }

    /// Run from a JSON body and serialize the output, envelope-style.
    pub fn run_json(
        &self,
        ctx: &Ctx,
        module: &str,
        op: &str,
        params_body: &serde_json::Value,
    ) -> Result<serde_json::Value, MappError> {
        Ok(record_to_json(&self.run(ctx, module, op, params_body)?))
    }

    /// Handle for `op` nodes inside Lingo programs.
    pub fn runner(&self) -> Arc<dyn OpRunner> {
        Arc::new(RunnerHandle(self.inner.clone()))
    }
}

fn exec(
    inner: &Arc<RuntimeInner>,
    prepared: &PreparedOp,
    ctx: &Ctx,
    params: Record,
) -> Result<Record, MappError> {
    validate_record(
        &format!("{}.{} params", prepared.module, prepared.name),
        &prepared.params,
        &params,
    )?;

    // Fresh per-invocation app: args are the validated params, state and
    // ops start empty.
    let mut app = LingoApp::new(ProgramSpec::with_args(prepared.params.clone()));
    app.runner = Some(Arc::new(RunnerHandle(inner.clone())));
    app.bind_args(params)?;

    let result = Evaluator::new(&inner.registry).eval(&prepared.func, &mut app, ctx)?;
    let output = materialize(prepared, result)?;
    validate_record(
        &format!("{}.{} output", prepared.module, prepared.name),
        &prepared.output,
        &output,
    )?;
    Ok(output)
}

/// Shape the evaluated value into an instance of the op's output record.
fn materialize(prepared: &PreparedOp, result: Value) -> Result<Record, MappError> {
    if prepared.output.is_empty() {
        return Ok(Record::new());
    }
    match result {
        Value::Struct(map) => {
            let mut output = Record::new();
            for (key, field) in prepared.output.iter() {
                if let Some(value) = map.get(key) {
                    output.insert(key.to_string(), value.coerce(&field.value_type()?)?);
                }
            }
            Ok(output)
        }
        primitive if prepared.output.len() == 1 => {
            let mut output = Record::new();
            if let Some((key, field)) = prepared.output.iter().next() {
                output.insert(key.to_string(), primitive.coerce(&field.value_type()?)?);
            }
            Ok(output)
        }
        other => Err(MappError::TypeError(format!(
            "op {}.{} returned {}, expected a struct with {} fields",
            prepared.module,
            prepared.name,
            other.type_name(),
            prepared.output.len()
        ))),
    }
}

struct RunnerHandle(Arc<RuntimeInner>);

impl OpRunner for RunnerHandle {
    fn run(&self, name: &str, params: Record, ctx: &Ctx) -> Result<Value, MappError> {
        let prepared = self
            .0
            .resolve(name)
            .ok_or_else(|| MappError::UnknownOp(format!("op {name}")))?
            .clone();
        let output = exec(&self.0, &prepared, ctx, params)?;
        Ok(Value::Struct(output.into_iter().collect()))
    }
}

impl RuntimeInner {
    /// Resolve a bare or `module.op` qualified name.
    fn resolve(&self, name: &str) -> Option<&PreparedOp> {
        if let Some(prepared) = self.ops.get(name) {
            return Some(prepared);
        }
        self.ops.values().find(|op| op.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapp_spec::{load_spec_value, normalize};
    use serde_json::json;

    fn runtime() -> OpRuntime {
        let tree = json!({
            "lingo": {"version": "generator-beta-1"},
            "project": {"name": "ops test", "use_builtin_modules": false},
            "modules": {"todo": {"models": {"item": {"fields": {
                "label": {"type": "str", "examples": ["x"]},
            }}}, "ops": {"stats": {
                "params": {
                    "a": {"type": "int", "examples": [1]},
                    "b": {"type": "int", "examples": [2]},
                },
                "output": {"total": {"type": "int", "examples": [3]}},
                "func": {"call": {"func": "math.add", "args": {
                    "a": {"args": {"a": {}}},
                    "b": {"args": {"b": {}}},
                }}},
            }}}}
        });
        let spec = normalize(load_spec_value(tree).unwrap()).unwrap();
        OpRuntime::prepare(&spec, Arc::new(HostRegistry::standard())).unwrap()
    }

    #[test]
    fn test_run_validates_and_wraps_output() {
        let runtime = runtime();
        let out = runtime
            .run(&Ctx::new(), "todo", "stats", &json!({"a": 1, "b": 2}))
            .unwrap();
        assert_eq!(out.get("total"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_bad_params_fail_before_evaluation() {
        let runtime = runtime();
        let err = runtime
            .run(&Ctx::new(), "todo", "stats", &json!({"a": "nope", "b": 2}))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_output_satisfies_output_schema() {
        let runtime = runtime();
        let prepared = runtime.get("todo", "stats").unwrap().clone();
        let out = runtime
            .run(&Ctx::new(), "todo", "stats", &json!({"a": 20, "b": 22}))
            .unwrap();
        validate_record("stats output", &prepared.output, &out).unwrap();
    }

    #[test]
    fn test_deprecated_python_form_rejected() {
        let tree = json!({
            "lingo": {"version": "generator-beta-1"},
            "project": {"name": "legacy", "use_builtin_modules": false},
            "modules": {"m": {"models": {"x": {"fields": {
                "label": {"type": "str", "examples": ["x"]},
            }}}, "ops": {"old": {
                "params": {},
                "output": {},
                "python": "def run(): pass",
            }}}}
        });
        let spec = normalize(load_spec_value(tree).unwrap()).unwrap();
        let err = OpRuntime::prepare(&spec, Arc::new(HostRegistry::standard())).unwrap_err();
        assert_eq!(err.code(), "DEPRECATED_OP_SPEC");
    }

    #[test]
    fn test_unknown_op_is_not_found() {
        let runtime = runtime();
        let err = runtime.run(&Ctx::new(), "todo", "nope", &json!({})).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
