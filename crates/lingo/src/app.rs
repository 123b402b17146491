//! Runtime state for one Lingo program invocation.
//!
//! A `LingoApp` is strictly per-invocation: `state` and `args` are never
//! shared across concurrent calls. The normalized program spec and the
//! host registry are the only shared, read-only pieces.

use std::collections::HashMap;
use std::sync::Arc;

use mapp_core::{Ctx, Field, MappError, Name, OrderedMap, Record, Value};

use crate::ast::Node;

/// The spec slice a program runs against: declared state, declared args,
/// an optional document tree and an optional script body.
#[derive(Debug, Clone, Default)]
pub struct ProgramSpec {
    pub name: Option<Name>,
    pub state: OrderedMap<Field>,
    pub args: OrderedMap<Field>,
    pub document: Option<Node>,
    pub body: Vec<Node>,
}

impl ProgramSpec {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A spec slice carrying only declared args; how the operation
    /// runtime frames an op invocation.
    pub fn with_args(args: OrderedMap<Field>) -> Self {
        Self { args, ..Self::default() }
    }
}

/// Dispatch seam for `op` nodes. The operation runtime implements this;
/// the evaluator never reaches it directly.
pub trait OpRunner: Send + Sync {
    fn run(&self, name: &str, params: Record, ctx: &Ctx) -> Result<Value, MappError>;
}

pub struct LingoApp {
    pub program: ProgramSpec,
    pub args: Record,
    pub state: Record,
    pub ops: HashMap<String, Node>,
    pub runner: Option<Arc<dyn OpRunner>>,
    args_bound: bool,
}

impl LingoApp {
    pub fn new(program: ProgramSpec) -> Self {
        Self {
            program,
            args: Record::new(),
            state: Record::new(),
            ops: HashMap::new(),
            runner: None,
            args_bound: false,
        }
    }

    /// Assign input bindings. Happens at most once per invocation;
    /// declared args are coerced to their field types.
    pub fn bind_args(&mut self, args: Record) -> Result<(), MappError> {
        if self.args_bound {
            return Err(MappError::TypeError("args are already bound".to_string()));
        }
        let mut bound = Record::new();
        for (name, value) in args {
            match self.program.args.get(&name) {
                Some(field) => {
                    bound.insert(name, value.coerce(&field.value_type()?)?);
                }
                None => {
                    bound.insert(name, value);
                }
            }
        }
        self.args = bound;
        self.args_bound = true;
        Ok(())
    }

    pub fn arg_value(&self, field: &str) -> Result<Value, MappError> {
        if self.program.args.contains_key(field) || self.args.contains_key(field) {
            Ok(self.args.get(field).cloned().unwrap_or(Value::Null))
        } else {
            Err(MappError::UndefinedBinding(format!("args.{field}")))
        }
    }

    pub fn state_value(&self, field: &str) -> Result<Value, MappError> {
        if self.program.state.contains_key(field) {
            Ok(self.state.get(field).cloned().unwrap_or(Value::Null))
        } else {
            Err(MappError::UndefinedBinding(format!("state.{field}")))
        }
    }

    /// Write a declared state field; the value is coerced to the field
    /// type. Invariant: `state[f]` is absent or of the declared type.
    pub fn write_state(&mut self, field: &str, value: Value) -> Result<Value, MappError> {
        let declared = self
            .program
            .state
            .get(field)
            .ok_or_else(|| MappError::UndefinedBinding(format!("state.{field}")))?;
        let coerced = value.coerce(&declared.value_type()?)?;
        self.state.insert(field.to_string(), coerced.clone());
        Ok(coerced)
    }
}
