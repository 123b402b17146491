//! The tree-walking evaluator.
//!
//! `eval` is pure with respect to `(program, state, args, registry)`
//! except for host functions declared non-deterministic. Cancellation is
//! checked at every node boundary; nesting depth is capped so a cyclic
//! calc spec surfaces an error instead of blowing the stack.

use mapp_core::value::values_equal;
use mapp_core::{Ctx, MappError, Record, Value};

use crate::app::LingoApp;
use crate::ast::Node;
use crate::hosts::HostRegistry;

const MAX_DEPTH: u32 = 256;

pub struct Evaluator<'a> {
    registry: &'a HostRegistry,
    depth: u32,
}

/// Evaluate a node against an app. Convenience wrapper around
/// [`Evaluator`].
pub fn eval(
    node: &Node,
    app: &mut LingoApp,
    ctx: &Ctx,
    registry: &HostRegistry,
) -> Result<Value, MappError> {
    Evaluator::new(registry).eval(node, app, ctx)
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a HostRegistry) -> Self {
        Self { registry, depth: 0 }
    }

    pub fn eval(&mut self, node: &Node, app: &mut LingoApp, ctx: &Ctx) -> Result<Value, MappError> {
        if ctx.cancel.is_cancelled() {
            return Err(MappError::Cancelled);
        }
        if self.depth >= MAX_DEPTH {
            return Err(MappError::TypeError(format!(
                "expression nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = self.eval_inner(node, app, ctx);
        self.depth -= 1;
        result
    }

    fn eval_inner(
        &mut self,
        node: &Node,
        app: &mut LingoApp,
        ctx: &Ctx,
    ) -> Result<Value, MappError> {
        match node {
            Node::Text(text) => Ok(Value::Str(text.clone())),
            Node::Literal { value, .. } => Ok(value.clone()),
            Node::StateRead(field) => app.state_value(field),
            Node::ArgRead(field) => app.arg_value(field),

            Node::Set { field, to } => {
                let value = self.eval(to, app, ctx)?;
                app.write_state(field, value)
            }

            Node::Call { func, args } => {
                // Operands evaluate left to right in declaration order.
                let mut evaluated = Vec::with_capacity(args.len());
                for (name, arg_node) in args {
                    evaluated.push((name.clone(), self.eval(arg_node, app, ctx)?));
                }
                self.registry.invoke(ctx, func, &evaluated)
            }

            Node::Lingo(inner) => self.eval(inner, app, ctx),

            Node::Branch { arms, default } => {
                for arm in arms {
                    if self.eval(&arm.cond, app, ctx)?.truthy() {
                        return self.eval(&arm.then, app, ctx);
                    }
                }
                match default {
                    Some(fallback) => self.eval(fallback, app, ctx),
                    None => Ok(Value::Null),
                }
            }

            Node::Switch { expression, cases, default } => {
                // The discriminant evaluates exactly once.
                let discriminant = self.eval(expression, app, ctx)?;
                for (case, then) in cases {
                    if values_equal(case, &discriminant) {
                        return self.eval(then, app, ctx);
                    }
                }
                match default {
                    Some(fallback) => self.eval(fallback, app, ctx),
                    None => Ok(Value::Null),
                }
            }

            Node::OpCall { name, args } => {
                let mut params = Record::new();
                for (arg_name, arg_node) in args {
                    params.insert(arg_name.clone(), self.eval(arg_node, app, ctx)?);
                }
                self.dispatch_op(name, params, app, ctx)
            }

            other => Err(MappError::TypeError(format!(
                "{} is a document node, not an expression",
                head_name(other)
            ))),
        }
    }

    /// `op` nodes dispatch through the operation runtime when one is
    /// attached; program-local ops evaluate in a fresh child app.
    fn dispatch_op(
        &mut self,
        name: &str,
        params: Record,
        app: &mut LingoApp,
        ctx: &Ctx,
    ) -> Result<Value, MappError> {
        if let Some(runner) = app.runner.clone() {
            return runner.run(name, params, ctx);
        }
        let Some(func) = app.ops.get(name).cloned() else {
            return Err(MappError::UnknownOp(format!("op {name}")));
        };
        let mut child = LingoApp::new(crate::app::ProgramSpec::empty());
        child.ops = app.ops.clone();
        child.bind_args(params)?;
        self.eval(&func, &mut child, ctx)
    }
}

fn head_name(node: &Node) -> &'static str {
    match node {
        Node::Text(_) => "text",
        Node::Literal { .. } => "value",
        Node::StateRead(_) => "state",
        Node::ArgRead(_) => "args",
        Node::Set { .. } => "set",
        Node::Call { .. } => "call",
        Node::Lingo(_) => "lingo",
        Node::Branch { .. } => "branch",
        Node::Switch { .. } => "switch",
        Node::OpCall { .. } => "op",
        Node::Page(_) => "page",
        Node::Block(_) => "block",
        Node::Footer(_) => "footer",
        Node::Heading { .. } => "heading",
        Node::Link { .. } => "link",
        Node::Break { .. } => "break",
        Node::Input { .. } => "input",
        Node::Button { .. } => "button",
        Node::ListNode { .. } => "list",
        Node::Code { .. } => "code",
        Node::Menu(_) => "menu",
    }
}
