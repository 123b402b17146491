//! Lingo: a small declarative language over JSON-shaped trees.
//!
//! Programs are nested single-key mappings. The parser turns them into a
//! tagged AST once; the evaluator walks the AST against per-invocation
//! state with a process-wide host-function registry; the document
//! renderer flattens a page tree into an ordered element stream.
//!
//! # Example
//!
//! ```ignore
//! use lingo::{ast, eval, HostRegistry, LingoApp, ProgramSpec};
//! use mapp_core::Ctx;
//!
//! let node = ast::parse(&serde_json::json!({
//!     "call": {"func": "math.add", "args": {
//!         "a": {"value": {"type": "int", "value": 1}},
//!         "b": {"value": {"type": "int", "value": 2}},
//!     }}
//! }))?;
//! let registry = HostRegistry::standard();
//! let mut app = LingoApp::new(ProgramSpec::empty());
//! let out = eval::eval(&node, &mut app, &Ctx::new(), &registry)?;
//! ```

pub mod app;
pub mod ast;
pub mod document;
pub mod eval;
pub mod hosts;
pub mod program;

pub use app::{LingoApp, OpRunner, ProgramSpec};
pub use ast::{parse, parse_document, ListStyle, Node};
pub use document::{render, update_state, Element};
pub use eval::{eval, Evaluator};
pub use hosts::{host_fail, HostFn, HostParam, HostRegistry};
pub use program::{load_page, load_page_str, load_script, load_script_str, run_script};
