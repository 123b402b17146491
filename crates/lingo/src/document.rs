//! The document renderer.
//!
//! Re-runs calculated state, then flattens the `page`/`block` tree into a
//! flat, ordered element stream. Branch and switch nodes are replaced by
//! their chosen subtree; unchosen branches are never walked.

use serde::{Deserialize, Serialize};

use mapp_core::{Ctx, MappError, Value};

use crate::app::LingoApp;
use crate::ast::{parse, ListStyle, Node};
use crate::eval::Evaluator;
use crate::hosts::HostRegistry;

/// One renderable element. The stream order is the pre-order traversal
/// of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    Heading { level: u8, text: String },
    Text { text: String },
    Link {
        link: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Break { count: u32 },
    Input {
        bind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
    },
    Button {
        op: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    List {
        style: ListStyle,
        items: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<String>,
    },
    Value { value: serde_json::Value },
    Struct { rows: Vec<(String, String)> },
    Code {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

/// Render the app's document: recompute calculated state, then walk.
pub fn render(
    app: &mut LingoApp,
    ctx: &Ctx,
    registry: &HostRegistry,
) -> Result<Vec<Element>, MappError> {
    update_state(app, ctx, registry)?;
    let document = app
        .program
        .document
        .clone()
        .ok_or_else(|| MappError::TypeError("program has no document".to_string()))?;
    let mut out = Vec::new();
    walk(&document, app, ctx, registry, &mut out)?;
    Ok(out)
}

/// Recompute every state field that declares a `calc` expression, in
/// declaration order. A field reading a later calculated field sees its
/// previous value; cycles are a spec bug caught by the evaluator's depth
/// cap.
pub fn update_state(
    app: &mut LingoApp,
    ctx: &Ctx,
    registry: &HostRegistry,
) -> Result<(), MappError> {
    let calcs: Vec<(String, serde_json::Value)> = app
        .program
        .state
        .iter()
        .filter_map(|(key, field)| field.calc.clone().map(|calc| (key.to_string(), calc)))
        .collect();
    for (field, raw) in calcs {
        let node = parse(&raw)?;
        let value = Evaluator::new(registry).eval(&node, app, ctx)?;
        app.write_state(&field, value)?;
    }
    Ok(())
}

fn walk(
    node: &Node,
    app: &mut LingoApp,
    ctx: &Ctx,
    registry: &HostRegistry,
    out: &mut Vec<Element>,
) -> Result<(), MappError> {
    if ctx.cancel.is_cancelled() {
        return Err(MappError::Cancelled);
    }
    match node {
        Node::Page(children) | Node::Block(children) | Node::Footer(children) => {
            for child in children {
                walk(child, app, ctx, registry, out)?;
            }
        }
        Node::Heading { level, content } => {
            let text = Evaluator::new(registry).eval(content, app, ctx)?.display();
            // Page specs clamp heading depth.
            out.push(Element::Heading { level: (*level).clamp(1, 3), text });
        }
        Node::Text(text) => out.push(Element::Text { text: text.clone() }),
        Node::Link { link, text } => {
            out.push(Element::Link { link: link.clone(), text: text.clone() })
        }
        Node::Break { count } => out.push(Element::Break { count: *count }),
        Node::Input { bind, width } => {
            out.push(Element::Input { bind: bind.clone(), width: *width })
        }
        Node::Button { op, text } => {
            out.push(Element::Button { op: op.clone(), text: text.clone() })
        }
        Node::Menu(items) => {
            for item in items {
                out.push(Element::Link { link: item.link.clone(), text: Some(item.text.clone()) });
            }
        }
        Node::ListNode { items, style, headers } => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                rendered.push(Evaluator::new(registry).eval(item, app, ctx)?.display());
            }
            out.push(Element::List { style: *style, items: rendered, headers: headers.clone() });
        }
        Node::Code { text, language } => {
            out.push(Element::Code { text: text.clone(), language: language.clone() })
        }
        Node::Branch { arms, default } => {
            for arm in arms {
                if Evaluator::new(registry).eval(&arm.cond, app, ctx)?.truthy() {
                    return walk(&arm.then, app, ctx, registry, out);
                }
            }
            if let Some(fallback) = default {
                walk(fallback, app, ctx, registry, out)?;
            }
        }
        Node::Switch { expression, cases, default } => {
            let discriminant = Evaluator::new(registry).eval(expression, app, ctx)?;
            for (case, then) in cases {
                if mapp_core::value::values_equal(case, &discriminant) {
                    return walk(then, app, ctx, registry, out);
                }
            }
            if let Some(fallback) = default {
                walk(fallback, app, ctx, registry, out)?;
            }
        }
        // Everything else is an expression embedded in the document.
        other => {
            let value = Evaluator::new(registry).eval(other, app, ctx)?;
            push_value(value, out);
        }
    }
    Ok(())
}

/// Render an evaluated value: primitives become text, structs become
/// key/value rows, lists become bullets.
fn push_value(value: Value, out: &mut Vec<Element>) {
    match value {
        Value::Null => {}
        Value::Struct(map) => {
            let rows = map.iter().map(|(k, v)| (k.clone(), v.display())).collect();
            out.push(Element::Struct { rows });
        }
        Value::List(items) => {
            out.push(Element::List {
                style: ListStyle::Bullets,
                items: items.iter().map(Value::display).collect(),
                headers: Vec::new(),
            });
        }
        primitive => out.push(Element::Text { text: primitive.display() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ProgramSpec;
    use crate::ast::parse_document;
    use mapp_core::{BaseType, Field, OrderedMap};
    use serde_json::json;

    fn page_app() -> LingoApp {
        let mut state = OrderedMap::new();
        let mut items = Field::new("items", BaseType::List).unwrap();
        items.element_type = Some(BaseType::Str);
        state.insert("items".to_string(), items);
        let document = parse_document(&json!([
            {"heading": {"text": "Inventory", "level": 7}},
            {"block": [
                {"text": "stock:"},
                {"lingo": {"state": {"items": {}}}},
            ]},
            {"break": {"count": 2}},
            {"menu": [{"text": "home", "link": "/"}]},
        ]))
        .unwrap();
        let mut app = LingoApp::new(ProgramSpec {
            state,
            document: Some(document),
            ..ProgramSpec::default()
        });
        app.state.insert(
            "items".to_string(),
            Value::List(vec![Value::Str("apple".to_string()), Value::Str("pear".to_string())]),
        );
        app
    }

    #[test]
    fn test_render_flattens_in_preorder() {
        let registry = HostRegistry::standard();
        let elements = render(&mut page_app(), &Ctx::new(), &registry).unwrap();
        assert_eq!(
            elements,
            vec![
                Element::Heading { level: 3, text: "Inventory".to_string() },
                Element::Text { text: "stock:".to_string() },
                Element::List {
                    style: ListStyle::Bullets,
                    items: vec!["apple".to_string(), "pear".to_string()],
                    headers: Vec::new(),
                },
                Element::Break { count: 2 },
                Element::Link { link: "/".to_string(), text: Some("home".to_string()) },
            ]
        );
    }

    #[test]
    fn test_unchosen_branch_not_walked() {
        // The unchosen arm reads an undeclared state field; rendering
        // succeeds because that subtree is never visited.
        let document = parse_document(&json!([
            {"branch": [
                {"if": {"value": {"type": "bool", "value": true}}, "then": {"text": "yes"}},
                {"else": {"lingo": {"state": {"ghost": {}}}}},
            ]},
        ]))
        .unwrap();
        let mut app = LingoApp::new(ProgramSpec {
            document: Some(document),
            ..ProgramSpec::default()
        });
        let registry = HostRegistry::standard();
        let elements = render(&mut app, &Ctx::new(), &registry).unwrap();
        assert_eq!(elements, vec![Element::Text { text: "yes".to_string() }]);
    }

    #[test]
    fn test_calculated_state_recomputed_each_render() {
        let mut state = OrderedMap::new();
        let mut base = Field::new("base", BaseType::Int).unwrap();
        base.calc = None;
        state.insert("base".to_string(), base);
        let mut doubled = Field::new("doubled", BaseType::Int).unwrap();
        doubled.calc = Some(json!({"call": {"func": "math.mul", "args": {
            "a": {"state": {"base": {}}},
            "b": {"value": {"type": "int", "value": 2}},
        }}}));
        state.insert("doubled".to_string(), doubled);

        let document = parse_document(&json!([{"lingo": {"state": {"doubled": {}}}}])).unwrap();
        let mut app = LingoApp::new(ProgramSpec {
            state,
            document: Some(document),
            ..ProgramSpec::default()
        });
        let registry = HostRegistry::standard();
        let ctx = Ctx::new();

        app.write_state("base", Value::Int(4)).unwrap();
        let first = render(&mut app, &ctx, &registry).unwrap();
        assert_eq!(first, vec![Element::Text { text: "8".to_string() }]);

        app.write_state("base", Value::Int(10)).unwrap();
        let second = render(&mut app, &ctx, &registry).unwrap();
        assert_eq!(second, vec![Element::Text { text: "20".to_string() }]);
    }

    #[test]
    fn test_struct_value_renders_rows() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("total".to_string(), Value::Int(3));
        let mut out = Vec::new();
        push_value(Value::Struct(map), &mut out);
        assert_eq!(
            out,
            vec![Element::Struct { rows: vec![("total".to_string(), "3".to_string())] }]
        );
    }

    #[test]
    fn test_null_renders_nothing() {
        let mut out = Vec::new();
        push_value(Value::Null, &mut out);
        assert!(out.is_empty());
    }
}
