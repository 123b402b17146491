//! The Lingo AST and its parser.
//!
//! Programs arrive as JSON/YAML trees where every node is a single-key
//! mapping; the key is the head and decides the node kind. The parser
//! runs once per program and turns the dynamic tree into the tagged
//! `Node` enum the evaluator dispatches on.

use serde::{Deserialize, Serialize};

use mapp_core::{MappError, Value, ValueType};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal string.
    Text(String),
    /// Typed literal: `{type, value}`.
    Literal { ty: ValueType, value: Value },
    /// Read of a state field.
    StateRead(String),
    /// Read of an op/input argument.
    ArgRead(String),
    /// Write a state field.
    Set { field: String, to: Box<Node> },
    /// Invoke a host function by fully-qualified name.
    Call { func: String, args: Vec<(String, Node)> },
    /// Embed an expression inside a document.
    Lingo(Box<Node>),
    /// Ordered `if/elif` arms plus optional `else`.
    Branch { arms: Vec<BranchArm>, default: Option<Box<Node>> },
    /// Discriminant matched by equality against case literals.
    Switch { expression: Box<Node>, cases: Vec<(Value, Node)>, default: Option<Box<Node>> },
    /// Invoke a named op through the operation runtime.
    OpCall { name: String, args: Vec<(String, Node)> },

    // Document heads.
    Page(Vec<Node>),
    Block(Vec<Node>),
    Footer(Vec<Node>),
    Heading { level: u8, content: Box<Node> },
    Link { link: String, text: Option<String> },
    Break { count: u32 },
    Input { bind: String, width: Option<u32> },
    Button { op: String, text: Option<String> },
    ListNode { items: Vec<Node>, style: ListStyle, headers: Vec<String> },
    Code { text: String, language: Option<String> },
    Menu(Vec<MenuItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchArm {
    pub cond: Node,
    pub then: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub text: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    Bullets,
    Numbers,
    Table,
}

/// Parse one node from its single-key-mapping form.
pub fn parse(raw: &serde_json::Value) -> Result<Node, MappError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| shape_err(&format!("node must be a single-key mapping, got {raw}")))?;
    if obj.len() != 1 {
        return Err(shape_err(&format!(
            "node must have exactly one head, got {} keys",
            obj.len()
        )));
    }
    let (head, body) = obj.iter().next().ok_or_else(|| shape_err("empty node"))?;

    match head.as_str() {
        "text" => Ok(Node::Text(expect_str(body, "text")?)),
        "value" => parse_value_literal(body),
        "state" => Ok(Node::StateRead(binding_name(body, "state")?)),
        "args" => Ok(Node::ArgRead(binding_name(body, "args")?)),
        "set" => parse_set(body),
        "call" => parse_call(body),
        "lingo" => Ok(Node::Lingo(Box::new(parse(body)?))),
        "branch" => parse_branch(body),
        "switch" => parse_switch(body),
        "op" => parse_op(body),
        "page" => Ok(Node::Page(parse_children(body, "page")?)),
        "block" => Ok(Node::Block(parse_children(body, "block")?)),
        "footer" => Ok(Node::Footer(parse_children(body, "footer")?)),
        "heading" => parse_heading(body),
        "link" => parse_link(body),
        "break" => parse_break(body),
        "input" => parse_input(body),
        "button" => parse_button(body),
        "list" => parse_list(body),
        "code" => parse_code(body),
        "menu" => parse_menu(body),
        other => Err(MappError::UnknownOp(other.to_string())),
    }
}

/// Parse a document given either as a single node or a list of nodes
/// (an implicit `page`).
pub fn parse_document(raw: &serde_json::Value) -> Result<Node, MappError> {
    match raw {
        serde_json::Value::Array(items) => {
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                children.push(parse(item)?);
            }
            Ok(Node::Page(children))
        }
        other => parse(other),
    }
}

fn parse_value_literal(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("value literal takes {type, value}"))?;
    let ty = match obj.get("type").and_then(|t| t.as_str()) {
        Some(name) => ValueType::parse(name)?,
        None => ValueType::Any,
    };
    let raw = obj.get("value").ok_or_else(|| shape_err("value literal is missing value"))?;
    let value = Value::from_json(raw, &ty, false)?;
    Ok(Node::Literal { ty, value })
}

fn parse_set(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("set takes {state, to}"))?;
    let target = obj.get("state").ok_or_else(|| shape_err("set is missing its state target"))?;
    let to = obj.get("to").ok_or_else(|| shape_err("set is missing to"))?;
    Ok(Node::Set {
        field: single_key(target, "set.state")?,
        to: Box::new(parse(to)?),
    })
}

fn parse_call(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("call takes {func, args}"))?;
    let func = obj
        .get("func")
        .and_then(|f| f.as_str())
        .ok_or_else(|| shape_err("call is missing func"))?
        .to_string();
    let args = match obj.get("args") {
        None => Vec::new(),
        Some(raw_args) => named_nodes(raw_args, "call.args")?,
    };
    Ok(Node::Call { func, args })
}

fn parse_branch(body: &serde_json::Value) -> Result<Node, MappError> {
    let items = body
        .as_array()
        .ok_or_else(|| shape_err("branch takes a list of arms"))?;
    let mut arms = Vec::new();
    let mut default = None;
    for item in items {
        let obj = item
            .as_object()
            .ok_or_else(|| shape_err("branch arm must be a mapping"))?;
        if let Some(raw_else) = obj.get("else") {
            default = Some(Box::new(parse(raw_else)?));
            continue;
        }
        let cond = obj
            .get("if")
            .or_else(|| obj.get("elif"))
            .ok_or_else(|| shape_err("branch arm needs if, elif or else"))?;
        let then = obj.get("then").ok_or_else(|| shape_err("branch arm is missing then"))?;
        arms.push(BranchArm { cond: parse(cond)?, then: parse(then)? });
    }
    Ok(Node::Branch { arms, default })
}

fn parse_switch(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("switch takes {expression, cases, default?}"))?;
    let expression = obj
        .get("expression")
        .ok_or_else(|| shape_err("switch is missing expression"))?;
    let raw_cases = obj
        .get("cases")
        .and_then(|c| c.as_array())
        .ok_or_else(|| shape_err("switch is missing cases"))?;
    let mut cases = Vec::with_capacity(raw_cases.len());
    for raw_case in raw_cases {
        let case_obj = raw_case
            .as_object()
            .ok_or_else(|| shape_err("switch case must be a mapping"))?;
        let literal = case_obj
            .get("case")
            .ok_or_else(|| shape_err("switch case is missing case"))?;
        let then = case_obj.get("then").ok_or_else(|| shape_err("switch case is missing then"))?;
        cases.push((Value::from_json_any(literal)?, parse(then)?));
    }
    let default = match obj.get("default") {
        Some(raw) => Some(Box::new(parse(raw)?)),
        None => None,
    };
    Ok(Node::Switch { expression: Box::new(parse(expression)?), cases, default })
}

fn parse_op(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("op takes {name: {args}}"))?;
    if obj.len() != 1 {
        return Err(shape_err("op takes exactly one name"));
    }
    let (name, raw_args) = obj.iter().next().ok_or_else(|| shape_err("empty op node"))?;
    Ok(Node::OpCall {
        name: name.clone(),
        args: named_nodes(raw_args, "op args")?,
    })
}

fn parse_heading(body: &serde_json::Value) -> Result<Node, MappError> {
    if let Some(text) = body.as_str() {
        return Ok(Node::Heading { level: 1, content: Box::new(Node::Text(text.to_string())) });
    }
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("heading takes a string or {text|content, level?}"))?;
    let level = obj.get("level").and_then(|l| l.as_u64()).unwrap_or(1) as u8;
    let content = if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
        Node::Text(text.to_string())
    } else if let Some(raw) = obj.get("content") {
        parse(raw)?
    } else {
        return Err(shape_err("heading is missing text"));
    };
    Ok(Node::Heading { level, content: Box::new(content) })
}

fn parse_link(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("link takes {link, text?}"))?;
    let link = obj
        .get("link")
        .and_then(|l| l.as_str())
        .ok_or_else(|| shape_err("link is missing link"))?
        .to_string();
    let text = obj.get("text").and_then(|t| t.as_str()).map(str::to_string);
    Ok(Node::Link { link, text })
}

fn parse_break(body: &serde_json::Value) -> Result<Node, MappError> {
    let count = match body {
        serde_json::Value::Object(obj) => {
            obj.get("count").and_then(|c| c.as_u64()).unwrap_or(1) as u32
        }
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(1) as u32,
        serde_json::Value::Null => 1,
        _ => return Err(shape_err("break takes {count?}")),
    };
    Ok(Node::Break { count: count.max(1) })
}

fn parse_input(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("input takes {bind, width?}"))?;
    let bind_raw = obj.get("bind").ok_or_else(|| shape_err("input is missing bind"))?;
    let field = binding_name(
        bind_raw
            .get("state")
            .ok_or_else(|| shape_err("input bind must target state"))?,
        "input.bind.state",
    )?;
    let width = obj.get("width").and_then(|w| w.as_u64()).map(|w| w as u32);
    Ok(Node::Input { bind: format!("state.{field}"), width })
}

fn parse_button(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("button takes {op, text?}"))?;
    let op = obj
        .get("op")
        .and_then(|o| o.as_str())
        .ok_or_else(|| shape_err("button is missing op"))?
        .to_string();
    let text = obj.get("text").and_then(|t| t.as_str()).map(str::to_string);
    Ok(Node::Button { op, text })
}

fn parse_list(body: &serde_json::Value) -> Result<Node, MappError> {
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("list takes {items, style?, headers?}"))?;
    let raw_items = obj
        .get("items")
        .and_then(|i| i.as_array())
        .ok_or_else(|| shape_err("list is missing items"))?;
    let mut items = Vec::with_capacity(raw_items.len());
    for item in raw_items {
        items.push(parse(item)?);
    }
    let headers: Vec<String> = obj
        .get("headers")
        .and_then(|h| h.as_array())
        .map(|h| h.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let style = match obj.get("style").and_then(|s| s.as_str()) {
        None if !headers.is_empty() => ListStyle::Table,
        None => ListStyle::Bullets,
        Some("bullets") => ListStyle::Bullets,
        Some("numbers") => ListStyle::Numbers,
        Some("table") => ListStyle::Table,
        Some(other) => return Err(shape_err(&format!("unknown list style {other:?}"))),
    };
    Ok(Node::ListNode { items, style, headers })
}

fn parse_code(body: &serde_json::Value) -> Result<Node, MappError> {
    if let Some(text) = body.as_str() {
        return Ok(Node::Code { text: text.to_string(), language: None });
    }
    let obj = body
        .as_object()
        .ok_or_else(|| shape_err("code takes a string or {text, language?}"))?;
    let text = obj
        .get("text")
        .and_then(|t| t.as_str())
        .ok_or_else(|| shape_err("code is missing text"))?
        .to_string();
    let language = obj.get("language").and_then(|l| l.as_str()).map(str::to_string);
    Ok(Node::Code { text, language })
}

fn parse_menu(body: &serde_json::Value) -> Result<Node, MappError> {
    let items = body
        .as_array()
        .ok_or_else(|| shape_err("menu takes a list of {text, link}"))?;
    let mut menu = Vec::with_capacity(items.len());
    for item in items {
        let entry: MenuItem = serde_json::from_value(item.clone())
            .map_err(|e| shape_err(&format!("menu item: {e}")))?;
        menu.push(entry);
    }
    Ok(Node::Menu(menu))
}

fn parse_children(body: &serde_json::Value, head: &str) -> Result<Vec<Node>, MappError> {
    let items = body
        .as_array()
        .ok_or_else(|| shape_err(&format!("{head} takes a list of children")))?;
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        children.push(parse(item)?);
    }
    Ok(children)
}

/// Named operands in declaration order.
fn named_nodes(raw: &serde_json::Value, context: &str) -> Result<Vec<(String, Node)>, MappError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| shape_err(&format!("{context} must be a mapping")))?;
    let mut nodes = Vec::with_capacity(obj.len());
    for (name, value) in obj {
        nodes.push((name.clone(), parse(value)?));
    }
    Ok(nodes)
}

/// The `{field: {}}` shape used by state/args reads.
fn binding_name(raw: &serde_json::Value, context: &str) -> Result<String, MappError> {
    single_key(raw, context)
}

fn single_key(raw: &serde_json::Value, context: &str) -> Result<String, MappError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| shape_err(&format!("{context} must be a single-key mapping")))?;
    if obj.len() != 1 {
        return Err(shape_err(&format!("{context} must name exactly one field")));
    }
    obj.keys()
        .next()
        .cloned()
        .ok_or_else(|| shape_err(&format!("{context} is empty")))
}

fn expect_str(raw: &serde_json::Value, head: &str) -> Result<String, MappError> {
    raw.as_str()
        .map(str::to_string)
        .ok_or_else(|| shape_err(&format!("{head} takes a string")))
}

fn shape_err(message: &str) -> MappError {
    MappError::InvalidField {
        field: "lingo".to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_head() {
        let err = parse(&json!({"frobnicate": {}})).unwrap_err();
        assert_eq!(err, MappError::UnknownOp("frobnicate".to_string()));
    }

    #[test]
    fn test_two_heads_rejected() {
        let err = parse(&json!({"text": "a", "state": {"x": {}}})).unwrap_err();
        assert_eq!(err.code(), "INVALID_FIELD");
    }

    #[test]
    fn test_state_read() {
        let node = parse(&json!({"state": {"greeting": {}}})).unwrap();
        assert_eq!(node, Node::StateRead("greeting".to_string()));
    }

    #[test]
    fn test_call_args_keep_declaration_order() {
        let node = parse(&json!({"call": {"func": "math.sub", "args": {
            "b": {"value": {"type": "int", "value": 1}},
            "a": {"value": {"type": "int", "value": 2}},
        }}}))
        .unwrap();
        match node {
            Node::Call { func, args } => {
                assert_eq!(func, "math.sub");
                let names: Vec<&str> = args.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["b", "a"]);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_branch_shape() {
        let node = parse(&json!({"branch": [
            {"if": {"args": {"first_visit": {}}}, "then": {"text": "back"}},
            {"elif": {"state": {"flag": {}}}, "then": {"text": "flagged"}},
            {"else": {"text": "in"}},
        ]}))
        .unwrap();
        match node {
            Node::Branch { arms, default } => {
                assert_eq!(arms.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_switch_case_literals() {
        let node = parse(&json!({"switch": {
            "expression": {"call": {"func": "date.weekday", "args": {}}},
            "cases": [
                {"case": 0, "then": {"text": "Monday"}},
                {"case": 4, "then": {"text": "Friday"}},
            ],
            "default": {"text": "Weekend"},
        }}))
        .unwrap();
        match node {
            Node::Switch { cases, default, .. } => {
                assert_eq!(cases[0].0, Value::Int(0));
                assert_eq!(cases.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_document_list_is_implicit_page() {
        let node = parse_document(&json!([
            {"heading": {"text": "Welcome", "level": 1}},
            {"break": {}},
        ]))
        .unwrap();
        match node {
            Node::Page(children) => assert_eq!(children.len(), 2),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_input_bind_path() {
        let node = parse(&json!({"input": {"bind": {"state": {"name": {}}}, "width": 40}})).unwrap();
        assert_eq!(
            node,
            Node::Input { bind: "state.name".to_string(), width: Some(40) }
        );
    }
}
