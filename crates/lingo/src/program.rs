//! Page and script program loading.
//!
//! Same loader discipline as project specs: suffix dispatch, version tag
//! per family (`page-beta-1` / `script-beta-1`), then a light
//! normalization pass filling field names from mapping keys.

use std::path::Path;

use serde::Deserialize;

use mapp_core::version::{self, VersionTag, PAGE, SCRIPT};
use mapp_core::{Ctx, Field, MappError, Name, OrderedMap, Record, Value};

use crate::app::{LingoApp, ProgramSpec};
use crate::ast::{parse, parse_document};
use crate::eval::Evaluator;
use crate::hosts::HostRegistry;

#[derive(Debug, Deserialize)]
struct PageFile {
    lingo: VersionTag,
    page: PageBody,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    name: Option<Name>,
    #[serde(default)]
    state: OrderedMap<Field>,
    #[serde(default)]
    args: OrderedMap<Field>,
    document: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    lingo: VersionTag,
    script: ScriptBody,
}

#[derive(Debug, Deserialize)]
struct ScriptBody {
    #[serde(default)]
    name: Option<Name>,
    #[serde(default)]
    args: OrderedMap<Field>,
    #[serde(default)]
    state: OrderedMap<Field>,
    body: Vec<serde_json::Value>,
}

/// Parse a `page-beta-1` document from YAML or JSON text.
pub fn load_page_str(text: &str, json: bool) -> Result<ProgramSpec, MappError> {
    let file: PageFile = decode(text, json)?;
    version::check(&file.lingo.version, PAGE)?;
    let mut program = ProgramSpec {
        name: file.page.name,
        state: file.page.state,
        args: file.page.args,
        document: Some(parse_document(&file.page.document)?),
        body: Vec::new(),
    };
    fill_field_names(&mut program)?;
    Ok(program)
}

/// Parse a `script-beta-1` document from YAML or JSON text.
pub fn load_script_str(text: &str, json: bool) -> Result<ProgramSpec, MappError> {
    let file: ScriptFile = decode(text, json)?;
    version::check(&file.lingo.version, SCRIPT)?;
    let mut body = Vec::with_capacity(file.script.body.len());
    for raw in &file.script.body {
        body.push(parse(raw)?);
    }
    let mut program = ProgramSpec {
        name: file.script.name,
        state: file.script.state,
        args: file.script.args,
        document: None,
        body,
    };
    fill_field_names(&mut program)?;
    Ok(program)
}

/// Run a script program: bind args, evaluate each body statement in
/// order, return the last value.
pub fn run_script(
    program: &ProgramSpec,
    args: Record,
    ctx: &Ctx,
    registry: &HostRegistry,
) -> Result<Value, MappError> {
    let mut app = LingoApp::new(program.clone());
    app.bind_args(args)?;
    let body = app.program.body.clone();
    let mut evaluator = Evaluator::new(registry);
    let mut last = Value::Null;
    for node in &body {
        last = evaluator.eval(node, &mut app, ctx)?;
    }
    Ok(last)
}

pub fn load_page(path: &Path) -> Result<ProgramSpec, MappError> {
    let (text, json) = read(path)?;
    load_page_str(&text, json)
}

pub fn load_script(path: &Path) -> Result<ProgramSpec, MappError> {
    let (text, json) = read(path)?;
    load_script_str(&text, json)
}

fn read(path: &Path) -> Result<(String, bool), MappError> {
    let json = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => true,
        Some("yml") | Some("yaml") => false,
        other => {
            return Err(MappError::InvalidField {
                field: "program".to_string(),
                message: format!("unsupported suffix {:?}", other.unwrap_or("")),
            })
        }
    };
    let text = std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            MappError::SpecFileNotFound(path.display().to_string())
        } else {
            MappError::ServerError(format!("reading {}: {err}", path.display()))
        }
    })?;
    Ok((text, json))
}

fn decode<T: serde::de::DeserializeOwned>(text: &str, json: bool) -> Result<T, MappError> {
    let result = if json {
        serde_json::from_str(text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    };
    result.map_err(|message| MappError::InvalidField { field: "program".to_string(), message })
}

fn fill_field_names(program: &mut ProgramSpec) -> Result<(), MappError> {
    for (key, field) in program.state.iter_mut() {
        if field.name.is_none() {
            field.name = Some(Name::from_snake(key)?);
        }
        field.type_id = field.compute_type_id();
    }
    for (key, field) in program.args.iter_mut() {
        if field.name.is_none() {
            field.name = Some(Name::from_snake(key)?);
        }
        field.type_id = field.compute_type_id();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_YAML: &str = r#"
lingo:
  version: page-beta-1
page:
  name: welcome
  state:
    name: { type: str, examples: ["Alice"] }
  args:
    first_visit: { type: bool, examples: [true] }
  document:
    - heading: { text: "Welcome", level: 1 }
    - lingo: { state: { name: {} } }
"#;

    #[test]
    fn test_load_page() {
        let program = load_page_str(PAGE_YAML, false).unwrap();
        assert_eq!(program.name.as_ref().unwrap().snake, "welcome");
        assert!(program.state.contains_key("name"));
        assert!(program.args.contains_key("first_visit"));
        assert!(program.document.is_some());
    }

    #[test]
    fn test_wrong_family_rejected() {
        let text = PAGE_YAML.replace("page-beta-1", "script-beta-1");
        let err = load_page_str(&text, false).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_VERSION");
    }

    #[test]
    fn test_load_script() {
        let script = r#"
lingo:
  version: script-beta-1
script:
  name: add two
  args:
    a: { type: int, examples: [1] }
    b: { type: int, examples: [2] }
  body:
    - call:
        func: math.add
        args:
          a: { args: { a: {} } }
          b: { args: { b: {} } }
"#;
        let program = load_script_str(script, false).unwrap();
        assert_eq!(program.body.len(), 1);
        assert_eq!(program.args.len(), 2);
    }

    #[test]
    fn test_run_script_returns_last_value() {
        let script = r#"
lingo:
  version: script-beta-1
script:
  name: counter
  args:
    start: { type: int, examples: [1] }
  state:
    count: { type: int, examples: [0] }
  body:
    - set:
        state: { count: {} }
        to: { args: { start: {} } }
    - set:
        state: { count: {} }
        to:
          call:
            func: math.add
            args:
              a: { state: { count: {} } }
              b: { value: { type: int, value: 5 } }
    - state: { count: {} }
"#;
        let program = load_script_str(script, false).unwrap();
        let mut args = Record::new();
        args.insert("start".to_string(), Value::Int(10));
        let out = run_script(&program, args, &Ctx::new(), &HostRegistry::standard()).unwrap();
        assert_eq!(out, Value::Int(15));
    }
}
