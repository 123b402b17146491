//! The `mapp` CLI.
//!
//! Verb chain: `mapp [module] [model|op] [io] [action] [json]` with
//! contextual help at every level. `db` runs against local storage
//! in-process; `http` sends the equivalent request to a server.
//! Exit codes: 0 success, 1 known error, 2 usage.

use std::path::PathBuf;

use clap::Parser;

use mapp_core::MappError;
use mapp_runtime::{build_dispatcher, Config, Dispatcher, Method, Request, Response};
use mapp_spec::{Model, Op, Spec};

mod help;

const USAGE: i32 = 2;
const KNOWN_ERROR: i32 = 1;

#[derive(Parser)]
#[command(name = "mapp", version, about = "Spec-driven models, ops and storage")]
struct Cli {
    /// Spec file; defaults to MAPP_SPEC_FILE, then the bundled todo demo
    #[arg(long)]
    spec: Option<PathBuf>,

    /// List pagination offset
    #[arg(long)]
    offset: Option<u64>,

    /// List pagination limit
    #[arg(long)]
    limit: Option<u64>,

    /// module, model-or-op, io (db|http), action, JSON payload
    args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", pretty(&err.envelope()));
            KNOWN_ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32, MappError> {
    let config = Config::from_env();
    let spec_path = cli
        .spec
        .clone()
        .or_else(|| config.spec_file.clone())
        .unwrap_or_else(|| PathBuf::from("todo.yaml"));
    let spec = mapp_spec::load_normalized(&spec_path, true)?;

    let mut words = cli.args.iter().map(String::as_str);
    let Some(module_name) = next_word(&mut words) else {
        help::project(&spec);
        return Ok(USAGE);
    };
    if is_help(module_name) {
        help::project(&spec);
        return Ok(0);
    }

    let module = spec
        .module(module_name)
        .ok_or_else(|| MappError::NotFound(format!("module {module_name}")))?;

    let Some(target) = next_word(&mut words) else {
        help::module(module_name, module);
        return Ok(USAGE);
    };
    if is_help(target) {
        help::module(module_name, module);
        return Ok(0);
    }

    if let Some(model) = module.model(target) {
        return model_command(&cli, &config, &spec, module_name, target, model, &mut words);
    }
    if let Some(op) = module.op(target) {
        return op_command(&config, &spec, module_name, target, op, &mut words);
    }
    Err(MappError::NotFound(format!("{module_name} has no model or op named {target}")))
}

#[allow(clippy::too_many_arguments)]
fn model_command<'a>(
    cli: &Cli,
    config: &Config,
    spec: &Spec,
    module_name: &str,
    model_name: &str,
    model: &Model,
    words: &mut impl Iterator<Item = &'a str>,
) -> Result<i32, MappError> {
    let Some(io) = next_word(words) else {
        help::model(module_name, model_name, model);
        return Ok(USAGE);
    };
    if is_help(io) {
        help::model(module_name, model_name, model);
        return Ok(0);
    }
    let io = parse_io(io)?;

    let Some(action) = next_word(words) else {
        help::model(module_name, model_name, model);
        return Ok(USAGE);
    };
    let payload = parse_payload(next_word(words))?;

    let base_path = format!("/{module_name}/{model_name}");
    let request = match action {
        "create" => {
            let body = payload.ok_or_else(|| usage("create needs a JSON payload"))?;
            Request::new(Method::Post, &base_path).with_body(body)
        }
        "read" => Request::new(Method::Get, &format!("{base_path}/{}", payload_id(&payload)?)),
        "update" => {
            let body = payload.clone().ok_or_else(|| usage("update needs a JSON payload"))?;
            Request::new(Method::Put, &format!("{base_path}/{}", payload_id(&payload)?))
                .with_body(body)
        }
        "delete" => {
            Request::new(Method::Delete, &format!("{base_path}/{}", payload_id(&payload)?))
        }
        "list" => {
            let mut request = Request::new(Method::Get, &base_path);
            if let Some(offset) = cli.offset {
                request = request.with_query("offset", &offset.to_string());
            }
            if let Some(limit) = cli.limit {
                request = request.with_query("limit", &limit.to_string());
            }
            request
        }
        "create-table" => {
            // Table creation happens on storage open; touching the
            // dispatcher is enough and stays idempotent.
            let dispatcher = local_dispatcher(spec, config)?;
            drop(dispatcher);
            println!("{}", pretty(&serde_json::json!({"ok": true})));
            return Ok(0);
        }
        "help" | "-h" | "--help" => {
            help::model(module_name, model_name, model);
            return Ok(0);
        }
        other => return Err(usage(&format!("unknown model action {other:?}"))),
    };

    let response = send(spec, config, io, &request)?;
    finish(response)
}

fn op_command<'a>(
    config: &Config,
    spec: &Spec,
    module_name: &str,
    op_name: &str,
    op: &Op,
    words: &mut impl Iterator<Item = &'a str>,
) -> Result<i32, MappError> {
    let Some(action) = next_word(words) else {
        help::op(module_name, op_name, op);
        return Ok(USAGE);
    };
    if is_help(action) {
        help::op(module_name, op_name, op);
        return Ok(0);
    }
    let io = match action {
        "run" => Io::Db,
        "http" => Io::Http,
        other => return Err(usage(&format!("unknown op action {other:?}, expected run or http"))),
    };

    let payload = parse_payload(next_word(words))?.unwrap_or_else(|| serde_json::json!({}));
    let request =
        Request::new(Method::Post, &format!("/{module_name}/{op_name}")).with_body(payload);
    let response = send(spec, config, io, &request)?;
    finish(response)
}

#[derive(Clone, Copy, PartialEq)]
enum Io {
    Db,
    Http,
}

fn parse_io(raw: &str) -> Result<Io, MappError> {
    match raw {
        "db" => Ok(Io::Db),
        "http" => Ok(Io::Http),
        other => Err(usage(&format!("unknown io {other:?}, expected db or http"))),
    }
}

fn send(spec: &Spec, config: &Config, io: Io, request: &Request) -> Result<Response, MappError> {
    match io {
        Io::Db => {
            let dispatcher = local_dispatcher(spec, config)?;
            Ok(dispatcher.handle(request, config.cli_access_token.clone()))
        }
        Io::Http => send_http(config, request),
    }
}

fn local_dispatcher(spec: &Spec, config: &Config) -> Result<Dispatcher, MappError> {
    build_dispatcher(spec.clone(), config)
}

fn send_http(config: &Config, request: &Request) -> Result<Response, MappError> {
    let client = reqwest::blocking::Client::new();
    let url = format!("{}{}", config.client_host.trim_end_matches('/'), request.path);

    let mut builder = match request.method {
        Method::Get => client.get(&url),
        Method::Post => client.post(&url),
        Method::Put => client.put(&url),
        Method::Delete => client.delete(&url),
    };
    builder = builder.query(&request.query.iter().collect::<Vec<_>>());
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }
    if let Some(token) = &config.cli_access_token {
        builder = builder.bearer_auth(token);
    }

    let http_response = builder
        .send()
        .map_err(|err| MappError::ServerError(format!("http request failed: {err}")))?;
    let status = http_response.status().as_u16();
    let body = if status == 204 {
        serde_json::Value::Null
    } else {
        http_response
            .json()
            .map_err(|err| MappError::ServerError(format!("invalid response body: {err}")))?
    };
    Ok(Response { status, body })
}

fn finish(response: Response) -> Result<i32, MappError> {
    if response.body.is_null() {
        println!("{}", pretty(&serde_json::json!({"status": response.status})));
    } else {
        println!("{}", pretty(&response.body));
    }
    Ok(if (200..300).contains(&response.status) { 0 } else { KNOWN_ERROR })
}

fn next_word<'a>(words: &mut impl Iterator<Item = &'a str>) -> Option<&'a str> {
    words.next()
}

fn is_help(word: &str) -> bool {
    matches!(word, "help" | "-h" | "--help")
}

fn parse_payload(raw: Option<&str>) -> Result<Option<serde_json::Value>, MappError> {
    match raw {
        None => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|err| usage(&format!("payload is not valid JSON: {err}"))),
    }
}

fn payload_id(payload: &Option<serde_json::Value>) -> Result<String, MappError> {
    payload
        .as_ref()
        .and_then(|p| p.get("id"))
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .ok_or_else(|| usage("this action needs a JSON payload with an \"id\""))
}

fn usage(message: &str) -> MappError {
    MappError::RequestError { status: 400, message: message.to_string() }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
