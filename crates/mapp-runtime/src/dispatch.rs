//! The request dispatcher.
//!
//! A typed, transport-free request model: the HTTP adapter and the CLI
//! both build a `Request`, and both get back a `Response` carrying a
//! status and a JSON body. Route matching follows the two CRUD families
//! plus op routes; the first matcher that produces a typed response
//! terminates the scan.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use lingo::HostRegistry;
use mapp_core::validate::check_record;
use mapp_core::{record_to_json, Ctx, MappError, Record, Storage, Value};
use mapp_spec::{resolved_auth, Model, Module, Spec};

use crate::auth::AuthService;
use crate::op::OpRuntime;

pub const DEFAULT_LIST_LIMIT: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn new(method: Method, path: &str) -> Self {
        Self { method, path: path.to_string(), query: HashMap::new(), body: None }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Response {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn no_content() -> Self {
        Self { status: 204, body: serde_json::Value::Null }
    }

    pub fn from_error(err: &MappError) -> Self {
        Self { status: err.status(), body: err.envelope() }
    }
}

pub struct Dispatcher {
    spec: Arc<Spec>,
    storage: Arc<dyn Storage>,
    ops: OpRuntime,
    auth: Arc<AuthService>,
}

impl Dispatcher {
    pub fn new(
        spec: Arc<Spec>,
        storage: Arc<dyn Storage>,
        auth: Arc<AuthService>,
        registry: Arc<HostRegistry>,
    ) -> Result<Self, MappError> {
        let ops = OpRuntime::prepare(&spec, registry)?;
        Ok(Self { spec, storage, ops, auth })
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub fn ops(&self) -> &OpRuntime {
        &self.ops
    }

    /// Build a per-request ctx and dispatch. The adapter-facing entry
    /// point.
    pub fn handle(&self, request: &Request, access_token: Option<String>) -> Response {
        let ctx = Ctx::new().with_storage(self.storage.clone()).with_token(access_token);
        self.dispatch(&ctx, request)
    }

    /// Dispatch with a caller-supplied ctx (tests pin clocks and seeds
    /// through here).
    pub fn dispatch(&self, ctx: &Ctx, request: &Request) -> Response {
        match self.route(ctx, request) {
            Ok(response) => {
                tracing::info!(path = %request.path, status = response.status, "handled");
                response
            }
            Err(err) => {
                tracing::warn!(path = %request.path, code = err.code(), error = %err, "request failed");
                Response::from_error(&err)
            }
        }
    }

    fn route(&self, ctx: &Ctx, request: &Request) -> Result<Response, MappError> {
        let segments: Vec<&str> =
            request.path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [module_name, target] => {
                let module = self.module(module_name)?;
                if let Some(model) = visible_model(module, target) {
                    return self.collection(ctx, request, module_name, target, model);
                }
                if module.op(target).is_some() {
                    return match request.method {
                        Method::Post => {
                            let body = request.body.clone().unwrap_or_else(|| json!({}));
                            let output = self.ops.run_json(ctx, module_name, target, &body)?;
                            Ok(Response::ok(output))
                        }
                        _ => Err(method_not_allowed()),
                    };
                }
                Err(MappError::NotFound(request.path.clone()))
            }
            [module_name, model_name, id] => {
                let module = self.module(module_name)?;
                let model = visible_model(module, model_name)
                    .ok_or_else(|| MappError::NotFound(request.path.clone()))?;
                self.instance(ctx, request, module_name, model_name, model, id)
            }
            _ => Err(MappError::NotFound(request.path.clone())),
        }
    }

    fn module(&self, name: &str) -> Result<&Module, MappError> {
        self.spec
            .module(name)
            .ok_or_else(|| MappError::NotFound(format!("module {name}")))
    }

    fn collection(
        &self,
        ctx: &Ctx,
        request: &Request,
        module_name: &str,
        model_name: &str,
        model: &Model,
    ) -> Result<Response, MappError> {
        let table = format!("{module_name}_{model_name}");
        match request.method {
            Method::Post => {
                let user = self.authorize(ctx, model)?;
                self.enforce_per_user_cap(model, &table, user.as_deref())?;

                let body = request
                    .body
                    .as_ref()
                    .ok_or_else(|| bad_request("request body is required"))?;
                let mut record =
                    check_record(&format!("{module_name}.{model_name}"), &model.fields, body)?;
                if let (Some(user_id), true) = (&user, model.fields.contains_key("user_id")) {
                    record.insert("user_id".to_string(), Value::Str(user_id.clone()));
                }
                record.remove("id");

                let stored = self.storage.insert(&table, &record)?;
                Ok(Response::ok(self.present(model, &stored)))
            }
            Method::Get => {
                self.authorize(ctx, model)?;
                let offset = parse_param(&request.query, "offset", 0)?;
                let limit = parse_param(&request.query, "limit", DEFAULT_LIST_LIMIT)?;
                let (items, total) = self.storage.list(&table, offset, limit)?;
                let items: Vec<serde_json::Value> =
                    items.iter().map(|r| self.present(model, r)).collect();
                Ok(Response::ok(json!({ "items": items, "total": total })))
            }
            _ => Err(method_not_allowed()),
        }
    }

    fn instance(
        &self,
        ctx: &Ctx,
        request: &Request,
        module_name: &str,
        model_name: &str,
        model: &Model,
        id: &str,
    ) -> Result<Response, MappError> {
        let table = format!("{module_name}_{model_name}");
        self.authorize(ctx, model)?;
        match request.method {
            Method::Get => {
                let record = self
                    .storage
                    .get(&table, id)?
                    .ok_or_else(|| MappError::NotFound(request.path.clone()))?;
                Ok(Response::ok(self.present(model, &record)))
            }
            Method::Put => {
                let body = request
                    .body
                    .as_ref()
                    .ok_or_else(|| bad_request("request body is required"))?;
                if let Some(body_id) = body.get("id").and_then(|v| v.as_str()) {
                    if body_id != id {
                        return Err(bad_request(&format!(
                            "path id {id} does not match body id {body_id}"
                        )));
                    }
                }
                let record =
                    check_record(&format!("{module_name}.{model_name}"), &model.fields, body)?;
                let stored = self.storage.update(&table, id, &record)?;
                Ok(Response::ok(self.present(model, &stored)))
            }
            Method::Delete => {
                self.storage.delete(&table, id)?;
                Ok(Response::no_content())
            }
            Method::Post => Err(method_not_allowed()),
        }
    }

    /// Resolve the current user and enforce `require_login`.
    fn authorize(&self, ctx: &Ctx, model: &Model) -> Result<Option<String>, MappError> {
        let auth = resolved_auth(model);
        let user = self.auth.current_user(ctx)?;
        if auth.require_login && user.is_none() {
            return Err(MappError::Authentication("login required".to_string()));
        }
        Ok(user)
    }

    fn enforce_per_user_cap(
        &self,
        model: &Model,
        table: &str,
        user: Option<&str>,
    ) -> Result<(), MappError> {
        let auth = resolved_auth(model);
        let (Some(cap), Some(user_id)) = (auth.max_models_per_user, user) else {
            return Ok(());
        };
        if !model.fields.contains_key("user_id") {
            return Ok(());
        }
        let owned = self
            .storage
            .count_by(table, "user_id", &Value::Str(user_id.to_string()))?;
        if owned >= cap {
            return Err(MappError::RequestError {
                status: 403,
                message: format!("limit of {cap} per user reached"),
            });
        }
        Ok(())
    }

    /// Serialize a record for the wire, stripping secure fields.
    fn present(&self, model: &Model, record: &Record) -> serde_json::Value {
        let mut filtered = record.clone();
        for (key, field) in model.fields.iter() {
            if field.secure {
                filtered.remove(key);
            }
        }
        record_to_json(&filtered)
    }
}

fn visible_model<'a>(module: &'a Module, name: &str) -> Option<&'a Model> {
    module.model(name).filter(|m| !m.hidden)
}

fn parse_param(
    query: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, MappError> {
    match query.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| bad_request(&format!("{name} must be a non-negative integer"))),
    }
}

fn bad_request(message: &str) -> MappError {
    MappError::RequestError { status: 400, message: message.to_string() }
}

fn method_not_allowed() -> MappError {
    MappError::RequestError { status: 405, message: "method not allowed".to_string() }
}
