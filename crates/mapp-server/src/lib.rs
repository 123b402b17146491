//! MApp HTTP adapter: axum on the outside, the typed dispatcher inside.
//!
//! Routes are derived from the spec at runtime, so the router is a single
//! fallback handler that converts every hyper request into a dispatcher
//! `Request` and the typed `Response` back into HTTP.

use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mapp_runtime::{Dispatcher, Method, Request, Response};

const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub async fn create_app(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(dispatcher)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn run(addr: &str, dispatcher: Arc<Dispatcher>) {
    let app = create_app(dispatcher).await;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    tracing::info!("MApp API listening on {}", addr);
    axum::serve(listener, app)
        .await
        .expect("Server error");
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    req: axum::extract::Request,
) -> HttpResponse {
    let method_raw = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());
    let token = bearer_token(req.headers());

    let Some(method) = Method::parse(&method_raw) else {
        return to_http(Response {
            status: 405,
            body: json!({"code": "REQUEST_ERROR", "message": "method not allowed"}),
        });
    };

    let body = match to_bytes(req.into_body(), BODY_LIMIT).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                return to_http(Response {
                    status: 400,
                    body: json!({
                        "code": "REQUEST_ERROR",
                        "message": format!("invalid JSON body: {err}"),
                    }),
                })
            }
        },
        Err(err) => {
            return to_http(Response {
                status: 400,
                body: json!({
                    "code": "REQUEST_ERROR",
                    "message": format!("unreadable body: {err}"),
                }),
            })
        }
    };

    let request = Request { method, path, query, body };
    // Storage calls block; keep them off the async workers.
    let handled = tokio::task::spawn_blocking(move || dispatcher.handle(&request, token)).await;
    match handled {
        Ok(response) => to_http(response),
        Err(err) => {
            tracing::error!(error = %err, "request task panicked");
            to_http(Response {
                status: 500,
                body: json!({"code": "INTERNAL_SERVER_ERROR", "message": "internal error"}),
            })
        }
    }
}

fn to_http(response: Response) -> HttpResponse {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if response.status == 204 {
        status.into_response()
    } else {
        (status, Json(response.body)).into_response()
    }
}

fn parse_query(raw: Option<&str>) -> std::collections::HashMap<String, String> {
    let mut query = std::collections::HashMap::new();
    if let Some(raw) = raw {
        for pair in raw.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                query.insert(key.to_string(), value.to_string());
            }
        }
    }
    query
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_pairs() {
        let query = parse_query(Some("offset=10&limit=25"));
        assert_eq!(query.get("offset").map(String::as_str), Some("10"));
        assert_eq!(query.get("limit").map(String::as_str), Some("25"));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def".to_string()));

        let mut basic = HeaderMap::new();
        basic.insert("authorization", "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&basic), None);
    }
}
