//! End-to-end request-flow tests against the bundled todo spec: CRUD
//! round-trips, validation envelopes, pagination, op routes and the auth
//! policy checks, all through the real dispatcher and SQLite storage.

use std::path::{Path, PathBuf};

use serde_json::json;

use mapp_runtime::{build_dispatcher, Config, Dispatcher, Method, Request};

fn test_config() -> Config {
    Config {
        app_path: PathBuf::from("."),
        db_url: ":memory:".to_string(),
        server_port: 0,
        client_host: String::new(),
        auth_secret_key: "746573742d736563726574".to_string(),
        login_expiration_minutes: 60,
        cli_access_token: None,
        spec_file: None,
    }
}

fn dispatcher() -> Dispatcher {
    let spec = mapp_spec::load_normalized(Path::new("todo.yaml"), true).unwrap();
    build_dispatcher(spec, &test_config()).unwrap()
}

fn item_body() -> serde_json::Value {
    json!({
        "description": "a large thing",
        "verified": true,
        "color": "red",
        "count": 36,
        "score": 7.3,
        "stuff": ["apple"],
    })
}

#[test]
fn crud_roundtrip() {
    let d = dispatcher();

    // Create returns the record with an id.
    let created = d.handle(&Request::new(Method::Post, "/todo/item").with_body(item_body()), None);
    assert_eq!(created.status, 200, "{:?}", created.body);
    let id = created.body["id"].as_str().expect("created id").to_string();
    assert_eq!(created.body["count"], 36);

    // Read returns an equivalent record.
    let read = d.handle(&Request::new(Method::Get, &format!("/todo/item/{id}")), None);
    assert_eq!(read.status, 200);
    assert_eq!(read.body["description"], "a large thing");
    assert_eq!(read.body["stuff"], json!(["apple"]));
    assert_eq!(read.body["score"], 7.3);

    // Update returns the mutation.
    let mut mutated = item_body();
    mutated["count"] = json!(37);
    mutated["id"] = json!(id.clone());
    let updated =
        d.handle(&Request::new(Method::Put, &format!("/todo/item/{id}")).with_body(mutated), None);
    assert_eq!(updated.status, 200, "{:?}", updated.body);
    assert_eq!(updated.body["count"], 37);

    // Delete is 204 and idempotent.
    let deleted = d.handle(&Request::new(Method::Delete, &format!("/todo/item/{id}")), None);
    assert_eq!(deleted.status, 204);
    let again = d.handle(&Request::new(Method::Delete, &format!("/todo/item/{id}")), None);
    assert_eq!(again.status, 204);

    // The record is gone.
    let missing = d.handle(&Request::new(Method::Get, &format!("/todo/item/{id}")), None);
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body["code"], "NOT_FOUND");
}

#[test]
fn validation_error_envelope() {
    let d = dispatcher();
    let mut body = item_body();
    body["count"] = json!("not a number");
    let response = d.handle(&Request::new(Method::Post, "/todo/item").with_body(body), None);
    assert_eq!(response.status, 400);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
    let message = response.body["field_errors"]["count"].as_str().unwrap();
    assert!(!message.is_empty());
}

#[test]
fn missing_body_is_a_request_error() {
    let d = dispatcher();
    let response = d.handle(&Request::new(Method::Post, "/todo/item"), None);
    assert_eq!(response.status, 400);
    assert_eq!(response.body["code"], "REQUEST_ERROR");
}

#[test]
fn put_with_mismatched_id_is_rejected() {
    let d = dispatcher();
    let created = d.handle(&Request::new(Method::Post, "/todo/item").with_body(item_body()), None);
    let id = created.body["id"].as_str().unwrap().to_string();

    let mut body = item_body();
    body["id"] = json!("someone-else");
    let response =
        d.handle(&Request::new(Method::Put, &format!("/todo/item/{id}")).with_body(body), None);
    assert_eq!(response.status, 400);
    assert_eq!(response.body["code"], "REQUEST_ERROR");
}

#[test]
fn pagination_walks_every_record_once() {
    let d = dispatcher();
    for i in 0..25 {
        let mut body = item_body();
        body["count"] = json!(i);
        let created = d.handle(&Request::new(Method::Post, "/todo/item").with_body(body), None);
        assert_eq!(created.status, 200);
    }

    let mut sizes = Vec::new();
    let mut seen_ids: Vec<String> = Vec::new();
    let mut offset = 0u64;
    let mut pages_seen = 0;
    loop {
        let response = d.handle(
            &Request::new(Method::Get, "/todo/item")
                .with_query("offset", &offset.to_string())
                .with_query("limit", "10"),
            None,
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body["total"], 25);
        let items = response.body["items"].as_array().unwrap();
        sizes.push(items.len());
        if items.is_empty() {
            break;
        }
        pages_seen += 1;
        for item in items {
            let id = item["id"].as_str().unwrap().to_string();
            assert!(!seen_ids.contains(&id), "id {id} repeated across pages");
            seen_ids.push(id);
        }
        offset += 10;
    }
    assert_eq!(sizes, vec![10, 10, 5, 0]);
    assert_eq!(pages_seen, 3);
    assert_eq!(seen_ids.len(), 25);
}

#[test]
fn list_defaults_apply() {
    let d = dispatcher();
    for _ in 0..30 {
        d.handle(&Request::new(Method::Post, "/todo/item").with_body(item_body()), None);
    }
    let response = d.handle(&Request::new(Method::Get, "/todo/item"), None);
    assert_eq!(response.status, 200);
    assert_eq!(response.body["items"].as_array().unwrap().len(), 25);
    assert_eq!(response.body["total"], 30);
}

#[test]
fn op_route_runs_lingo_func() {
    let d = dispatcher();
    let response = d.handle(
        &Request::new(Method::Post, "/todo/stats").with_body(json!({"a": 30, "b": 6})),
        None,
    );
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body["total"], 36);
}

#[test]
fn op_route_rejects_bad_params() {
    let d = dispatcher();
    let response = d.handle(
        &Request::new(Method::Post, "/todo/stats").with_body(json!({"a": "x", "b": 6})),
        None,
    );
    assert_eq!(response.status, 400);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
}

#[test]
fn unknown_path_is_404_and_wrong_method_is_405() {
    let d = dispatcher();
    let missing = d.handle(&Request::new(Method::Get, "/todo/nothing"), None);
    assert_eq!(missing.status, 404);

    let wrong = d.handle(&Request::new(Method::Put, "/todo/item"), None);
    assert_eq!(wrong.status, 405);

    let op_get = d.handle(&Request::new(Method::Get, "/todo/stats"), None);
    assert_eq!(op_get.status, 405);
}

#[test]
fn hidden_models_are_not_routed() {
    let d = dispatcher();
    let response = d.handle(&Request::new(Method::Get, "/auth/session"), None);
    assert_eq!(response.status, 404);
}

fn login(d: &Dispatcher, email: &str) -> String {
    let registered = d.handle(
        &Request::new(Method::Post, "/auth/register")
            .with_body(json!({"email": email, "password": "hunter2"})),
        None,
    );
    assert_eq!(registered.status, 200, "{:?}", registered.body);

    let logged_in = d.handle(
        &Request::new(Method::Post, "/auth/login")
            .with_body(json!({"email": email, "password": "hunter2"})),
        None,
    );
    assert_eq!(logged_in.status, 200, "{:?}", logged_in.body);
    logged_in.body["token"].as_str().unwrap().to_string()
}

#[test]
fn auth_guard_and_per_user_cap() {
    let d = dispatcher();

    // Logged-out create on a guarded model fails with 401.
    let anonymous = d.handle(
        &Request::new(Method::Post, "/todo/note").with_body(json!({"text": "remember"})),
        None,
    );
    assert_eq!(anonymous.status, 401);
    assert_eq!(anonymous.body["code"], "AUTHENTICATION_ERROR");

    let token = login(&d, "ada@example.com");

    // First create succeeds and is stamped with the owner.
    let first = d.handle(
        &Request::new(Method::Post, "/todo/note").with_body(json!({"text": "remember"})),
        Some(token.clone()),
    );
    assert_eq!(first.status, 200, "{:?}", first.body);
    assert!(first.body["user_id"].as_str().is_some());

    // The cap is one per user; the second create fails with a
    // descriptive message.
    let second = d.handle(
        &Request::new(Method::Post, "/todo/note").with_body(json!({"text": "again"})),
        Some(token.clone()),
    );
    assert_eq!(second.status, 403);
    let message = second.body["message"].as_str().unwrap();
    assert!(message.contains("limit"), "{message}");

    // A different user has their own allowance.
    let other = login(&d, "grace@example.com");
    let theirs = d.handle(
        &Request::new(Method::Post, "/todo/note").with_body(json!({"text": "mine"})),
        Some(other),
    );
    assert_eq!(theirs.status, 200, "{:?}", theirs.body);
}

#[test]
fn wrong_password_is_rejected() {
    let d = dispatcher();
    login(&d, "ada@example.com");
    let response = d.handle(
        &Request::new(Method::Post, "/auth/login")
            .with_body(json!({"email": "ada@example.com", "password": "wrong"})),
        None,
    );
    assert_eq!(response.status, 401);
    assert_eq!(response.body["code"], "AUTHENTICATION_ERROR");
}

#[test]
fn logout_invalidates_the_session() {
    let d = dispatcher();
    let token = login(&d, "ada@example.com");

    let out = d.handle(&Request::new(Method::Post, "/auth/logout"), Some(token.clone()));
    assert_eq!(out.status, 200);
    assert_eq!(out.body["ok"], true);

    let after = d.handle(
        &Request::new(Method::Post, "/todo/note").with_body(json!({"text": "late"})),
        Some(token),
    );
    assert_eq!(after.status, 401);
}

#[test]
fn password_hash_never_leaves_the_api() {
    let d = dispatcher();
    login(&d, "ada@example.com");
    let users = d.handle(&Request::new(Method::Get, "/auth/user"), None);
    assert_eq!(users.status, 200);
    for user in users.body["items"].as_array().unwrap() {
        assert!(user.get("password_hash").is_none(), "{user}");
        assert!(user.get("email").is_some());
    }
}
