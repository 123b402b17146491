//! Auth and sessions.
//!
//! Password hashes and access-token MACs are keyed blake3 over the
//! configured secret. An access token is `<session_id>.<mac>`; verification
//! recomputes the MAC, then checks the session row and its expiration.
//! The `auth.*` host functions registered here are what the builtin
//! module's op bodies call.

use std::sync::Arc;

use chrono::Duration;

use lingo::{HostParam, HostRegistry};
use mapp_core::{Ctx, MappError, Record, Storage, Value, ValueType};

const USER_TABLE: &str = "auth_user";
const SESSION_TABLE: &str = "auth_session";

const PASSWORD_CONTEXT: &str = "mapp auth password v1";
const TOKEN_CONTEXT: &str = "mapp auth token v1";

pub struct AuthService {
    secret: String,
    expiration_minutes: i64,
}

impl AuthService {
    pub fn new(secret: &str, expiration_minutes: i64) -> Self {
        Self { secret: secret.to_string(), expiration_minutes }
    }

    fn key(&self, context: &str) -> [u8; 32] {
        blake3::derive_key(context, self.secret.as_bytes())
    }

    fn password_hash(&self, email: &str, password: &str) -> String {
        let key = self.key(PASSWORD_CONTEXT);
        let material = format!("{email}:{password}");
        blake3::keyed_hash(&key, material.as_bytes()).to_hex().to_string()
    }

    fn token_mac(&self, session_id: &str) -> String {
        let key = self.key(TOKEN_CONTEXT);
        blake3::keyed_hash(&key, session_id.as_bytes()).to_hex().to_string()
    }

    fn mint_token(&self, session_id: &str) -> String {
        format!("{session_id}.{}", self.token_mac(session_id))
    }

    /// Split and MAC-check a presented token. Returns the session id.
    fn check_token(&self, token: &str) -> Option<String> {
        let (session_id, mac) = token.split_once('.')?;
        if self.token_mac(session_id) == mac {
            Some(session_id.to_string())
        } else {
            None
        }
    }

    pub fn register(&self, ctx: &Ctx, email: &str, password: &str) -> Result<Value, MappError> {
        let storage = storage(ctx)?;
        if storage
            .find_by(USER_TABLE, "email", &Value::Str(email.to_string()))?
            .is_some()
        {
            return Err(MappError::RequestError {
                status: 409,
                message: format!("{email} is already registered"),
            });
        }

        let mut user = Record::new();
        user.insert("email".to_string(), Value::Str(email.to_string()));
        user.insert(
            "password_hash".to_string(),
            Value::Str(self.password_hash(email, password)),
        );
        user.insert("created_at".to_string(), Value::Datetime(ctx.clock.now()));
        let stored = storage.insert(USER_TABLE, &user)?;

        let user_id = record_id(&stored)?;
        tracing::info!(user = %user_id, "registered");
        Ok(struct_value(&[("user_id", Value::Str(user_id))]))
    }

    pub fn login(&self, ctx: &Ctx, email: &str, password: &str) -> Result<Value, MappError> {
        let storage = storage(ctx)?;
        let user = storage
            .find_by(USER_TABLE, "email", &Value::Str(email.to_string()))?
            .ok_or_else(|| MappError::Authentication("unknown email or password".to_string()))?;

        let presented = self.password_hash(email, password);
        match user.get("password_hash") {
            Some(Value::Str(stored_hash)) if *stored_hash == presented => {}
            _ => return Err(MappError::Authentication("unknown email or password".to_string())),
        }

        let user_id = record_id(&user)?;
        let expires_at = ctx.clock.now() + Duration::minutes(self.expiration_minutes);
        let mut session = Record::new();
        // The token column stores only the MAC'd session id; the session
        // row id is the token's first half.
        session.insert("user_id".to_string(), Value::Str(user_id.clone()));
        session.insert("expires_at".to_string(), Value::Datetime(expires_at));
        session.insert("token".to_string(), Value::Str(String::new()));
        let stored = storage.insert(SESSION_TABLE, &session)?;
        let session_id = record_id(&stored)?;

        let token = self.mint_token(&session_id);
        let mut updated = stored.clone();
        updated.insert("token".to_string(), Value::Str(self.token_mac(&session_id)));
        storage.update(SESSION_TABLE, &session_id, &updated)?;

        tracing::info!(user = %user_id, "logged in");
        Ok(struct_value(&[("token", Value::Str(token))]))
    }

    pub fn logout(&self, ctx: &Ctx) -> Result<Value, MappError> {
        let storage = storage(ctx)?;
        if let Some(token) = &ctx.access_token {
            if let Some(session_id) = self.check_token(token) {
                storage.delete(SESSION_TABLE, &session_id)?;
            }
        }
        Ok(struct_value(&[("ok", Value::Bool(true))]))
    }

    /// Resolve the current user id, if the presented token maps to a
    /// live, unexpired session. Absent or invalid tokens resolve to
    /// `None`; the dispatcher decides whether that is an error.
    pub fn current_user(&self, ctx: &Ctx) -> Result<Option<String>, MappError> {
        let Some(token) = &ctx.access_token else {
            return Ok(None);
        };
        let Some(session_id) = self.check_token(token) else {
            return Ok(None);
        };
        let storage = storage(ctx)?;
        // Specs built without the auth module have no session table; a
        // presented token is then simply anonymous.
        let session = match storage.get(SESSION_TABLE, &session_id) {
            Ok(Some(session)) => session,
            Ok(None) | Err(MappError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        if let Some(Value::Datetime(expires_at)) = session.get("expires_at") {
            if *expires_at < ctx.clock.now() {
                storage.delete(SESSION_TABLE, &session_id)?;
                return Ok(None);
            }
        }
        match session.get("user_id") {
            Some(Value::Str(user_id)) => Ok(Some(user_id.clone())),
            _ => Ok(None),
        }
    }

    /// Register the `auth.*` host functions backing the builtin module's
    /// ops. Must run before the registry is frozen.
    pub fn install(self: &Arc<Self>, registry: &mut HostRegistry) {
        let service = self.clone();
        registry.register(
            "auth.register",
            vec![str_param("email"), str_param("password")],
            false,
            move |ctx, args| {
                let (email, password) = two_strings(args)?;
                service.register(ctx, &email, &password)
            },
        );

        let service = self.clone();
        registry.register(
            "auth.login",
            vec![str_param("email"), str_param("password")],
            false,
            move |ctx, args| {
                let (email, password) = two_strings(args)?;
                service.login(ctx, &email, &password)
            },
        );

        let service = self.clone();
        registry.register("auth.logout", vec![], false, move |ctx, _| service.logout(ctx));

        let service = self.clone();
        registry.register("auth.current_user", vec![], false, move |ctx, _| {
            match service.current_user(ctx)? {
                Some(user_id) => Ok(Value::Str(user_id)),
                None => Ok(Value::Null),
            }
        });
    }
}

fn str_param(name: &'static str) -> HostParam {
    HostParam { name, ty: ValueType::Str }
}

fn two_strings(args: &[Value]) -> Result<(String, String), MappError> {
    match (args.first(), args.get(1)) {
        (Some(Value::Str(a)), Some(Value::Str(b))) => Ok((a.clone(), b.clone())),
        _ => Err(MappError::TypeError("expected (str, str)".to_string())),
    }
}

fn storage(ctx: &Ctx) -> Result<Arc<dyn Storage>, MappError> {
    ctx.storage
        .clone()
        .ok_or_else(|| MappError::ServerError("no storage attached to ctx".to_string()))
}

fn record_id(record: &Record) -> Result<String, MappError> {
    match record.get("id") {
        Some(Value::Str(id)) => Ok(id.clone()),
        _ => Err(MappError::ServerError("stored record has no id".to_string())),
    }
}

fn struct_value(pairs: &[(&str, Value)]) -> Value {
    Value::Struct(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_is_keyed_and_salted_by_email() {
        let auth = AuthService::new("secret-a", 60);
        let other = AuthService::new("secret-b", 60);
        let hash = auth.password_hash("a@example.com", "pw");
        assert_ne!(hash, auth.password_hash("b@example.com", "pw"));
        assert_ne!(hash, other.password_hash("a@example.com", "pw"));
        assert_eq!(hash, auth.password_hash("a@example.com", "pw"));
    }

    #[test]
    fn test_token_roundtrip_and_tamper_detection() {
        let auth = AuthService::new("secret", 60);
        let token = auth.mint_token("session-1");
        assert_eq!(auth.check_token(&token), Some("session-1".to_string()));
        let tampered = token.replace("session-1", "session-2");
        assert_eq!(auth.check_token(&tampered), None);
        assert_eq!(auth.check_token("garbage"), None);
    }
}
