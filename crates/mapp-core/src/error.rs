//! Unified error model.
//!
//! One closed set of error kinds for the whole engine. Adapters (SQL, HTTP,
//! file system) wrap their failures into these kinds at the boundary; the
//! dispatcher turns them into the wire envelope.

use std::collections::BTreeMap;

use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappError {
    #[error("unsupported spec version: {0}")]
    UnsupportedVersion(String),

    #[error("spec file not found: {0}")]
    SpecFileNotFound(String),

    #[error("model {0} declares no fields")]
    EmptyModel(String),

    #[error("duplicate name {name} in module {module}")]
    DuplicateName { module: String, name: String },

    #[error("invalid field {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("validation failed for {scope}")]
    Validation {
        scope: String,
        field_errors: BTreeMap<String, String>,
    },

    #[error("unknown lingo head: {0}")]
    UnknownOp(String),

    #[error("undefined binding: {0}")]
    UndefinedBinding(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("host function {name} failed: {cause}")]
    HostError { name: String, cause: String },

    #[error("op {0} uses a deprecated spec form; declare a lingo func")]
    DeprecatedOpSpec(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("{message}")]
    RequestError { status: u16, message: String },

    #[error("server error: {0}")]
    ServerError(String),

    #[error("cancelled")]
    Cancelled,
}

impl MappError {
    /// Wire code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            Self::SpecFileNotFound(_) => "SPEC_FILE_NOT_FOUND",
            Self::EmptyModel(_) => "EMPTY_MODEL",
            Self::DuplicateName { .. } => "DUPLICATE_NAME",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::UnknownOp(_) => "UNKNOWN_OP",
            Self::UndefinedBinding(_) => "UNDEFINED_BINDING",
            Self::TypeError(_) => "TYPE_ERROR",
            Self::HostError { .. } => "HOST_ERROR",
            Self::DeprecatedOpSpec(_) => "DEPRECATED_OP_SPEC",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::RequestError { .. } => "REQUEST_ERROR",
            Self::ServerError(_) => "INTERNAL_SERVER_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// HTTP status the dispatcher maps this error to.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation { .. }
            | Self::UnsupportedVersion(_)
            | Self::SpecFileNotFound(_)
            | Self::EmptyModel(_)
            | Self::DuplicateName { .. }
            | Self::InvalidField { .. }
            | Self::UnsupportedType(_)
            | Self::UnknownOp(_)
            | Self::UndefinedBinding(_)
            | Self::TypeError(_)
            | Self::DeprecatedOpSpec(_) => 400,
            Self::Authentication(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::RequestError { status, .. } => *status,
            Self::HostError { .. } | Self::ServerError(_) => 500,
            Self::Cancelled => 499,
        }
    }

    /// The JSON error envelope: `{code, message, field_errors?}`.
    /// Adapter failures keep their detail for logs (the `Display` impl)
    /// but cross the wire as a generic message.
    pub fn envelope(&self) -> serde_json::Value {
        match self {
            Self::Validation { field_errors, .. } => json!({
                "code": self.code(),
                "message": self.to_string(),
                "field_errors": field_errors,
            }),
            Self::ServerError(_) => json!({
                "code": self.code(),
                "message": "internal server error",
            }),
            _ => json!({
                "code": self.code(),
                "message": self.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = MappError::Validation {
            scope: "item".to_string(),
            field_errors: BTreeMap::new(),
        };
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "VALIDATION_ERROR");

        assert_eq!(MappError::NotFound("x".to_string()).status(), 404);
        assert_eq!(MappError::Authentication("login".to_string()).status(), 401);
        assert_eq!(MappError::ServerError("db".to_string()).status(), 500);
        assert_eq!(
            MappError::RequestError { status: 405, message: "method not allowed".to_string() }
                .status(),
            405
        );
    }

    #[test]
    fn test_server_error_detail_is_not_leaked() {
        let err = MappError::ServerError("UNIQUE constraint failed: users.email".to_string());
        let envelope = err.envelope();
        assert_eq!(envelope["message"], "internal server error");
        // The Display impl keeps the detail for logs.
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn test_envelope_carries_field_errors() {
        let mut field_errors = BTreeMap::new();
        field_errors.insert("age".to_string(), "expected int".to_string());
        let err = MappError::Validation { scope: "item".to_string(), field_errors };
        let envelope = err.envelope();
        assert_eq!(envelope["code"], "VALIDATION_ERROR");
        assert_eq!(envelope["field_errors"]["age"], "expected int");
    }
}
