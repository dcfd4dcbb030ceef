//! Error types for Kindling
//!
//! All errors in the federation pipeline are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Outside production the JSON envelope carries a `trace` field with the
/// full error chain. Set once at startup.
static VERBOSE_ERRORS: OnceLock<bool> = OnceLock::new();

pub fn set_verbose_errors(verbose: bool) {
    let _ = VERBOSE_ERRORS.set(verbose);
}

fn verbose_errors() -> bool {
    VERBOSE_ERRORS.get().copied().unwrap_or(false)
}

/// Application-wide error type
///
/// One variant per entry of the validation taxonomy, plus the usual
/// infrastructure failures. `ActorMissing` and `ObjectMissing` double as
/// control-flow signals inside the validation pipeline: an inbox activity
/// whose only failure is a missing actor is not rejected, it is surfaced so
/// the caller can synchronize the account first.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or unsupported shape (400)
    #[error("Not valid: {0}")]
    NotValid(String),

    /// No such local resource (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Blocklist hit, disallowed activity type, or bad method (405)
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Authorization failure (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Actor could not be resolved against local storage (potentially
    /// recoverable by synchronizing the account)
    #[error("actor does not exist on local instance: {iri}")]
    ActorMissing { iri: String },

    /// Referenced object could not be resolved locally
    #[error("object does not exist on local instance: {iri}")]
    ObjectMissing { iri: String },

    /// Independent actor/object sub-failures of one activity
    #[error("activity is missing: {}; {}", display_part(actor), display_part(object))]
    Activity {
        actor: Option<Box<AppError>>,
        object: Option<Box<AppError>>,
    },

    /// Storage failure from the external repository (500)
    #[error("Repository error: {0}")]
    Repository(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn display_part(part: &Option<Box<AppError>>) -> String {
    part.as_ref()
        .map_or_else(|| "-".to_string(), |e| e.to_string())
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotValid(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            // Unresolved references in an otherwise well-formed activity
            // read as a client-side problem.
            AppError::ActorMissing { .. }
            | AppError::ObjectMissing { .. }
            | AppError::Activity { .. } => StatusCode::BAD_REQUEST,
            AppError::Repository(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotValid(_) => "not_valid",
            AppError::NotFound(_) => "not_found",
            AppError::MethodNotAllowed(_) => "method_not_allowed",
            AppError::Forbidden(_) => "forbidden",
            AppError::ActorMissing { .. } => "actor_missing",
            AppError::ObjectMissing { .. } => "object_missing",
            AppError::Activity { .. } => "activity",
            AppError::Repository(_) => "repository",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Caller-facing message. Storage detail never leaks past a generic line.
    fn public_message(&self) -> String {
        match self {
            AppError::Repository(_) => "storage error".to_string(),
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Renders the JSON error envelope `{"status": .., "errors": [..]}`.
    /// Sub-failures of a composite activity error are listed individually.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status();

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        let mut errors = Vec::new();
        if let AppError::Activity { actor, object } = &self {
            if let Some(actor) = actor {
                errors.push(serde_json::json!({ "message": actor.public_message() }));
            }
            if let Some(object) = object {
                errors.push(serde_json::json!({ "message": object.public_message() }));
            }
        }
        if errors.is_empty() {
            errors.push(serde_json::json!({ "message": self.public_message() }));
        }

        let mut body = serde_json::json!({
            "status": status.as_u16(),
            "errors": errors,
        });
        if verbose_errors() {
            body["trace"] = serde_json::Value::String(format!("{self:?}"));
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
