//! The JSON response envelope: `{ success, data | error, timestamp }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use qshield_keystore::KeystoreError;
use serde::Serialize;
use serde_json::json;

/// 200 with a data payload.
pub fn ok(data: impl Serialize) -> Response {
    envelope(StatusCode::OK, data)
}

/// 201 with a data payload.
pub fn created(data: impl Serialize) -> Response {
    envelope(StatusCode::CREATED, data)
}

fn envelope(status: StatusCode, data: impl Serialize) -> Response {
    (
        status,
        Json(json!({
            "success": true,
            "data": data,
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}

/// Error with a machine-readable code and a human-readable message.
pub fn fail(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": { "code": code, "message": message.into() },
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    fail(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn unauthorized(message: impl Into<String>) -> Response {
    fail(StatusCode::UNAUTHORIZED, "auth_required", message)
}

pub fn forbidden(message: impl Into<String>) -> Response {
    fail(StatusCode::FORBIDDEN, "insufficient_clearance", message)
}

pub fn not_found(message: impl Into<String>) -> Response {
    fail(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn conflict(code: &str, message: impl Into<String>) -> Response {
    fail(StatusCode::CONFLICT, code, message)
}

pub fn internal(message: impl Into<String>) -> Response {
    fail(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
}

/// Map a keystore error onto the HTTP status taxonomy.
pub fn keystore_error(e: &KeystoreError) -> Response {
    match e {
        KeystoreError::KeyNotFound(_)
        | KeystoreError::ThreatNotFound(_)
        | KeystoreError::ConfigNotFound(_)
        | KeystoreError::HistoryNotFound(_) => not_found(e.to_string()),
        KeystoreError::UnknownAlgorithm(_)
        | KeystoreError::UnsupportedKeySize { .. }
        | KeystoreError::AlgorithmPurposeMismatch { .. } => bad_request(e.to_string()),
        KeystoreError::AlreadySuperseded(_) => conflict("already_superseded", e.to_string()),
        KeystoreError::StorageError(_) => internal(e.to_string()),
    }
}
