use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crewdesk_emergency::EmergencyError;

pub fn emergency_error_to_response(err: EmergencyError) -> axum::response::Response {
    match err {
        EmergencyError::InvalidOrExpiredToken => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_token", err.to_string())
        }
        EmergencyError::Validation { field, message } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            format!("{field}: {message}"),
        ),
        // Denials stay generic; which permission was missing never leaves
        // the server.
        EmergencyError::IssuerNotAuthorized | EmergencyError::RevokeNotAuthorized => forbidden(),
        EmergencyError::GrantNotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "grant not found")
        }
        EmergencyError::AlreadyRevoked => {
            json_error(StatusCode::CONFLICT, "conflict", "grant already revoked")
        }
        EmergencyError::Store(error) => {
            tracing::error!(%error, "grant store failure");
            internal_error()
        }
        EmergencyError::Audit(error) => {
            tracing::error!(%error, "audit store failure");
            internal_error()
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Uniform denial. Never names the permission or scope that failed.
pub fn forbidden() -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden")
}

/// Admission rejection for blocked or critically-scored sources. The score
/// and signals never leak.
pub fn restricted() -> axum::response::Response {
    json_error(
        StatusCode::FORBIDDEN,
        "restricted",
        "access from this network is temporarily restricted",
    )
}

pub fn unavailable() -> axum::response::Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "unavailable",
        "service temporarily unavailable",
    )
}

fn internal_error() -> axum::response::Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "store_error",
        "internal storage failure",
    )
}
