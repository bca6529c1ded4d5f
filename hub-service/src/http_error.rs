use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use hub_core::error::ValidationError;
use hub_core::HubError;
use serde_json::json;

/// Translates a `HubError` to its wire status code and body, the single
/// point where the core's typed taxonomy meets HTTP (§7). Driver failures
/// are logged with full detail and never echoed to the client.
pub fn response_for(principal: &str, path: &str, err: &HubError) -> HttpResponse {
    let (status, message) = match err {
        HubError::Validation(ValidationError::InvalidPrincipal)
        | HubError::Validation(ValidationError::InvalidPath) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        HubError::Validation(_) => (StatusCode::UNAUTHORIZED, err.to_string()),
        HubError::NotEnoughProof => (StatusCode::PAYMENT_REQUIRED, err.to_string()),
        HubError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()),
        HubError::DoesNotExist(_) => (StatusCode::NOT_FOUND, err.to_string()),
        HubError::ConflictingName(_) => (StatusCode::FORBIDDEN, err.to_string()),
        HubError::Driver(detail) => {
            tracing::error!(principal, path, detail, "driver error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    };

    if status != StatusCode::INTERNAL_SERVER_ERROR {
        tracing::warn!(principal, path, status = status.as_u16(), %err, "request rejected");
    }

    HttpResponse::build(status).json(json!({ "error": message }))
}
