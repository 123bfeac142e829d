use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Error body shared by all endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn not_found(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_carry_status_and_message() {
        let (status, body) = bad_request("stop_id is required");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "stop_id is required");

        let (status, _) = not_found("no such stop");
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = internal_error("unexpected");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
