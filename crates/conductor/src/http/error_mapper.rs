use axum::{Json, response::IntoResponse};
use common::api::ErrorResponse;

use crate::error::AppError;

pub(crate) fn into_response(err: AppError) -> axum::response::Response {
    let body = Json(ErrorResponse {
        kind: err.code.to_string(),
        message: err.message,
    });
    (err.status, body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        into_response(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConductorError, ErrorKind};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn into_response_exposes_kind_and_message() {
        let response = into_response(AppError::bad_request("nope"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(payload, json!({"kind": "validation", "message": "nope"}));
    }

    #[tokio::test]
    async fn remote_errors_map_to_500() {
        let err = ConductorError::new(ErrorKind::Remote, "cannot start application");
        let response = into_response(AppError::from(err));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
