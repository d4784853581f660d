use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

use crate::API_VERSION;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("internal server error".to_string())
            }
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::InternalError(message)
            | Self::ValidationError(message)
            | Self::NotFound(message) => message,
        };

        let body = ErrorResponse {
            api_version: API_VERSION,
            error: ErrorBody {
                code: status.as_u16(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    api_version: &'static str,
    error: ErrorBody,
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    code: u16,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn app_errors_map_to_client_or_server_errors() {
        let api_error = ApiError::from(AppError::NotFound("package not found".to_string()));
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "package not found"));

        let api_error = ApiError::from(AppError::Validation("invalid perPage".to_string()));
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "invalid perPage"));

        let api_error = ApiError::from(AppError::Io(std::io::Error::other("disk on fire")));
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::InternalError("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::ValidationError("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn error_envelope_carries_version_code_and_message() {
        let response = ApiError::ValidationError("invalid sort".into()).into_response();

        assert_eq!(
            body_json(response).await,
            json!({
                "apiVersion": "2.0.0",
                "error": { "code": 400, "message": "invalid sort" }
            })
        );
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let response = ApiError::from(AppError::InternalError("db password incorrect".into()))
            .into_response();

        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "internal server error");
    }
}
