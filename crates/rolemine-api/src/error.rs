use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rolemine_core::RoleMineError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    RoleMine(#[from] RoleMineError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::RoleMine(err) => err.kind(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::RoleMine(err) => match err {
                RoleMineError::Validation(_) | RoleMineError::InvalidOperation(_) => {
                    StatusCode::BAD_REQUEST
                }
                RoleMineError::NotFound(_) => StatusCode::NOT_FOUND,
                RoleMineError::RetryExhausted(_)
                | RoleMineError::ResponseParse(_)
                | RoleMineError::Llm(_) => StatusCode::BAD_GATEWAY,
                RoleMineError::Io(_) | RoleMineError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
