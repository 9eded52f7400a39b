//! API error handling: maps internal errors onto an HTTP status plus
//! a structured `{code, message}` JSON body.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("rejected: {0:?}")]
    Rejected(tessera_types::RejectReason),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> String {
        match self {
            ApiError::NotFound => "NOT_FOUND".to_string(),
            ApiError::BadRequest(_) => "BAD_REQUEST".to_string(),
            ApiError::Rejected(reason) => reason.as_str().to_string(),
            ApiError::Internal(_) => "INTERNAL".to_string(),
        }
    }
}

impl From<tessera_db::DbError> for ApiError {
    fn from(e: tessera_db::DbError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<tessera_queue::QueueError> for ApiError {
    fn from(e: tessera_queue::QueueError) -> Self {
        match e {
            tessera_queue::QueueError::DuplicateId => {
                ApiError::Rejected(tessera_types::RejectReason::DuplicateId)
            }
            tessera_queue::QueueError::NonceReused => {
                ApiError::Rejected(tessera_types::RejectReason::NonceReused)
            }
            tessera_queue::QueueError::Policy(reason) => ApiError::Rejected(reason),
            tessera_queue::QueueError::Db(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody { code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
