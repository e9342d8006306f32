// RPC Errors
// Front door failures and their HTTP replies

use crate::template::ExecuteTemplateReply;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_driver::{DriverError, ErrorKind};
use std::fmt;

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug)]
pub enum RpcError {
    ServiceError(String),
    InvalidRequest(String),
    InternalError(String),
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::ServiceError(_) | RpcError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::ServiceError(msg) => write!(f, "Driver execution failed: {}", msg),
            RpcError::InvalidRequest(msg) => write!(f, "{}", msg),
            RpcError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<DriverError> for RpcError {
    fn from(err: DriverError) -> Self {
        match err.kind() {
            ErrorKind::Validation => {
                RpcError::InvalidRequest(format!("Driver execution failed: {}", err))
            }
            _ => RpcError::ServiceError(err.to_string()),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status(), error = %self, "template request failed");
        (self.status(), Json(ExecuteTemplateReply::failed(self.to_string()))).into_response()
    }
}
