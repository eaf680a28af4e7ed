//! Uniform JSON response envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::AppError;

/// `{ success, message, data }` body shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    /// `false` maps to a 500 status.
    pub success: bool,
    /// Short human-readable summary.
    pub message: String,
    /// Endpoint-specific payload.
    pub data: Value,
}

impl ApiResponse {
    /// 200 response.
    #[must_use]
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    /// 500 response.
    #[must_use]
    pub fn failure(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self)).into_response()
    }
}

/// An [`AppError`] raised while serving a request, tagged with its txn id.
#[derive(Debug)]
pub struct ApiError {
    /// Underlying failure.
    pub error: AppError,
    /// Correlation id echoed in the body.
    pub txn_id: String,
}

impl ApiError {
    /// Tag `error` with `txn_id`.
    #[must_use]
    pub fn new(error: AppError, txn_id: impl Into<String>) -> Self {
        Self {
            error,
            txn_id: txn_id.into(),
        }
    }

    /// 400 for payload problems, 500 for everything downstream.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.error {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(txn_id = %self.txn_id, err = %self.error, "request failed");
        }
        let body = ApiResponse::failure(self.error.to_string(), json!({ "txnId": self.txn_id }));
        (status, Json(body)).into_response()
    }
}
