//! Structured error responses.
//!
//! # Responsibilities
//! - Shape every user-visible error the same way clients already parse
//! - Map errors to HTTP status codes
//!
//! # Design Decisions
//! - Error codes use the dotted namespace clients match on
//! - Numeric codes are stable identifiers, independent of the HTTP status

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub const NOT_FOUND_CODE: &str = "errors.com.epicgames.common.not_found";
pub const NOT_FOUND_NUMERIC: u32 = 1004;

/// A structured error body plus its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error_code: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub message_vars: Vec<String>,
    pub numeric_error_code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originating_service: Option<String>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    pub fn new(
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        numeric_error_code: u32,
        status: StatusCode,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            error_message: error_message.into(),
            message_vars: Vec::new(),
            numeric_error_code,
            originating_service: None,
            status,
        }
    }

    pub fn not_found() -> Self {
        Self::new(
            NOT_FOUND_CODE,
            "Sorry the resource you were trying to find could not be found",
            NOT_FOUND_NUMERIC,
            StatusCode::NOT_FOUND,
        )
    }

    pub fn with_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_vars = vars.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.originating_service = Some(service.into());
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.error_code, self.numeric_error_code, self.error_message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
