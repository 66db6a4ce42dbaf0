//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use crate::orchestrator::error::OrchestrationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// All errors that can occur in the application are represented by this enum.
/// Each variant implements automatic conversion to HTTP responses via `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request query is empty or too long
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Configuration update was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The orchestration pipeline failed
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// File or directory was not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Path is invalid (e.g., escapes the reports directory)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Permission denied for the requested operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Path exists but is not a directory
    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            AppError::Orchestration(e) => match e {
                // Upstream model misbehaved or was unreachable
                OrchestrationError::Oracle(_)
                | OrchestrationError::RoutingParse(_)
                | OrchestrationError::SynthesisParse(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::FileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotADirectory(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
