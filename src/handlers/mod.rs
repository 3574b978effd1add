pub mod scrape;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::any::Any;
use tracing::error;

use crate::metrics::EncodeError;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Fixed body for every internal failure; details only go to the log.
pub const INTERNAL_ERROR_BODY: &str = "Error generating metrics\n";

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    Encode(EncodeError),
    Internal(String),
}

impl From<EncodeError> for AppError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Encode(err) => error!(error = %err, "cannot encode metrics"),
            Self::Internal(msg) => error!(error = %msg, "internal error"),
        }
        internal_error()
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        INTERNAL_ERROR_BODY,
    )
        .into_response()
}

/// Turns a panic inside a handler into the same 500 an encode failure gets.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else {
        "unknown panic".to_owned()
    };
    AppError::Internal(detail).into_response()
}
