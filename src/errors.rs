use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;
use thiserror::Error;

use crate::upload::Category;

/// Request-level failures. Per-document upload failures are reported in the
/// submission body instead.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Internal server error")]
    Internal,
    #[error("File not found")]
    NotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Malformed document submission: {}", .0.body_text())]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            // 413 when the body limit is hit, 400 for broken framing
            ApiError::Multipart(e) => e.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Multipart(e) = &self {
            tracing::warn!("Rejected document submission: {}", e);
        }
        (self.status(), self.to_string()).into_response()
    }
}

/// Why a single document could not be stored.
///
/// Every variant names the category it was validating so the caller can pin
/// the message on the right form field. Messages never contain filesystem paths;
/// underlying I/O errors are only reachable through `source()`.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File too large for {category} (max {}MB)", .max / 1024 / 1024)]
    FileTooLarge {
        category: Category,
        size: u64,
        max: u64,
    },
    #[error("Invalid file type for {category}. Allowed: {}", .allowed.join(", "))]
    UnsupportedExtension {
        category: Category,
        extension: Option<String>,
        allowed: &'static [&'static str],
    },
    #[error("Upload storage is unavailable")]
    StorageUnavailable {
        category: Category,
        #[source]
        source: io::Error,
    },
    #[error("Failed to save {category} file")]
    WriteFailed {
        category: Category,
        #[source]
        source: io::Error,
    },
}

impl UploadError {
    pub fn category(&self) -> Category {
        match self {
            UploadError::FileTooLarge { category, .. }
            | UploadError::UnsupportedExtension { category, .. }
            | UploadError::StorageUnavailable { category, .. }
            | UploadError::WriteFailed { category, .. } => *category,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),
}
