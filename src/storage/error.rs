//! Error type shared by every storage backend and the streaming bridge

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The filesystem step that failed, carried by [`StorageError::Io`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStep {
    CreateDirectory,
    CreateArtifact,
    WriteArtifact,
    SyncArtifact,
    RenameArtifact,
    OpenObject,
    ReadObject,
    RemoveObject,
}

impl fmt::Display for IoStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            IoStep::CreateDirectory => "create directory",
            IoStep::CreateArtifact => "create artifact",
            IoStep::WriteArtifact => "write artifact",
            IoStep::SyncArtifact => "sync artifact",
            IoStep::RenameArtifact => "rename artifact",
            IoStep::OpenObject => "open object",
            IoStep::ReadObject => "read object",
            IoStep::RemoveObject => "remove object",
        };
        f.write_str(step)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    /// Rejected before any filesystem work happened
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("failed to {step} {}: {source}", .path.display())]
    Io {
        step: IoStep,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The upload body grew past the configured limit
    #[error("payload exceeds the limit of {0} bytes")]
    PayloadTooLarge(u64),

    /// The content stream feeding a save failed or was cut off
    #[error("content stream failed: {0}")]
    Stream(#[source] io::Error),

    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    pub(crate) fn io(step: IoStep, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            step,
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl ResponseError for StorageError {
    fn status_code(&self) -> StatusCode {
        match self {
            StorageError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal details stay in the log, the client only sees the category.
        let body = match self {
            StorageError::InvalidInput(_)
            | StorageError::NotFound(_)
            | StorageError::PayloadTooLarge(_) => self.to_string(),
            _ => "internal storage error".to_string(),
        };
        HttpResponse::build(self.status_code()).body(body)
    }
}
