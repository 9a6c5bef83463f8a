//! Error taxonomy shared by every layer of Blipper
//!
//! Failures are values: each remote or codec operation returns a
//! [`Result`], and the sync engine maps an error onto a failure state.

/// Result type for Blipper operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while talking to the remote or editing content
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("No access token is stored")]
    MissingCredential,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Response could not be decoded: {0}")]
    Decode(String),

    #[error("Response has an unexpected shape: {0}")]
    ShapeInvalid(String),

    #[error("Remote rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Content hash precondition failed for {path}")]
    ConcurrencyConflict { path: String },

    #[error("Image could not be decoded or encoded: {0}")]
    Encode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{intent} is not allowed while {state}")]
    InvalidIntent {
        intent: &'static str,
        state: &'static str,
    },

    #[error("Directory does not exist in the loaded tree: {0}")]
    UnknownDirectory(String),

    #[error("Invalid repository reference: {0}")]
    InvalidReference(String),
}

impl SyncError {
    /// Kebab-case category name, stable across message changes.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::MissingCredential => "missing-credential",
            SyncError::Transport(_) => "transport-failure",
            SyncError::Decode(_) => "decode-failure",
            SyncError::ShapeInvalid(_) => "shape-invalid",
            SyncError::Rejected { .. } => "rejected",
            SyncError::NotFound(_) => "not-found",
            SyncError::EmptyResult(_) => "empty-result",
            SyncError::ConcurrencyConflict { .. } => "concurrency-conflict",
            SyncError::Encode(_) => "encode-failure",
            SyncError::Storage(_) => "storage-failure",
            SyncError::InvalidIntent { .. } => "invalid-intent",
            SyncError::UnknownDirectory(_) => "unknown-directory",
            SyncError::InvalidReference(_) => "invalid-reference",
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}
