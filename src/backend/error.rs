//! Error types for search backend operations

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors returned by a [`SearchBackend`](super::SearchBackend)
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Network or connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The backend answered with a non-success status
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    /// Index or alias not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A create-only write hit an existing document
    #[error("Document {id} already exists in {index}")]
    DocumentConflict { index: String, id: String },

    /// A bulk item failed for a reason other than a conflict
    #[error("Bulk write to {index} failed for document {id}: {reason}")]
    BulkItem {
        index: String,
        id: String,
        reason: String,
    },

    /// The scroll cursor expired or is unknown to the backend
    #[error("Scroll cursor expired or unknown: {0}")]
    ScrollExpired(String),

    /// The index is closed and cannot serve the operation
    #[error("Index is closed: {0}")]
    IndexClosed(String),

    /// Response body could not be decoded
    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether the backend understood the request and refused it.
    ///
    /// Client-side (4xx) refusals are things like incompatible mapping changes;
    /// they can be reported and the run continued. Everything else is a
    /// transport or protocol failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BackendError::Status { status, .. } if (400..500).contains(status) && *status != 404)
    }

    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Transport(_) => "transport",
            BackendError::Timeout(_) => "timeout",
            BackendError::Status { .. } => "status",
            BackendError::NotFound(_) => "not_found",
            BackendError::DocumentConflict { .. } => "document_conflict",
            BackendError::BulkItem { .. } => "bulk_item",
            BackendError::ScrollExpired(_) => "scroll_expired",
            BackendError::IndexClosed(_) => "index_closed",
            BackendError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}
