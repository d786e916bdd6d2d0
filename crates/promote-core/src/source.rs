//! Collaborator seams: where work items come from and where updates go.
//!
//! The tree builder and pipeline only talk to these traits. The CLI provides
//! the Azure DevOps implementation; tests use [`crate::memory`].

use crate::dispatch::PatchOp;
use crate::error::ErrorCode;
use crate::model::{Edge, WorkItemId, WorkItemRecord, WorkItemUpdate};

/// Errors raised by a [`WorkItemSource`].
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} returned HTTP {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Errors raised by a [`WorkItemSink`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("update of work item {id} failed: {message}")]
    Transport { id: WorkItemId, message: String },

    #[error("update of work item {id} rejected with HTTP {status}: {message}")]
    Rejected {
        id: WorkItemId,
        status: u16,
        message: String,
    },
}

impl SinkError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::PatchFailed
    }
}

/// Read side of the tracker.
pub trait WorkItemSource {
    /// Run a hierarchy query and return its flat parent→child link list.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport, HTTP status or decode failure.
    fn query_edges(&self, query: &str) -> Result<Vec<Edge>, SourceError>;

    /// Fetch full records for `ids`. Callers keep `ids` within the upstream
    /// page size; see [`crate::graph::batch`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport, HTTP status or decode failure.
    fn fetch_items(&self, ids: &[WorkItemId]) -> Result<Vec<WorkItemRecord>, SourceError>;

    /// Every revision of work item `id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport, HTTP status or decode failure.
    fn fetch_updates(&self, id: WorkItemId) -> Result<Vec<WorkItemUpdate>, SourceError>;
}

/// Write side of the tracker.
pub trait WorkItemSink {
    /// Apply `ops` to work item `id` as one request.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the request fails or is rejected.
    fn patch(&self, id: WorkItemId, ops: &[PatchOp]) -> Result<(), SinkError>;
}
