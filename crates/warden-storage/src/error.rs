//! Storage error taxonomy.
//!
//! Every variant here is producible: a malformed dataset file on the file
//! backend's load path is deliberately not one of them, since that path
//! resets the affected dataset and logs a warning instead of failing the
//! open.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure while loading or snapshotting a dataset.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The relational backend reported a failure.
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A call into the worker pool exceeded its deadline. Distinct from an
    /// empty result: the operation may or may not have run.
    #[error("storage call exceeded its {}ms deadline", .0.as_millis())]
    Timeout(Duration),

    /// The worker pool has been shut down; no further calls are possible.
    #[error("storage worker pool is shut down")]
    Closed,
}
