//! Storage contract and backends for the moderation dataset.
//!
//! A single logical node owns the dataset; callers pick one of two
//! interchangeable backends at startup:
//!
//! - [`FileStore`]: four in-memory maps behind one process-wide
//!   reader/writer lock, snapshotted to JSON files on every mutation.
//! - [`SqlStore`]: a single managed SQLite connection driven through a
//!   bounded worker pool with per-call deadlines.
//!
//! [`Store`] is the tagged union the rest of the system programs against.
//! Every operation behaves identically on both backends; the contract
//! parity tests in `tests/contract.rs` hold both to the same behavior.
//!
//! # Error policy
//!
//! All operations return typed errors ([`StorageError`]); a timed-out
//! relational call surfaces [`StorageError::Timeout`], never an empty
//! result, so callers can tell "no data" from "operation failed". The one
//! deliberate exception is the file backend's load path: a missing or
//! malformed dataset file resets only that dataset to empty and logs a
//! warning, keeping the store usable after a partial corruption.

mod error;
mod file;
mod pool;
mod sql;
mod store;

pub use error::StorageError;
pub use file::FileStore;
pub use sql::{SqlSettings, SqlStore};
pub use store::Store;

pub type Result<T> = std::result::Result<T, StorageError>;
