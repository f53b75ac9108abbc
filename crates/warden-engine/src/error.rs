//! Engine error taxonomy.
//!
//! The storage layer reports infrastructure failures; this enum covers the
//! domain outcomes on top of it: validation, conflicts, and not-found
//! signals that callers are expected to branch on.

use thiserror::Error;
use warden_storage::StorageError;
use warden_types::{Family, PlayerId};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The target already carries an active punishment of the same family.
    #[error("{target} already has an active {family} sanction")]
    AlreadySanctioned { target: PlayerId, family: Family },

    /// A reverse operation found no active punishment of the family.
    #[error("{target} has no active {family} sanction")]
    NotSanctioned { target: PlayerId, family: Family },

    /// The address already carries an active IP ban.
    #[error("{0} already has an active IP ban")]
    AddressAlreadyBanned(String),

    /// An IP unban found no active ban for the address.
    #[error("no active IP ban for {0}")]
    AddressNotBanned(String),

    /// A note removal named an identifier the target does not have.
    #[error("note {id} not found for {target}")]
    NoteNotFound { target: PlayerId, id: i64 },

    /// A warning removal named an identifier that is absent or already
    /// inactive.
    #[error("no active warning {id} for {target}")]
    WarningNotFound { target: PlayerId, id: i64 },

    /// Warning severity outside the accepted range.
    #[error("severity {0} is outside the accepted 1..=5 range")]
    SeverityOutOfRange(u8),

    /// A network address failed to parse.
    #[error("malformed network address: {0}")]
    InvalidAddress(String),

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
