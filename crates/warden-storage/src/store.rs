//! The storage contract: one tagged union over the two backends.
//!
//! The backend is selected exactly once at startup (configuration decides
//! which constructor runs); everything above this type is backend-agnostic.
//! Both variants implement every operation with identical semantics; the
//! parity tests in `tests/contract.rs` are the executable statement of
//! that contract.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use warden_types::{
    Note, NoteDraft, PlayerId, Punishment, PunishmentKind, Warning, WarningDraft,
};

use crate::{FileStore, Result, SqlSettings, SqlStore};

/// A handle to the moderation dataset.
#[derive(Debug)]
pub enum Store {
    /// JSON-snapshot store guarded by a process-wide lock.
    File(FileStore),
    /// SQLite store driven through a bounded worker pool.
    Sql(SqlStore),
}

impl Store {
    /// Opens the file-backed store rooted at `data_dir`.
    pub fn file(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::File(FileStore::open(data_dir)?))
    }

    /// Opens the relational store described by `settings`.
    pub fn sql(settings: SqlSettings) -> Result<Self> {
        Ok(Self::Sql(SqlStore::open(settings)?))
    }

    /// Releases backend resources: the file store writes a final snapshot,
    /// the relational store drains its workers and drops the connection.
    pub fn close(&self) -> Result<()> {
        match self {
            Self::File(s) => s.close(),
            Self::Sql(s) => s.close(),
        }
    }

    // ------------------------------------------------------------------
    // Punishments
    // ------------------------------------------------------------------

    pub fn insert_punishment(&self, punishment: &Punishment) -> Result<()> {
        match self {
            Self::File(s) => s.insert_punishment(punishment),
            Self::Sql(s) => s.insert_punishment(punishment),
        }
    }

    /// The target's punishments that still carry the `active` flag. The
    /// backend applies this filter itself; wall-clock expiry is judged by
    /// the caller.
    pub fn punishments_for(&self, target: PlayerId) -> Result<Vec<Punishment>> {
        match self {
            Self::File(s) => s.punishments_for(target),
            Self::Sql(s) => s.punishments_for(target),
        }
    }

    /// Every punishment the given identity has issued, active or not.
    pub fn punishments_by_issuer(&self, issuer: PlayerId) -> Result<Vec<Punishment>> {
        match self {
            Self::File(s) => s.punishments_by_issuer(issuer),
            Self::Sql(s) => s.punishments_by_issuer(issuer),
        }
    }

    /// Active punishments recorded against a network address.
    pub fn punishments_by_address(&self, address: &str) -> Result<Vec<Punishment>> {
        match self {
            Self::File(s) => s.punishments_by_address(address),
            Self::Sql(s) => s.punishments_by_address(address),
        }
    }

    /// Soft-deletes the target's active punishments of one kind; returns
    /// the number of rows deactivated.
    pub fn deactivate_punishments(&self, target: PlayerId, kind: PunishmentKind) -> Result<usize> {
        match self {
            Self::File(s) => s.deactivate_punishments(target, kind),
            Self::Sql(s) => s.deactivate_punishments(target, kind),
        }
    }

    /// Soft-deletes every active IP ban recorded against the address,
    /// whichever target each row names.
    pub fn deactivate_address_bans(&self, address: &str) -> Result<usize> {
        match self {
            Self::File(s) => s.deactivate_address_bans(address),
            Self::Sql(s) => s.deactivate_address_bans(address),
        }
    }

    /// Full-dataset scan for active punishments whose expiry has passed.
    pub fn expired_punishments(&self, now: DateTime<Utc>) -> Result<Vec<Punishment>> {
        match self {
            Self::File(s) => s.expired_punishments(now),
            Self::Sql(s) => s.expired_punishments(now),
        }
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Stores the note and returns it with its backend-assigned identifier.
    pub fn insert_note(&self, draft: NoteDraft) -> Result<Note> {
        match self {
            Self::File(s) => s.insert_note(draft),
            Self::Sql(s) => s.insert_note(draft),
        }
    }

    /// Hard-deletes a note; returns whether anything was removed.
    pub fn remove_note(&self, target: PlayerId, id: i64) -> Result<bool> {
        match self {
            Self::File(s) => s.remove_note(target, id),
            Self::Sql(s) => s.remove_note(target, id),
        }
    }

    pub fn notes_for(&self, target: PlayerId) -> Result<Vec<Note>> {
        match self {
            Self::File(s) => s.notes_for(target),
            Self::Sql(s) => s.notes_for(target),
        }
    }

    pub fn note(&self, id: i64) -> Result<Option<Note>> {
        match self {
            Self::File(s) => s.note(id),
            Self::Sql(s) => s.note(id),
        }
    }

    // ------------------------------------------------------------------
    // Warnings
    // ------------------------------------------------------------------

    /// Stores the warning and returns it with its backend-assigned
    /// identifier.
    pub fn insert_warning(&self, draft: WarningDraft) -> Result<Warning> {
        match self {
            Self::File(s) => s.insert_warning(draft),
            Self::Sql(s) => s.insert_warning(draft),
        }
    }

    /// Soft-deletes a warning; false when no active warning with that
    /// identifier exists for the target.
    pub fn deactivate_warning(&self, target: PlayerId, id: i64) -> Result<bool> {
        match self {
            Self::File(s) => s.deactivate_warning(target, id),
            Self::Sql(s) => s.deactivate_warning(target, id),
        }
    }

    /// The target's warnings, active and inactive.
    pub fn warnings_for(&self, target: PlayerId) -> Result<Vec<Warning>> {
        match self {
            Self::File(s) => s.warnings_for(target),
            Self::Sql(s) => s.warnings_for(target),
        }
    }

    pub fn warning(&self, id: i64) -> Result<Option<Warning>> {
        match self {
            Self::File(s) => s.warning(id),
            Self::Sql(s) => s.warning(id),
        }
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    pub fn address_of(&self, identity: PlayerId) -> Result<Option<String>> {
        match self {
            Self::File(s) => s.address_of(identity),
            Self::Sql(s) => s.address_of(identity),
        }
    }

    /// Associates the identity with an address, replacing any previous
    /// association.
    pub fn record_address(&self, identity: PlayerId, address: &str) -> Result<()> {
        match self {
            Self::File(s) => s.record_address(identity, address),
            Self::Sql(s) => s.record_address(identity, address),
        }
    }

    /// All identities currently associated with the address.
    pub fn identities_at(&self, address: &str) -> Result<Vec<PlayerId>> {
        match self {
            Self::File(s) => s.identities_at(address),
            Self::Sql(s) => s.identities_at(address),
        }
    }
}
