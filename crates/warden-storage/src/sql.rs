//! Relational storage backed by a single managed SQLite connection.
//!
//! # Synchronization Protocol
//!
//! One `rusqlite::Connection` sits behind a mutex inside
//! [`ConnectionManager`]. A health check runs before every operation and
//! reopens the connection when the handle has gone bad. All operations are
//! submitted to a bounded worker pool; the calling thread blocks on the
//! reply with a fixed deadline and receives [`StorageError::Timeout`] when
//! it elapses. Writes wait for their acknowledgement like reads do, so a
//! read issued after a completed write always observes it.
//!
//! # Schema
//!
//! Four tables mirror the entity model (`punishments`, `notes`,
//! `warnings`, `addresses`), each with an auto-assigned identifier where
//! the model needs one, indexed to support the filtered queries of the
//! storage contract.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use warden_types::{
    Note, NoteDraft, PlayerId, Punishment, PunishmentKind, Warning, WarningDraft,
};

use crate::pool::WorkerPool;
use crate::{Result, StorageError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS punishments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target TEXT NOT NULL,
    kind TEXT NOT NULL,
    reason TEXT NOT NULL,
    issuer TEXT,
    issued_at INTEGER NOT NULL,
    expires_at INTEGER,
    address TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_punishments_target_active
    ON punishments (target, active);
CREATE INDEX IF NOT EXISTS idx_punishments_issuer
    ON punishments (issuer);
CREATE INDEX IF NOT EXISTS idx_punishments_address_active
    ON punishments (address, active);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target TEXT NOT NULL,
    issuer TEXT,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notes_target ON notes (target);

CREATE TABLE IF NOT EXISTS warnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target TEXT NOT NULL,
    issuer TEXT,
    reason TEXT NOT NULL,
    severity INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_warnings_target ON warnings (target);

CREATE TABLE IF NOT EXISTS addresses (
    identity TEXT PRIMARY KEY,
    address TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_addresses_address ON addresses (address);
";

const PUNISHMENT_COLUMNS: &str =
    "target, kind, reason, issuer, issued_at, expires_at, address, active";

/// Tuning for the relational backend.
#[derive(Debug, Clone)]
pub struct SqlSettings {
    /// Location of the SQLite database file.
    pub path: PathBuf,
    /// Worker threads draining the operation queue.
    pub workers: usize,
    /// How long a caller waits for an operation before it times out.
    pub call_deadline: Duration,
    /// Capacity of the bounded operation queue.
    pub queue_capacity: usize,
}

impl SqlSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workers: 2,
            call_deadline: Duration::from_secs(5),
            queue_capacity: 64,
        }
    }
}

/// Owns the connection handle and reopens it when it goes bad.
struct ConnectionManager {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            conn: Mutex::new(None),
        }
    }

    /// Runs `op` against a healthy connection, reconnecting first if the
    /// current handle fails its health check.
    fn with_conn<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut slot = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(conn) = slot.as_ref() {
            if let Err(error) = ping(conn) {
                tracing::warn!(%error, "connection failed its health check; reconnecting");
                *slot = None;
            }
        }

        if slot.is_none() {
            *slot = Some(self.open()?);
        }

        match slot.as_ref() {
            Some(conn) => op(conn),
            None => Err(StorageError::Closed),
        }
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %self.path.display(), "relational store connected");
        Ok(conn)
    }

    fn close(&self) {
        let mut slot = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }
}

fn ping(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
}

/// Relational storage backend.
pub struct SqlStore {
    manager: Arc<ConnectionManager>,
    pool: WorkerPool,
}

impl std::fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStore")
            .field("path", &self.manager.path)
            .field("deadline", &self.pool.deadline())
            .finish()
    }
}

impl SqlStore {
    /// Opens the database, creating the schema when missing, and starts
    /// the worker pool. The initial connection is established eagerly so a
    /// bad location fails at open rather than on first use.
    pub fn open(settings: SqlSettings) -> Result<Self> {
        let manager = Arc::new(ConnectionManager::new(settings.path));
        let pool = WorkerPool::start(
            "warden-sql",
            settings.workers,
            settings.queue_capacity,
            settings.call_deadline,
        )?;
        let store = Self { manager, pool };
        store.call(|_conn| Ok(()))?;
        Ok(store)
    }

    /// Stops the worker pool and releases the connection.
    pub fn close(&self) -> Result<()> {
        self.pool.shutdown();
        self.manager.close();
        Ok(())
    }

    fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        self.pool.call(move || manager.with_conn(op))
    }

    // ------------------------------------------------------------------
    // Punishments
    // ------------------------------------------------------------------

    pub fn insert_punishment(&self, punishment: &Punishment) -> Result<()> {
        let p = punishment.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO punishments
                 (target, kind, reason, issuer, issued_at, expires_at, address, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    p.target.to_string(),
                    p.kind.as_str(),
                    p.reason,
                    p.issuer.map(|i| i.to_string()),
                    p.issued_at.timestamp_millis(),
                    p.expires_at.map(|at| at.timestamp_millis()),
                    p.address,
                    p.active,
                ],
            )?;
            Ok(())
        })
    }

    /// Returns the target's punishments with the `active` flag still set.
    pub fn punishments_for(&self, target: PlayerId) -> Result<Vec<Punishment>> {
        self.call(move |conn| {
            collect_punishments(
                conn,
                &format!(
                    "SELECT {PUNISHMENT_COLUMNS} FROM punishments
                     WHERE target = ?1 AND active = 1 ORDER BY id"
                ),
                params![target.to_string()],
            )
        })
    }

    /// Returns every punishment issued by the given identity, active or not.
    pub fn punishments_by_issuer(&self, issuer: PlayerId) -> Result<Vec<Punishment>> {
        self.call(move |conn| {
            collect_punishments(
                conn,
                &format!(
                    "SELECT {PUNISHMENT_COLUMNS} FROM punishments
                     WHERE issuer = ?1 ORDER BY id"
                ),
                params![issuer.to_string()],
            )
        })
    }

    /// Returns active punishments recorded against the given address.
    pub fn punishments_by_address(&self, address: &str) -> Result<Vec<Punishment>> {
        let address = address.to_string();
        self.call(move |conn| {
            collect_punishments(
                conn,
                &format!(
                    "SELECT {PUNISHMENT_COLUMNS} FROM punishments
                     WHERE address = ?1 AND active = 1 ORDER BY id"
                ),
                params![address],
            )
        })
    }

    pub fn deactivate_punishments(&self, target: PlayerId, kind: PunishmentKind) -> Result<usize> {
        self.call(move |conn| {
            let count = conn.execute(
                "UPDATE punishments SET active = 0
                 WHERE target = ?1 AND kind = ?2 AND active = 1",
                params![target.to_string(), kind.as_str()],
            )?;
            Ok(count)
        })
    }

    pub fn deactivate_address_bans(&self, address: &str) -> Result<usize> {
        let address = address.to_string();
        self.call(move |conn| {
            let count = conn.execute(
                "UPDATE punishments SET active = 0
                 WHERE address = ?1 AND kind = ?2 AND active = 1",
                params![address, PunishmentKind::IpBan.as_str()],
            )?;
            Ok(count)
        })
    }

    pub fn expired_punishments(&self, now: DateTime<Utc>) -> Result<Vec<Punishment>> {
        self.call(move |conn| {
            collect_punishments(
                conn,
                &format!(
                    "SELECT {PUNISHMENT_COLUMNS} FROM punishments
                     WHERE active = 1 AND expires_at IS NOT NULL AND expires_at <= ?1
                     ORDER BY id"
                ),
                params![now.timestamp_millis()],
            )
        })
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    pub fn insert_note(&self, draft: NoteDraft) -> Result<Note> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO notes (target, issuer, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    draft.target.to_string(),
                    draft.issuer.map(|i| i.to_string()),
                    draft.content,
                    draft.created_at.timestamp_millis(),
                ],
            )?;
            Ok(Note::from_draft(conn.last_insert_rowid(), draft))
        })
    }

    pub fn remove_note(&self, target: PlayerId, id: i64) -> Result<bool> {
        self.call(move |conn| {
            let count = conn.execute(
                "DELETE FROM notes WHERE id = ?1 AND target = ?2",
                params![id, target.to_string()],
            )?;
            Ok(count > 0)
        })
    }

    pub fn notes_for(&self, target: PlayerId) -> Result<Vec<Note>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, target, issuer, content, created_at
                 FROM notes WHERE target = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![target.to_string()], note_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)
        })
    }

    pub fn note(&self, id: i64) -> Result<Option<Note>> {
        self.call(move |conn| {
            conn.query_row(
                "SELECT id, target, issuer, content, created_at
                 FROM notes WHERE id = ?1",
                params![id],
                note_from_row,
            )
            .optional()
            .map_err(StorageError::from)
        })
    }

    // ------------------------------------------------------------------
    // Warnings
    // ------------------------------------------------------------------

    pub fn insert_warning(&self, draft: WarningDraft) -> Result<Warning> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO warnings (target, issuer, reason, severity, created_at, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![
                    draft.target.to_string(),
                    draft.issuer.map(|i| i.to_string()),
                    draft.reason,
                    i64::from(draft.severity),
                    draft.created_at.timestamp_millis(),
                ],
            )?;
            Ok(Warning::from_draft(conn.last_insert_rowid(), draft))
        })
    }

    pub fn deactivate_warning(&self, target: PlayerId, id: i64) -> Result<bool> {
        self.call(move |conn| {
            let count = conn.execute(
                "UPDATE warnings SET active = 0
                 WHERE id = ?1 AND target = ?2 AND active = 1",
                params![id, target.to_string()],
            )?;
            Ok(count > 0)
        })
    }

    pub fn warnings_for(&self, target: PlayerId) -> Result<Vec<Warning>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, target, issuer, reason, severity, created_at, active
                 FROM warnings WHERE target = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![target.to_string()], warning_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)
        })
    }

    pub fn warning(&self, id: i64) -> Result<Option<Warning>> {
        self.call(move |conn| {
            conn.query_row(
                "SELECT id, target, issuer, reason, severity, created_at, active
                 FROM warnings WHERE id = ?1",
                params![id],
                warning_from_row,
            )
            .optional()
            .map_err(StorageError::from)
        })
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    pub fn address_of(&self, identity: PlayerId) -> Result<Option<String>> {
        self.call(move |conn| {
            conn.query_row(
                "SELECT address FROM addresses WHERE identity = ?1",
                params![identity.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)
        })
    }

    pub fn record_address(&self, identity: PlayerId, address: &str) -> Result<()> {
        let address = address.to_string();
        self.call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO addresses (identity, address) VALUES (?1, ?2)",
                params![identity.to_string(), address],
            )?;
            Ok(())
        })
    }

    pub fn identities_at(&self, address: &str) -> Result<Vec<PlayerId>> {
        let address = address.to_string();
        self.call(move |conn| {
            let mut stmt = conn
                .prepare("SELECT identity FROM addresses WHERE address = ?1 ORDER BY identity")?;
            let rows = stmt.query_map(params![address], |row| {
                let identity: String = row.get(0)?;
                parse_player(0, &identity)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)
        })
    }
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

fn collect_punishments(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Punishment>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, punishment_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(StorageError::from)
}

fn punishment_from_row(row: &Row<'_>) -> rusqlite::Result<Punishment> {
    let target: String = row.get("target")?;
    let kind: String = row.get("kind")?;
    let issuer: Option<String> = row.get("issuer")?;
    let expires_at: Option<i64> = row.get("expires_at")?;

    Ok(Punishment {
        target: parse_player(0, &target)?,
        kind: kind
            .parse::<PunishmentKind>()
            .map_err(|e| conversion_error(1, e))?,
        reason: row.get("reason")?,
        issued_at: datetime_from_millis(4, row.get("issued_at")?)?,
        expires_at: expires_at
            .map(|ms| datetime_from_millis(5, ms))
            .transpose()?,
        issuer: issuer.as_deref().map(|s| parse_player(3, s)).transpose()?,
        address: row.get("address")?,
        active: row.get("active")?,
    })
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    let target: String = row.get("target")?;
    let issuer: Option<String> = row.get("issuer")?;
    Ok(Note {
        id: row.get("id")?,
        target: parse_player(1, &target)?,
        issuer: issuer.as_deref().map(|s| parse_player(2, s)).transpose()?,
        content: row.get("content")?,
        created_at: datetime_from_millis(4, row.get("created_at")?)?,
    })
}

fn warning_from_row(row: &Row<'_>) -> rusqlite::Result<Warning> {
    let target: String = row.get("target")?;
    let issuer: Option<String> = row.get("issuer")?;
    let severity: i64 = row.get("severity")?;
    Ok(Warning {
        id: row.get("id")?,
        target: parse_player(1, &target)?,
        issuer: issuer.as_deref().map(|s| parse_player(2, s)).transpose()?,
        reason: row.get("reason")?,
        severity: u8::try_from(severity)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(4, severity))?,
        created_at: datetime_from_millis(5, row.get("created_at")?)?,
        active: row.get("active")?,
    })
}

fn parse_player(idx: usize, value: &str) -> rusqlite::Result<PlayerId> {
    value.parse().map_err(|e| conversion_error(idx, e))
}

fn conversion_error(
    idx: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(error))
}

fn datetime_from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}
