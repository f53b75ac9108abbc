//! # Warden
//!
//! Moderation-state engine for live multi-user session servers.
//!
//! Warden tracks punitive actions (bans, mutes, kicks, IP bans), free-text
//! notes, and graduated warnings against opaque player identities, and
//! answers the decision queries that gate session admission and chat.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                            Warden                             │
//! │  ┌────────────┐  ┌──────────┐  ┌──────┐      ┌─────────────┐  │
//! │  │ Punishment │  │ Warning  │  │ Alts │  ←→  │    Store    │  │
//! │  │   engine   │  │  engine  │  │      │      │ file │ sql  │  │
//! │  └────────────┘  └──────────┘  └──────┘      └─────────────┘  │
//! │        ↑ expiration sweep (periodic, own thread)              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! One storage contract, two interchangeable backends: JSON snapshots
//! behind a process-wide lock, or SQLite behind a bounded worker pool
//! with per-call deadlines. The backend is selected once at startup from
//! configuration.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden::{ConfigLoader, Moderation};
//!
//! let config = ConfigLoader::new().load()?;
//! let moderation = Moderation::open(&config, sessions, notifier)?;
//!
//! let target = warden::PlayerId::random();
//! moderation.punishments().ban(None, target, "cheating", None)?;
//! assert!(moderation.punishments().is_banned(target)?);
//!
//! moderation.shutdown()?;
//! ```

mod error;
mod moderation;

pub use error::{Result, WardenError};
pub use moderation::{Moderation, SessionDecision};

// Re-export the entity model
pub use warden_types::{
    Family, Note, NoteDraft, PlayerId, Punishment, PunishmentKind, Warning, WarningDraft,
};

// Re-export the engines and collaborator traits
pub use warden_engine::{
    AltEngine, EngineError, Escalation, EscalationThresholds, ExpirySweeper, NoteEngine,
    NotificationFanout, PunishmentEngine, SessionRegistry, SweepHandle, SweepReport,
    WarningEngine, perms,
};

// Re-export storage types for direct backend access
pub use warden_storage::{FileStore, SqlSettings, SqlStore, StorageError, Store};

// Re-export configuration
pub use warden_config::{BackendKind, ConfigError, ConfigLoader, WardenConfig};
