//! # warden-types: Core types for Warden
//!
//! This crate contains the shared entity model used across the Warden system:
//! - Player identity ([`PlayerId`])
//! - Punitive actions ([`Punishment`], [`PunishmentKind`], [`Family`])
//! - Free-text annotations ([`Note`], [`NoteDraft`])
//! - Graduated warnings ([`Warning`], [`WarningDraft`])
//!
//! These are pure data types: construction, accessors, and expiry predicates.
//! All behavior (invariant enforcement, caching, escalation) lives in the
//! engine crates.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Opaque stable identifier for a player, independent of display name.
///
/// Identities are referenced by value everywhere; the engine never stores a
/// display name alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a fresh random identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PlayerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<PlayerId> for Uuid {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Punishments
// ============================================================================

/// The kinds of punitive action the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PunishmentKind {
    Ban,
    TempBan,
    IpBan,
    Mute,
    TempMute,
    Kick,
}

impl PunishmentKind {
    /// Returns the mutual-exclusion family this kind belongs to, if any.
    ///
    /// Ban and TempBan form one family, Mute and TempMute another: at most
    /// one punishment per family may be active against a target at a time.
    /// IP bans and kicks are not subject to the family check.
    pub fn family(self) -> Option<Family> {
        match self {
            Self::Ban | Self::TempBan => Some(Family::Ban),
            Self::Mute | Self::TempMute => Some(Family::Mute),
            Self::IpBan | Self::Kick => None,
        }
    }

    /// Stable lowercase name, used as the relational `kind` column value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::TempBan => "temp_ban",
            Self::IpBan => "ip_ban",
            Self::Mute => "mute",
            Self::TempMute => "temp_mute",
            Self::Kick => "kick",
        }
    }
}

impl Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunishmentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ban" => Ok(Self::Ban),
            "temp_ban" => Ok(Self::TempBan),
            "ip_ban" => Ok(Self::IpBan),
            "mute" => Ok(Self::Mute),
            "temp_mute" => Ok(Self::TempMute),
            "kick" => Ok(Self::Kick),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized punishment kind name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown punishment kind: {}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

/// A pair of punishment kinds treated as mutually exclusive for the
/// "already sanctioned" check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Ban and TempBan.
    Ban,
    /// Mute and TempMute.
    Mute,
}

impl Family {
    /// Both kinds in this family, permanent variant first.
    pub fn kinds(self) -> [PunishmentKind; 2] {
        match self {
            Self::Ban => [PunishmentKind::Ban, PunishmentKind::TempBan],
            Self::Mute => [PunishmentKind::Mute, PunishmentKind::TempMute],
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ban => f.write_str("ban"),
            Self::Mute => f.write_str("mute"),
        }
    }
}

/// A punitive action recorded against a player.
///
/// # Invariants
///
/// - `active` transitions true -> false exactly once (soft delete); a
///   deactivated punishment is never reactivated.
/// - `expires_at == None` means permanent, regardless of wall clock.
/// - `address` is set only for [`PunishmentKind::IpBan`].
///
/// Once inserted, the record is owned by the storage backend; engines hold
/// no mutable reference to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punishment {
    /// The punished identity.
    pub target: PlayerId,
    /// What kind of action this is.
    pub kind: PunishmentKind,
    /// Free-text reason shown to the target and to observers.
    pub reason: String,
    /// When the punishment was issued.
    pub issued_at: DateTime<Utc>,
    /// When the punishment lapses; `None` means never.
    pub expires_at: Option<DateTime<Utc>>,
    /// Who issued it; `None` means the system itself.
    pub issuer: Option<PlayerId>,
    /// The banned network address, set only for IP bans.
    pub address: Option<String>,
    /// Whether the punishment is still in force (soft-delete flag).
    pub active: bool,
}

impl Punishment {
    /// Creates a new active punishment issued now.
    pub fn new(
        target: PlayerId,
        kind: PunishmentKind,
        reason: impl Into<String>,
        issuer: Option<PlayerId>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            target,
            kind,
            reason: reason.into(),
            issued_at: Utc::now(),
            expires_at,
            issuer,
            address: None,
            active: true,
        }
    }

    /// Attaches the banned network address (IP bans only).
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// True when the punishment never expires.
    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }

    /// True when a temporary punishment's expiry has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// True when the punishment currently binds: still active and either
    /// permanent or not yet expired.
    pub fn in_force(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now)
    }
}

// ============================================================================
// Notes
// ============================================================================

/// A free-text annotation about a player, before the backend has assigned
/// its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub target: PlayerId,
    /// `None` means the note was recorded by the system.
    pub issuer: Option<PlayerId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NoteDraft {
    pub fn new(target: PlayerId, issuer: Option<PlayerId>, content: impl Into<String>) -> Self {
        Self {
            target,
            issuer,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A stored note. Immutable except for removal, which is a hard delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Backend-assigned identifier, unique across all notes.
    pub id: i64,
    pub target: PlayerId,
    pub issuer: Option<PlayerId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Binds a backend-assigned identifier to a draft.
    pub fn from_draft(id: i64, draft: NoteDraft) -> Self {
        Self {
            id,
            target: draft.target,
            issuer: draft.issuer,
            content: draft.content,
            created_at: draft.created_at,
        }
    }
}

// ============================================================================
// Warnings
// ============================================================================

/// Severity bounds for a warning, inclusive.
pub const SEVERITY_MIN: u8 = 1;
pub const SEVERITY_MAX: u8 = 5;

/// A graduated warning before the backend has assigned its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningDraft {
    pub target: PlayerId,
    pub issuer: Option<PlayerId>,
    pub reason: String,
    /// Weight of the warning, within [`SEVERITY_MIN`]..=[`SEVERITY_MAX`].
    pub severity: u8,
    pub created_at: DateTime<Utc>,
}

impl WarningDraft {
    pub fn new(
        target: PlayerId,
        issuer: Option<PlayerId>,
        reason: impl Into<String>,
        severity: u8,
    ) -> Self {
        Self {
            target,
            issuer,
            reason: reason.into(),
            severity,
            created_at: Utc::now(),
        }
    }
}

/// A stored warning. Soft-deleted like a punishment: removal clears the
/// `active` flag but keeps the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Backend-assigned identifier, unique across all warnings.
    pub id: i64,
    pub target: PlayerId,
    pub issuer: Option<PlayerId>,
    pub reason: String,
    pub severity: u8,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl Warning {
    /// Binds a backend-assigned identifier to a draft; the stored warning
    /// starts active.
    pub fn from_draft(id: i64, draft: WarningDraft) -> Self {
        Self {
            id,
            target: draft.target,
            issuer: draft.issuer,
            reason: draft.reason,
            severity: draft.severity,
            created_at: draft.created_at,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use test_case::test_case;

    use super::*;

    #[test_case(PunishmentKind::Ban, Some(Family::Ban))]
    #[test_case(PunishmentKind::TempBan, Some(Family::Ban))]
    #[test_case(PunishmentKind::Mute, Some(Family::Mute))]
    #[test_case(PunishmentKind::TempMute, Some(Family::Mute))]
    #[test_case(PunishmentKind::IpBan, None)]
    #[test_case(PunishmentKind::Kick, None)]
    fn kind_family(kind: PunishmentKind, family: Option<Family>) {
        assert_eq!(kind.family(), family);
    }

    #[test]
    fn kind_name_round_trips() {
        for kind in [
            PunishmentKind::Ban,
            PunishmentKind::TempBan,
            PunishmentKind::IpBan,
            PunishmentKind::Mute,
            PunishmentKind::TempMute,
            PunishmentKind::Kick,
        ] {
            assert_eq!(kind.as_str().parse::<PunishmentKind>().unwrap(), kind);
        }
        assert!("banhammer".parse::<PunishmentKind>().is_err());
    }

    #[test]
    fn permanent_punishment_never_expires() {
        let p = Punishment::new(
            PlayerId::random(),
            PunishmentKind::Ban,
            "cheating",
            None,
            None,
        );
        assert!(p.is_permanent());
        assert!(!p.is_expired(Utc::now() + Duration::days(365 * 100)));
        assert!(p.in_force(Utc::now() + Duration::days(365 * 100)));
    }

    #[test]
    fn temporary_punishment_expires_at_deadline() {
        let expiry = Utc::now() + Duration::hours(1);
        let p = Punishment::new(
            PlayerId::random(),
            PunishmentKind::TempBan,
            "spam",
            Some(PlayerId::random()),
            Some(expiry),
        );
        assert!(!p.is_permanent());
        assert!(!p.is_expired(expiry - Duration::seconds(1)));
        assert!(p.is_expired(expiry));
        assert!(!p.in_force(expiry));
    }

    #[test]
    fn deactivated_punishment_is_not_in_force() {
        let mut p = Punishment::new(
            PlayerId::random(),
            PunishmentKind::Mute,
            "flood",
            None,
            None,
        );
        p.active = false;
        assert!(!p.in_force(Utc::now()));
    }

    #[test]
    fn player_id_serializes_as_plain_uuid() {
        let id = PlayerId::random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
