//! Punishment engine: family exclusivity, the per-target read cache, and
//! the session side effects.
//!
//! # Invariants
//!
//! - At most one active punishment per family (ban, mute) per target. The
//!   check-then-insert sequence runs under a lock keyed by target identity
//!   (by address for IP bans), so concurrent callers cannot both pass the
//!   check.
//! - Every mutation invalidates the target's cache entry before returning;
//!   a read issued after a mutation never sees the pre-mutation set.
//! - Reversing an IP ban deactivates every active row for the address and
//!   clears the whole cache, since the cascade can affect any identity.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use warden_storage::Store;
use warden_types::{Family, PlayerId, Punishment, PunishmentKind};

use crate::cache::TtlCache;
use crate::error::{EngineError, Result};
use crate::keyed::KeyedLocks;
use crate::session::{NotificationFanout, SessionRegistry, perms};
use crate::validate_address;

/// Cache entries lapse five minutes after write unless invalidated first.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Engine for punitive actions against identities and addresses.
pub struct PunishmentEngine {
    store: Arc<Store>,
    sessions: Arc<dyn SessionRegistry>,
    notifier: Arc<dyn NotificationFanout>,
    cache: TtlCache<PlayerId, Vec<Punishment>>,
    target_locks: KeyedLocks<PlayerId>,
    address_locks: KeyedLocks<String>,
}

impl PunishmentEngine {
    pub fn new(
        store: Arc<Store>,
        sessions: Arc<dyn SessionRegistry>,
        notifier: Arc<dyn NotificationFanout>,
    ) -> Self {
        Self::with_cache_ttl(store, sessions, notifier, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(
        store: Arc<Store>,
        sessions: Arc<dyn SessionRegistry>,
        notifier: Arc<dyn NotificationFanout>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            notifier,
            cache: TtlCache::new(cache_ttl),
            target_locks: KeyedLocks::new(),
            address_locks: KeyedLocks::new(),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The target's punishments that still carry the active flag, served
    /// from the cache when a fresh entry exists.
    pub fn punishments(&self, target: PlayerId) -> Result<Vec<Punishment>> {
        if let Some(rows) = self.cache.get(&target) {
            return Ok(rows);
        }
        let rows = self.store.punishments_for(target)?;
        self.cache.insert(target, rows.clone());
        Ok(rows)
    }

    /// The punishment currently binding the target within the family, if
    /// any: active flag set and not lapsed by wall clock.
    pub fn active_punishment(&self, target: PlayerId, family: Family) -> Result<Option<Punishment>> {
        let now = Utc::now();
        Ok(self
            .punishments(target)?
            .into_iter()
            .find(|p| p.kind.family() == Some(family) && p.in_force(now)))
    }

    pub fn is_banned(&self, target: PlayerId) -> Result<bool> {
        Ok(self.active_punishment(target, Family::Ban)?.is_some())
    }

    pub fn is_muted(&self, target: PlayerId) -> Result<bool> {
        Ok(self.active_punishment(target, Family::Mute)?.is_some())
    }

    pub fn active_ban(&self, target: PlayerId) -> Result<Option<Punishment>> {
        self.active_punishment(target, Family::Ban)
    }

    pub fn active_mute(&self, target: PlayerId) -> Result<Option<Punishment>> {
        self.active_punishment(target, Family::Mute)
    }

    /// Every punishment the identity has issued, for accountability views.
    pub fn issued_by(&self, issuer: PlayerId) -> Result<Vec<Punishment>> {
        Ok(self.store.punishments_by_issuer(issuer)?)
    }

    pub fn is_ip_banned(&self, address: &str) -> Result<bool> {
        Ok(self.active_ip_ban(address)?.is_some())
    }

    /// The IP ban currently binding the address, if any.
    pub fn active_ip_ban(&self, address: &str) -> Result<Option<Punishment>> {
        let now = Utc::now();
        Ok(self
            .store
            .punishments_by_address(address)?
            .into_iter()
            .find(|p| p.kind == PunishmentKind::IpBan && p.in_force(now)))
    }

    // ------------------------------------------------------------------
    // Bans
    // ------------------------------------------------------------------

    /// Bans the target; a `None` expiry makes the ban permanent. Refuses
    /// when the target already carries an active ban-family punishment.
    pub fn ban(
        &self,
        issuer: Option<PlayerId>,
        target: PlayerId,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Punishment> {
        self.target_locks.with(&target, || {
            if self.active_punishment(target, Family::Ban)?.is_some() {
                return Err(EngineError::AlreadySanctioned {
                    target,
                    family: Family::Ban,
                });
            }

            let kind = match expires_at {
                None => PunishmentKind::Ban,
                Some(_) => PunishmentKind::TempBan,
            };
            let punishment = Punishment::new(target, kind, reason, issuer, expires_at);
            self.store.insert_punishment(&punishment)?;
            self.cache.invalidate(&target);

            if self.sessions.is_connected(target) {
                self.sessions
                    .disconnect(target, &format!("Banned: {reason}"));
            }
            self.notifier.broadcast(
                perms::NOTIFY_BAN,
                &format!("{target} was banned by {}: {reason}", label(issuer)),
            );
            tracing::info!(%target, kind = %punishment.kind, "punishment applied");
            Ok(punishment)
        })
    }

    /// Lifts the target's ban. Signals [`EngineError::NotSanctioned`] when
    /// no ban-family punishment is in force; rows are never
    /// double-deactivated.
    pub fn unban(&self, target: PlayerId) -> Result<()> {
        self.target_locks.with(&target, || {
            if self.active_punishment(target, Family::Ban)?.is_none() {
                return Err(EngineError::NotSanctioned {
                    target,
                    family: Family::Ban,
                });
            }
            for kind in Family::Ban.kinds() {
                self.store.deactivate_punishments(target, kind)?;
            }
            self.cache.invalidate(&target);
            tracing::info!(%target, "ban lifted");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Mutes
    // ------------------------------------------------------------------

    /// Mutes the target; a `None` expiry makes the mute permanent.
    pub fn mute(
        &self,
        issuer: Option<PlayerId>,
        target: PlayerId,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Punishment> {
        self.target_locks.with(&target, || {
            if self.active_punishment(target, Family::Mute)?.is_some() {
                return Err(EngineError::AlreadySanctioned {
                    target,
                    family: Family::Mute,
                });
            }

            let kind = match expires_at {
                None => PunishmentKind::Mute,
                Some(_) => PunishmentKind::TempMute,
            };
            let punishment = Punishment::new(target, kind, reason, issuer, expires_at);
            self.store.insert_punishment(&punishment)?;
            self.cache.invalidate(&target);

            self.notifier.broadcast(
                perms::NOTIFY_MUTE,
                &format!("{target} was muted by {}: {reason}", label(issuer)),
            );
            tracing::info!(%target, kind = %punishment.kind, "punishment applied");
            Ok(punishment)
        })
    }

    pub fn unmute(&self, target: PlayerId) -> Result<()> {
        self.target_locks.with(&target, || {
            if self.active_punishment(target, Family::Mute)?.is_none() {
                return Err(EngineError::NotSanctioned {
                    target,
                    family: Family::Mute,
                });
            }
            for kind in Family::Mute.kinds() {
                self.store.deactivate_punishments(target, kind)?;
            }
            self.cache.invalidate(&target);
            tracing::info!(%target, "mute lifted");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Kicks
    // ------------------------------------------------------------------

    /// Records a kick and ends the target's session when connected. Kicks
    /// are instantaneous, so there is no conflict check and no reverse.
    pub fn kick(
        &self,
        issuer: Option<PlayerId>,
        target: PlayerId,
        reason: &str,
    ) -> Result<Punishment> {
        let punishment = Punishment::new(target, PunishmentKind::Kick, reason, issuer, None);
        self.store.insert_punishment(&punishment)?;
        self.cache.invalidate(&target);

        if self.sessions.is_connected(target) {
            self.sessions
                .disconnect(target, &format!("Kicked: {reason}"));
        }
        self.notifier.broadcast(
            perms::NOTIFY_KICK,
            &format!("{target} was kicked by {}: {reason}", label(issuer)),
        );
        tracing::info!(%target, "kick recorded");
        Ok(punishment)
    }

    // ------------------------------------------------------------------
    // IP bans
    // ------------------------------------------------------------------

    /// Bans a network address. The ban binds every identity currently or
    /// later associated with the address, not just `target`; every
    /// connected identity on the address is disconnected immediately.
    pub fn ip_ban(
        &self,
        issuer: Option<PlayerId>,
        target: PlayerId,
        address: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Punishment> {
        validate_address(address)?;
        self.address_locks.with(&address.to_string(), || {
            if self.active_ip_ban(address)?.is_some() {
                return Err(EngineError::AddressAlreadyBanned(address.to_string()));
            }

            let punishment =
                Punishment::new(target, PunishmentKind::IpBan, reason, issuer, expires_at)
                    .with_address(address);
            self.store.insert_punishment(&punishment)?;
            self.cache.invalidate(&target);

            for identity in self.sessions.connected() {
                if self.sessions.address_of(identity).as_deref() == Some(address) {
                    self.sessions
                        .disconnect(identity, &format!("IP banned: {reason}"));
                }
            }
            self.notifier.broadcast(
                perms::NOTIFY_IP_BAN,
                &format!("{address} was IP banned by {}: {reason}", label(issuer)),
            );
            tracing::info!(%target, address, "IP ban applied");
            Ok(punishment)
        })
    }

    /// Lifts the address ban, deactivating every active row recorded
    /// against the address regardless of target. Clears the whole cache:
    /// the cascade can affect identities other than the recorded one.
    pub fn unban_ip(&self, address: &str) -> Result<usize> {
        self.address_locks.with(&address.to_string(), || {
            if self.active_ip_ban(address)?.is_none() {
                return Err(EngineError::AddressNotBanned(address.to_string()));
            }
            let cleared = self.store.deactivate_address_bans(address)?;
            self.cache.clear();
            tracing::info!(address, cleared, "IP ban lifted");
            Ok(cleared)
        })
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    /// Deactivates a lapsed temporary punishment on behalf of the sweep.
    /// Unlike the explicit reverse operations this accepts punishments
    /// that are no longer in force by wall clock, which is the case the
    /// sweep exists for. Returns whether any row was deactivated.
    pub fn expire(&self, punishment: &Punishment) -> Result<bool> {
        match (punishment.kind, punishment.address.as_deref()) {
            (PunishmentKind::IpBan, Some(address)) => {
                let key = address.to_string();
                self.address_locks.with(&key, || {
                    let cleared = self.store.deactivate_address_bans(address)?;
                    self.cache.clear();
                    Ok(cleared > 0)
                })
            }
            _ => self.target_locks.with(&punishment.target, || {
                let cleared = self
                    .store
                    .deactivate_punishments(punishment.target, punishment.kind)?;
                self.cache.invalidate(&punishment.target);
                Ok(cleared > 0)
            }),
        }
    }
}

/// Issuer rendering for notifications: the system has no identity.
fn label(issuer: Option<PlayerId>) -> String {
    issuer.map_or_else(|| "system".to_string(), |id| id.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    use super::*;
    use crate::testutil::{RecordingFanout, RecordingSessions, file_store};

    struct Fixture {
        _dir: TempDir,
        store: Arc<Store>,
        sessions: Arc<RecordingSessions>,
        notifier: Arc<RecordingFanout>,
        engine: PunishmentEngine,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = file_store(dir.path());
        let sessions = Arc::new(RecordingSessions::new());
        let notifier = Arc::new(RecordingFanout::new());
        let engine = PunishmentEngine::new(
            Arc::clone(&store),
            Arc::clone(&sessions) as Arc<dyn SessionRegistry>,
            Arc::clone(&notifier) as Arc<dyn NotificationFanout>,
        );
        Fixture {
            _dir: dir,
            store,
            sessions,
            notifier,
            engine,
        }
    }

    #[test]
    fn ban_then_unban_round_trip() {
        let f = fixture();
        let target = PlayerId::random();

        let p = f.engine.ban(None, target, "cheating", None).unwrap();
        assert_eq!(p.kind, PunishmentKind::Ban);
        assert!(p.is_permanent());
        assert!(f.engine.is_banned(target).unwrap());

        f.engine.unban(target).unwrap();
        assert!(!f.engine.is_banned(target).unwrap());
    }

    #[test]
    fn second_ban_in_the_family_is_refused() {
        let f = fixture();
        let target = PlayerId::random();
        f.engine.ban(None, target, "cheating", None).unwrap();

        let again = f.engine.ban(
            None,
            target,
            "still cheating",
            Some(Utc::now() + ChronoDuration::hours(1)),
        );
        assert!(matches!(
            again,
            Err(EngineError::AlreadySanctioned {
                family: Family::Ban,
                ..
            })
        ));

        // A mute is a different family and goes through.
        f.engine.mute(None, target, "flood", None).unwrap();
    }

    #[test]
    fn unban_without_active_ban_signals_not_sanctioned() {
        let f = fixture();
        let target = PlayerId::random();
        assert!(matches!(
            f.engine.unban(target),
            Err(EngineError::NotSanctioned {
                family: Family::Ban,
                ..
            })
        ));
    }

    #[test]
    fn ban_disconnects_a_connected_target_and_broadcasts() {
        let f = fixture();
        let target = PlayerId::random();
        f.sessions.connect(target, "203.0.113.7");

        f.engine.ban(None, target, "cheating", None).unwrap();

        let disconnects = f.sessions.disconnects();
        assert_eq!(disconnects.len(), 1);
        assert_eq!(disconnects[0].0, target);
        assert!(disconnects[0].1.contains("cheating"));

        let messages = f.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, perms::NOTIFY_BAN);
        assert!(messages[0].1.contains("system"));
    }

    #[test]
    fn mute_does_not_disconnect() {
        let f = fixture();
        let target = PlayerId::random();
        f.sessions.connect(target, "203.0.113.7");

        f.engine.mute(None, target, "flood", None).unwrap();

        assert!(f.sessions.disconnects().is_empty());
        assert!(f.engine.is_muted(target).unwrap());
    }

    #[test]
    fn reads_after_a_mutation_see_the_new_state() {
        let f = fixture();
        let target = PlayerId::random();

        // Prime the cache with the empty set, then mutate.
        assert!(f.engine.punishments(target).unwrap().is_empty());
        f.engine.ban(None, target, "cheating", None).unwrap();
        assert_eq!(f.engine.punishments(target).unwrap().len(), 1);

        // And again across a reverse.
        f.engine.unban(target).unwrap();
        assert!(f.engine.punishments(target).unwrap().is_empty());
    }

    #[test]
    fn expired_temp_ban_no_longer_binds() {
        let f = fixture();
        let target = PlayerId::random();
        f.engine
            .ban(
                None,
                target,
                "spam",
                Some(Utc::now() - ChronoDuration::seconds(1)),
            )
            .unwrap();

        // The row is still active in storage but lapsed by wall clock.
        assert!(!f.engine.is_banned(target).unwrap());
        assert_eq!(f.store.punishments_for(target).unwrap().len(), 1);
    }

    #[test]
    fn kick_records_and_disconnects() {
        let f = fixture();
        let target = PlayerId::random();
        let issuer = PlayerId::random();
        f.sessions.connect(target, "203.0.113.7");

        f.engine.kick(Some(issuer), target, "afk farming").unwrap();

        assert_eq!(f.sessions.disconnects().len(), 1);
        let messages = f.notifier.messages();
        assert_eq!(messages[0].0, perms::NOTIFY_KICK);
        assert!(messages[0].1.contains(&issuer.to_string()));
        // A kick never blocks a later ban.
        f.engine.ban(None, target, "cheating", None).unwrap();
    }

    #[test]
    fn ip_ban_cascades_to_identities_recorded_later() {
        let f = fixture();
        let address = "203.0.113.7";
        let first = PlayerId::random();

        f.engine
            .ip_ban(None, first, address, "evasion", None)
            .unwrap();
        assert!(f.engine.is_ip_banned(address).unwrap());

        // A second identity appears on the address afterwards; the ban
        // still answers for the address, whichever identity asks.
        let second = PlayerId::random();
        f.store.record_address(second, address).unwrap();
        assert!(f.engine.is_ip_banned(address).unwrap());

        // Reversing clears every row for the address.
        f.engine
            .ip_ban(None, second, address, "evasion", None)
            .unwrap_err();
        let cleared = f.engine.unban_ip(address).unwrap();
        assert_eq!(cleared, 1);
        assert!(!f.engine.is_ip_banned(address).unwrap());
    }

    #[test]
    fn ip_ban_disconnects_every_session_on_the_address() {
        let f = fixture();
        let address = "203.0.113.7";
        let target = PlayerId::random();
        let roommate = PlayerId::random();
        let elsewhere = PlayerId::random();
        f.sessions.connect(target, address);
        f.sessions.connect(roommate, address);
        f.sessions.connect(elsewhere, "198.51.100.2");

        f.engine
            .ip_ban(None, target, address, "evasion", None)
            .unwrap();

        let kicked: Vec<PlayerId> = f.sessions.disconnects().into_iter().map(|d| d.0).collect();
        assert_eq!(kicked.len(), 2);
        assert!(kicked.contains(&target));
        assert!(kicked.contains(&roommate));
        assert!(!kicked.contains(&elsewhere));
    }

    #[test]
    fn ip_ban_rejects_malformed_addresses() {
        let f = fixture();
        let result = f
            .engine
            .ip_ban(None, PlayerId::random(), "not-an-address", "evasion", None);
        assert!(matches!(result, Err(EngineError::InvalidAddress(_))));
    }

    #[test]
    fn unban_ip_without_active_ban_signals_not_banned() {
        let f = fixture();
        assert!(matches!(
            f.engine.unban_ip("203.0.113.7"),
            Err(EngineError::AddressNotBanned(_))
        ));
    }

    #[test]
    fn issued_by_lists_the_issuers_punishments() {
        let f = fixture();
        let issuer = PlayerId::random();
        let a = PlayerId::random();
        let b = PlayerId::random();
        f.engine.ban(Some(issuer), a, "cheating", None).unwrap();
        f.engine.mute(Some(issuer), b, "flood", None).unwrap();
        f.engine.ban(None, PlayerId::random(), "other", None).unwrap();

        let issued = f.engine.issued_by(issuer).unwrap();
        assert_eq!(issued.len(), 2);
    }
}
