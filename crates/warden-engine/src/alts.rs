//! Alt-correlation engine: which identities share a network address.
//!
//! The address book keeps one current address per identity plus the
//! derived reverse index. On session start the engine reads the reverse
//! index *before* recording the new association, so the caller learns
//! which identities were already resident on the address. The
//! check-then-record pair runs under a per-address lock: two identities
//! connecting from the same address at the same instant cannot both see
//! an empty set.

use std::sync::Arc;

use warden_storage::Store;
use warden_types::PlayerId;

use crate::error::Result;
use crate::keyed::KeyedLocks;
use crate::session::{NotificationFanout, perms};
use crate::validate_address;

/// Engine for identity-address correlation and alt detection.
pub struct AltEngine {
    store: Arc<Store>,
    notifier: Arc<dyn NotificationFanout>,
    address_locks: KeyedLocks<String>,
}

impl AltEngine {
    pub fn new(store: Arc<Store>, notifier: Arc<dyn NotificationFanout>) -> Self {
        Self {
            store,
            notifier,
            address_locks: KeyedLocks::new(),
        }
    }

    /// Handles a session start: detects co-resident identities, records
    /// the association, and notifies privileged observers when the
    /// existing set was non-empty. Returns that set.
    pub fn on_session_start(&self, identity: PlayerId, address: &str) -> Result<Vec<PlayerId>> {
        validate_address(address)?;
        let key = address.to_string();
        self.address_locks.with(&key, || {
            let existing: Vec<PlayerId> = self
                .store
                .identities_at(address)?
                .into_iter()
                .filter(|id| *id != identity)
                .collect();

            self.store.record_address(identity, address)?;

            if !existing.is_empty() {
                let listed = existing
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.notifier.broadcast(
                    perms::NOTIFY_ALTS,
                    &format!(
                        "{identity} connected from {address}, shared with {} other identit{}: {listed}",
                        existing.len(),
                        if existing.len() == 1 { "y" } else { "ies" },
                    ),
                );
                tracing::info!(%identity, address, alts = existing.len(), "alt accounts detected");
            }

            Ok(existing)
        })
    }

    /// Identities sharing the given identity's current address, excluding
    /// the identity itself. Empty when no address is on record.
    pub fn alts_of(&self, identity: PlayerId) -> Result<Vec<PlayerId>> {
        let Some(address) = self.store.address_of(identity)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .store
            .identities_at(&address)?
            .into_iter()
            .filter(|id| *id != identity)
            .collect())
    }

    pub fn identities_at(&self, address: &str) -> Result<Vec<PlayerId>> {
        Ok(self.store.identities_at(address)?)
    }

    pub fn address_of(&self, identity: PlayerId) -> Result<Option<String>> {
        Ok(self.store.address_of(identity)?)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::error::EngineError;
    use crate::testutil::{RecordingFanout, file_store};

    struct Fixture {
        _dir: TempDir,
        notifier: Arc<RecordingFanout>,
        engine: AltEngine,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = file_store(dir.path());
        let notifier = Arc::new(RecordingFanout::new());
        let engine = AltEngine::new(store, Arc::clone(&notifier) as Arc<dyn NotificationFanout>);
        Fixture {
            _dir: dir,
            notifier,
            engine,
        }
    }

    #[test]
    fn first_identity_on_an_address_sees_no_alts() {
        let f = fixture();
        let alone = f
            .engine
            .on_session_start(PlayerId::random(), "203.0.113.7")
            .unwrap();
        assert!(alone.is_empty());
        assert!(f.notifier.messages().is_empty());
    }

    #[test]
    fn second_identity_sees_the_first_and_staff_are_notified() {
        let f = fixture();
        let first = PlayerId::random();
        let second = PlayerId::random();

        f.engine.on_session_start(first, "203.0.113.7").unwrap();
        let existing = f.engine.on_session_start(second, "203.0.113.7").unwrap();

        assert_eq!(existing, vec![first]);
        let messages = f.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, perms::NOTIFY_ALTS);
        assert!(messages[0].1.contains(&first.to_string()));
    }

    #[test]
    fn reconnecting_from_the_same_address_is_not_an_alt_of_itself() {
        let f = fixture();
        let identity = PlayerId::random();
        f.engine.on_session_start(identity, "203.0.113.7").unwrap();
        let existing = f.engine.on_session_start(identity, "203.0.113.7").unwrap();
        assert!(existing.is_empty());
        assert!(f.notifier.messages().is_empty());
    }

    #[test]
    fn moving_address_updates_the_correlation() {
        let f = fixture();
        let a = PlayerId::random();
        let b = PlayerId::random();
        f.engine.on_session_start(a, "203.0.113.7").unwrap();
        f.engine.on_session_start(b, "203.0.113.7").unwrap();
        assert_eq!(f.engine.alts_of(a).unwrap(), vec![b]);

        // b moves elsewhere; the correlation dissolves.
        f.engine.on_session_start(b, "198.51.100.2").unwrap();
        assert!(f.engine.alts_of(a).unwrap().is_empty());
        assert_eq!(
            f.engine.address_of(b).unwrap().as_deref(),
            Some("198.51.100.2")
        );
    }

    #[test]
    fn alts_of_without_recorded_address_is_empty() {
        let f = fixture();
        assert!(f.engine.alts_of(PlayerId::random()).unwrap().is_empty());
    }

    #[test]
    fn malformed_addresses_are_rejected_up_front() {
        let f = fixture();
        let result = f.engine.on_session_start(PlayerId::random(), "not-an-ip");
        assert!(matches!(result, Err(EngineError::InvalidAddress(_))));
    }
}
