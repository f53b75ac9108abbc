//! Recording doubles for the collaborator traits, shared by the engine
//! test modules.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use warden_storage::Store;
use warden_types::PlayerId;

use crate::session::{NotificationFanout, SessionRegistry};

/// Opens a file-backed store in the given directory.
pub(crate) fn file_store(dir: &Path) -> Arc<Store> {
    Arc::new(Store::file(dir).expect("open file store"))
}

/// In-memory session registry that records forced disconnects.
#[derive(Debug, Default)]
pub(crate) struct RecordingSessions {
    connected: Mutex<HashMap<PlayerId, String>>,
    disconnects: Mutex<Vec<(PlayerId, String)>>,
}

impl RecordingSessions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connect(&self, identity: PlayerId, address: &str) {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity, address.to_string());
    }

    pub(crate) fn disconnects(&self) -> Vec<(PlayerId, String)> {
        self.disconnects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionRegistry for RecordingSessions {
    fn address_of(&self, identity: PlayerId) -> Option<String> {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&identity)
            .cloned()
    }

    fn is_connected(&self, identity: PlayerId) -> bool {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&identity)
    }

    fn connected(&self) -> Vec<PlayerId> {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn disconnect(&self, identity: PlayerId, message: &str) {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&identity);
        self.disconnects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((identity, message.to_string()));
    }
}

/// Fan-out double that records `(permission, message)` pairs.
#[derive(Debug, Default)]
pub(crate) struct RecordingFanout {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingFanout {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationFanout for RecordingFanout {
    fn broadcast(&self, permission: &str, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((permission.to_string(), message.to_string()));
    }
}
