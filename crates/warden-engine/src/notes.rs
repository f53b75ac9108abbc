//! Note engine: free-text annotations against a target identity.
//!
//! Notes are the lightest entity: immutable once written, removed by hard
//! delete, with no cache and no session side effects. The engine's job is
//! identifier discipline (identifiers are backend-assigned, never caller
//! supplied) and the typed not-found signal on removal.

use std::sync::Arc;

use warden_storage::Store;
use warden_types::{Note, NoteDraft, PlayerId};

use crate::error::{EngineError, Result};

/// Engine for free-text notes.
pub struct NoteEngine {
    store: Arc<Store>,
}

impl NoteEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Records a note and returns it with its backend-assigned identifier.
    pub fn add_note(
        &self,
        target: PlayerId,
        issuer: Option<PlayerId>,
        content: &str,
    ) -> Result<Note> {
        let note = self
            .store
            .insert_note(NoteDraft::new(target, issuer, content))?;
        tracing::info!(%target, id = note.id, "note recorded");
        Ok(note)
    }

    /// Hard-deletes one note. Signals [`EngineError::NoteNotFound`] when
    /// the target has no note with that identifier.
    pub fn remove_note(&self, target: PlayerId, id: i64) -> Result<()> {
        if self.store.remove_note(target, id)? {
            Ok(())
        } else {
            Err(EngineError::NoteNotFound { target, id })
        }
    }

    /// The target's notes, in insertion order.
    pub fn notes(&self, target: PlayerId) -> Result<Vec<Note>> {
        Ok(self.store.notes_for(target)?)
    }

    pub fn note(&self, id: i64) -> Result<Option<Note>> {
        Ok(self.store.note(id)?)
    }
}
