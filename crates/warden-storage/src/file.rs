//! File-backed storage: in-memory maps snapshotted to JSON on every mutation.
//!
//! # File Layout
//!
//! ```text
//! {data_dir}/
//! ├── punishments.json   <- { identity: [punishment, ...] }
//! ├── notes.json         <- { identity: [note, ...] }
//! ├── warnings.json      <- { identity: [warning, ...] }
//! └── addresses.json     <- { identity: address }
//! ```
//!
//! Each mutation rewrites the affected dataset file in full; there is no
//! append log and no partial write. Operations return only after the
//! snapshot has been written, which is atomic-enough for the supported
//! single-process deployment. The files must not be shared between
//! concurrent processes.
//!
//! A dataset that fails to load (I/O error or malformed JSON) is reset to
//! empty with a logged warning; the other datasets are unaffected.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use warden_types::{Note, NoteDraft, PlayerId, Punishment, PunishmentKind, Warning, WarningDraft};

use crate::Result;

const PUNISHMENTS_FILE: &str = "punishments.json";
const NOTES_FILE: &str = "notes.json";
const WARNINGS_FILE: &str = "warnings.json";
const ADDRESSES_FILE: &str = "addresses.json";

/// The four datasets plus the derived reverse address index and the
/// backend-owned identifier counters.
#[derive(Debug, Default)]
struct Datasets {
    punishments: HashMap<PlayerId, Vec<Punishment>>,
    notes: HashMap<PlayerId, Vec<Note>>,
    warnings: HashMap<PlayerId, Vec<Warning>>,
    /// Forward map identity -> current address.
    addresses: HashMap<PlayerId, String>,
    /// Derived index address -> identities, rebuilt from `addresses` on
    /// load. Never persisted.
    by_address: HashMap<String, BTreeSet<PlayerId>>,
    /// Next note identifier; seeded from the loaded data so identifiers
    /// stay unique across restarts.
    next_note_id: i64,
    next_warning_id: i64,
}

/// File-backed storage backend.
///
/// All four maps sit behind one process-wide reader/writer lock: readers
/// run concurrently, writers are exclusive across the whole dataset.
#[derive(Debug)]
pub struct FileStore {
    data_dir: PathBuf,
    state: RwLock<Datasets>,
}

impl FileStore {
    /// Opens the store, loading each dataset from its file when present and
    /// initializing (and writing out) an empty dataset otherwise.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let punishments = load_or_init(&data_dir.join(PUNISHMENTS_FILE), "punishments")?;
        let notes: HashMap<PlayerId, Vec<Note>> =
            load_or_init(&data_dir.join(NOTES_FILE), "notes")?;
        let warnings: HashMap<PlayerId, Vec<Warning>> =
            load_or_init(&data_dir.join(WARNINGS_FILE), "warnings")?;
        let addresses: HashMap<PlayerId, String> =
            load_or_init(&data_dir.join(ADDRESSES_FILE), "addresses")?;

        let mut by_address: HashMap<String, BTreeSet<PlayerId>> = HashMap::new();
        for (identity, address) in &addresses {
            by_address.entry(address.clone()).or_default().insert(*identity);
        }

        let next_note_id = next_id(notes.values().flatten().map(|n| n.id));
        let next_warning_id = next_id(warnings.values().flatten().map(|w| w.id));

        Ok(Self {
            data_dir,
            state: RwLock::new(Datasets {
                punishments,
                notes,
                warnings,
                addresses,
                by_address,
                next_note_id,
                next_warning_id,
            }),
        })
    }

    /// Writes a final snapshot of every dataset.
    pub fn close(&self) -> Result<()> {
        let state = self.read();
        self.save_punishments(&state)?;
        self.save_notes(&state)?;
        self.save_warnings(&state)?;
        self.save_addresses(&state)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Punishments
    // ------------------------------------------------------------------

    pub fn insert_punishment(&self, punishment: &Punishment) -> Result<()> {
        let mut state = self.write();
        state
            .punishments
            .entry(punishment.target)
            .or_default()
            .push(punishment.clone());
        self.save_punishments(&state)
    }

    /// Returns the target's punishments with the `active` flag still set.
    /// Wall-clock expiry is the caller's concern.
    pub fn punishments_for(&self, target: PlayerId) -> Result<Vec<Punishment>> {
        let state = self.read();
        Ok(state
            .punishments
            .get(&target)
            .map(|rows| rows.iter().filter(|p| p.active).cloned().collect())
            .unwrap_or_default())
    }

    /// Returns every punishment issued by the given identity, active or not.
    pub fn punishments_by_issuer(&self, issuer: PlayerId) -> Result<Vec<Punishment>> {
        let state = self.read();
        Ok(state
            .punishments
            .values()
            .flatten()
            .filter(|p| p.issuer == Some(issuer))
            .cloned()
            .collect())
    }

    /// Returns active punishments recorded against the given address.
    pub fn punishments_by_address(&self, address: &str) -> Result<Vec<Punishment>> {
        let state = self.read();
        Ok(state
            .punishments
            .values()
            .flatten()
            .filter(|p| p.active && p.address.as_deref() == Some(address))
            .cloned()
            .collect())
    }

    /// Clears the `active` flag on the target's punishments of one kind.
    /// Returns how many rows were deactivated.
    pub fn deactivate_punishments(&self, target: PlayerId, kind: PunishmentKind) -> Result<usize> {
        let mut state = self.write();
        let mut count = 0;
        if let Some(rows) = state.punishments.get_mut(&target) {
            for p in rows.iter_mut().filter(|p| p.kind == kind && p.active) {
                p.active = false;
                count += 1;
            }
        }
        if count > 0 {
            self.save_punishments(&state)?;
        }
        Ok(count)
    }

    /// Deactivates every active IP ban recorded against the address,
    /// regardless of which target each row was originally recorded for.
    pub fn deactivate_address_bans(&self, address: &str) -> Result<usize> {
        let mut state = self.write();
        let mut count = 0;
        for rows in state.punishments.values_mut() {
            for p in rows.iter_mut().filter(|p| {
                p.kind == PunishmentKind::IpBan && p.active && p.address.as_deref() == Some(address)
            }) {
                p.active = false;
                count += 1;
            }
        }
        if count > 0 {
            self.save_punishments(&state)?;
        }
        Ok(count)
    }

    /// Full-dataset scan for still-active punishments whose expiry has
    /// passed. Used by the expiration sweep; covers offline targets.
    pub fn expired_punishments(&self, now: DateTime<Utc>) -> Result<Vec<Punishment>> {
        let state = self.read();
        Ok(state
            .punishments
            .values()
            .flatten()
            .filter(|p| p.active && p.is_expired(now))
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    pub fn insert_note(&self, draft: NoteDraft) -> Result<Note> {
        let mut state = self.write();
        let id = state.next_note_id;
        state.next_note_id += 1;
        let note = Note::from_draft(id, draft);
        state.notes.entry(note.target).or_default().push(note.clone());
        self.save_notes(&state)?;
        Ok(note)
    }

    /// Hard-deletes the note. Returns whether a note was removed.
    pub fn remove_note(&self, target: PlayerId, id: i64) -> Result<bool> {
        let mut state = self.write();
        let mut removed = false;
        if let Some(rows) = state.notes.get_mut(&target) {
            let before = rows.len();
            rows.retain(|n| n.id != id);
            removed = rows.len() != before;
        }
        if removed {
            self.save_notes(&state)?;
        }
        Ok(removed)
    }

    pub fn notes_for(&self, target: PlayerId) -> Result<Vec<Note>> {
        let state = self.read();
        Ok(state.notes.get(&target).cloned().unwrap_or_default())
    }

    pub fn note(&self, id: i64) -> Result<Option<Note>> {
        let state = self.read();
        Ok(state
            .notes
            .values()
            .flatten()
            .find(|n| n.id == id)
            .cloned())
    }

    // ------------------------------------------------------------------
    // Warnings
    // ------------------------------------------------------------------

    pub fn insert_warning(&self, draft: WarningDraft) -> Result<Warning> {
        let mut state = self.write();
        let id = state.next_warning_id;
        state.next_warning_id += 1;
        let warning = Warning::from_draft(id, draft);
        state
            .warnings
            .entry(warning.target)
            .or_default()
            .push(warning.clone());
        self.save_warnings(&state)?;
        Ok(warning)
    }

    /// Soft-deletes the warning. Returns false when no active warning with
    /// that identifier exists for the target.
    pub fn deactivate_warning(&self, target: PlayerId, id: i64) -> Result<bool> {
        let mut state = self.write();
        let mut found = false;
        if let Some(rows) = state.warnings.get_mut(&target) {
            if let Some(w) = rows.iter_mut().find(|w| w.id == id && w.active) {
                w.active = false;
                found = true;
            }
        }
        if found {
            self.save_warnings(&state)?;
        }
        Ok(found)
    }

    /// Returns the target's warnings, active and inactive.
    pub fn warnings_for(&self, target: PlayerId) -> Result<Vec<Warning>> {
        let state = self.read();
        Ok(state.warnings.get(&target).cloned().unwrap_or_default())
    }

    pub fn warning(&self, id: i64) -> Result<Option<Warning>> {
        let state = self.read();
        Ok(state
            .warnings
            .values()
            .flatten()
            .find(|w| w.id == id)
            .cloned())
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    pub fn address_of(&self, identity: PlayerId) -> Result<Option<String>> {
        let state = self.read();
        Ok(state.addresses.get(&identity).cloned())
    }

    /// Records the identity's current address, replacing any previous one
    /// and keeping the reverse index in step.
    pub fn record_address(&self, identity: PlayerId, address: &str) -> Result<()> {
        let mut state = self.write();
        if let Some(previous) = state.addresses.insert(identity, address.to_string()) {
            if previous != address {
                let emptied = state.by_address.get_mut(&previous).is_some_and(|set| {
                    set.remove(&identity);
                    set.is_empty()
                });
                if emptied {
                    state.by_address.remove(&previous);
                }
            }
        }
        state
            .by_address
            .entry(address.to_string())
            .or_default()
            .insert(identity);
        self.save_addresses(&state)
    }

    /// All identities currently associated with the address, in stable
    /// order.
    pub fn identities_at(&self, address: &str) -> Result<Vec<PlayerId>> {
        let state = self.read();
        Ok(state
            .by_address
            .get(address)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    fn save_punishments(&self, state: &Datasets) -> Result<()> {
        save(&self.data_dir.join(PUNISHMENTS_FILE), &state.punishments)
    }

    fn save_notes(&self, state: &Datasets) -> Result<()> {
        save(&self.data_dir.join(NOTES_FILE), &state.notes)
    }

    fn save_warnings(&self, state: &Datasets) -> Result<()> {
        save(&self.data_dir.join(WARNINGS_FILE), &state.warnings)
    }

    fn save_addresses(&self, state: &Datasets) -> Result<()> {
        save(&self.data_dir.join(ADDRESSES_FILE), &state.addresses)
    }

    fn read(&self) -> RwLockReadGuard<'_, Datasets> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Datasets> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Loads a dataset from disk. A missing file initializes (and persists) an
/// empty dataset; an unreadable or malformed file resets the dataset to
/// empty with a logged warning, leaving the other datasets untouched.
fn load_or_init<T>(path: &Path, dataset: &'static str) -> Result<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    if !path.exists() {
        let empty = T::default();
        save(path, &empty)?;
        return Ok(empty);
    }

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(dataset, %error, "failed to read dataset file; starting empty");
            return Ok(T::default());
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(error) => {
            tracing::warn!(dataset, %error, "malformed dataset file; starting empty");
            Ok(T::default())
        }
    }
}

/// Full-dataset overwrite. The write lock is held across the call, so the
/// file always reflects a consistent snapshot.
fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    fs::write(path, json)?;
    Ok(())
}

/// One past the largest identifier seen, starting at 1 for empty data.
fn next_id(ids: impl Iterator<Item = i64>) -> i64 {
    ids.max().map_or(1, |max| max + 1)
}
