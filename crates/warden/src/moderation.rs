//! Runtime assembly: one backend, three engines, one sweep task.

use std::sync::Arc;

use warden_config::{BackendKind, WardenConfig};
use warden_engine::{
    AltEngine, EscalationThresholds, ExpirySweeper, NoteEngine, NotificationFanout,
    PunishmentEngine, SessionRegistry, SweepHandle, WarningEngine,
};
use warden_storage::{SqlSettings, Store};
use warden_types::{PlayerId, Punishment};

use crate::error::Result;

/// Admission decision for a connecting session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDecision {
    /// The session may proceed; co-resident identities already known for
    /// the address, if any.
    Allowed { alts: Vec<PlayerId> },
    /// The session is refused by the given binding punishment.
    Denied(Punishment),
}

/// The assembled moderation subsystem.
///
/// Construction is explicit: the caller passes the collaborators in, the
/// configuration picks the backend exactly once, and the expiration sweep
/// starts immediately. The backend itself is never handed out; every
/// mutation goes through an engine, so the cache-invalidation and
/// invariant checks cannot be bypassed. [`shutdown`](Self::shutdown)
/// stops the sweep and releases the backend.
pub struct Moderation {
    store: Arc<Store>,
    punishments: Arc<PunishmentEngine>,
    warnings: Arc<WarningEngine>,
    notes: Arc<NoteEngine>,
    alts: Arc<AltEngine>,
    sweep: Option<SweepHandle>,
}

impl Moderation {
    /// Opens the configured backend, wires the engines, and starts the
    /// periodic expiration sweep.
    pub fn open(
        config: &WardenConfig,
        sessions: Arc<dyn SessionRegistry>,
        notifier: Arc<dyn NotificationFanout>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(match config.storage.backend {
            BackendKind::File => Store::file(&config.storage.data_dir)?,
            BackendKind::Sql => {
                let mut settings = SqlSettings::new(&config.storage.sql_path);
                settings.workers = config.storage.sql_workers;
                settings.call_deadline = config.storage.sql_call_deadline();
                Store::sql(settings)?
            }
        });

        let punishments = Arc::new(PunishmentEngine::with_cache_ttl(
            Arc::clone(&store),
            sessions,
            Arc::clone(&notifier),
            config.cache.ttl(),
        ));
        let warnings = Arc::new(WarningEngine::with_thresholds(
            Arc::clone(&store),
            Arc::clone(&punishments),
            thresholds(config),
        ));
        let notes = Arc::new(NoteEngine::new(Arc::clone(&store)));
        let alts = Arc::new(AltEngine::new(Arc::clone(&store), notifier));

        let sweep = ExpirySweeper::new(Arc::clone(&store), Arc::clone(&punishments))
            .start(config.sweep.interval())?;

        tracing::info!(backend = ?config.storage.backend, "moderation subsystem started");
        Ok(Self {
            store,
            punishments,
            warnings,
            notes,
            alts,
            sweep: Some(sweep),
        })
    }

    /// Gate for session admission: an active ban on the identity, then an
    /// active ban on the address, refuses the session; otherwise the
    /// address is recorded and co-resident identities are reported.
    pub fn session_start(&self, identity: PlayerId, address: &str) -> Result<SessionDecision> {
        if let Some(ban) = self.punishments.active_ban(identity)? {
            return Ok(SessionDecision::Denied(ban));
        }
        if let Some(ip_ban) = self.punishments.active_ip_ban(address)? {
            return Ok(SessionDecision::Denied(ip_ban));
        }
        let alts = self.alts.on_session_start(identity, address)?;
        Ok(SessionDecision::Allowed { alts })
    }

    /// Gate for chat: the punishment currently silencing the identity, if
    /// any.
    pub fn chat_block(&self, identity: PlayerId) -> Result<Option<Punishment>> {
        Ok(self.punishments.active_mute(identity)?)
    }

    pub fn punishments(&self) -> &PunishmentEngine {
        &self.punishments
    }

    pub fn warnings(&self) -> &WarningEngine {
        &self.warnings
    }

    pub fn notes(&self) -> &NoteEngine {
        &self.notes
    }

    pub fn alts(&self) -> &AltEngine {
        &self.alts
    }

    /// Stops the sweep and releases the backend.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(sweep) = self.sweep.take() {
            sweep.stop();
        }
        self.store.close()?;
        tracing::info!("moderation subsystem stopped");
        Ok(())
    }
}

fn thresholds(config: &WardenConfig) -> EscalationThresholds {
    EscalationThresholds {
        notice_level: config.escalation.notice_level,
        mute_level: config.escalation.mute_level,
        mute_duration: config.escalation.mute_duration(),
        ban_level: config.escalation.ban_level,
        ban_duration: config.escalation.ban_duration(),
    }
}
