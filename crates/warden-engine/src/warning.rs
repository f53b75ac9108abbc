//! Warning engine: graduated warnings and automatic escalation.
//!
//! Each warning carries a severity in 1..=5; a target's level is the sum
//! of severities over their currently-active warnings. Callers invoke
//! [`WarningEngine::check_escalation`] after every warning; the level is
//! mapped onto automatic actions through configurable thresholds.
//!
//! The lowest tier is notice-only: the level is logged but no punishment
//! is issued, since a kick escalation has never been wired for it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use warden_storage::Store;
use warden_types::{PlayerId, Warning, WarningDraft, SEVERITY_MAX, SEVERITY_MIN};

use crate::error::{EngineError, Result};
use crate::punishment::PunishmentEngine;

/// Level boundaries and durations for automatic escalation.
#[derive(Debug, Clone)]
pub struct EscalationThresholds {
    /// At or above this level the engine logs a notice.
    pub notice_level: u32,
    /// At or above this level the target is temporarily muted.
    pub mute_level: u32,
    pub mute_duration: Duration,
    /// At or above this level the target is temporarily banned.
    pub ban_level: u32,
    pub ban_duration: Duration,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            notice_level: 5,
            mute_level: 10,
            mute_duration: Duration::from_secs(2 * 60 * 60),
            ban_level: 15,
            ban_duration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// The action taken by an escalation check, reported back so callers and
/// tests can observe the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Below every threshold; nothing happened.
    None,
    /// Notice tier reached; logged only, no punishment issued.
    Notice { level: u32 },
    /// The target was temporarily muted by the system.
    TempMute { level: u32 },
    /// The target was temporarily banned by the system.
    TempBan { level: u32 },
}

/// Engine for warnings and their escalation into punishments.
pub struct WarningEngine {
    store: Arc<Store>,
    punishments: Arc<PunishmentEngine>,
    thresholds: EscalationThresholds,
}

impl WarningEngine {
    pub fn new(store: Arc<Store>, punishments: Arc<PunishmentEngine>) -> Self {
        Self::with_thresholds(store, punishments, EscalationThresholds::default())
    }

    pub fn with_thresholds(
        store: Arc<Store>,
        punishments: Arc<PunishmentEngine>,
        thresholds: EscalationThresholds,
    ) -> Self {
        Self {
            store,
            punishments,
            thresholds,
        }
    }

    /// Records a warning. Severity outside 1..=5 is rejected before
    /// anything is stored.
    pub fn warn(
        &self,
        target: PlayerId,
        issuer: Option<PlayerId>,
        reason: &str,
        severity: u8,
    ) -> Result<Warning> {
        if !(SEVERITY_MIN..=SEVERITY_MAX).contains(&severity) {
            return Err(EngineError::SeverityOutOfRange(severity));
        }
        let warning = self
            .store
            .insert_warning(WarningDraft::new(target, issuer, reason, severity))?;
        tracing::info!(%target, severity, "warning recorded");
        Ok(warning)
    }

    /// Soft-deactivates one warning, lowering the target's level by
    /// exactly that warning's severity.
    pub fn remove_warning(&self, target: PlayerId, id: i64) -> Result<()> {
        if self.store.deactivate_warning(target, id)? {
            Ok(())
        } else {
            Err(EngineError::WarningNotFound { target, id })
        }
    }

    /// The target's warnings, active and inactive.
    pub fn warnings(&self, target: PlayerId) -> Result<Vec<Warning>> {
        Ok(self.store.warnings_for(target)?)
    }

    pub fn warning(&self, id: i64) -> Result<Option<Warning>> {
        Ok(self.store.warning(id)?)
    }

    /// Sum of severities over currently-active warnings only.
    pub fn warning_level(&self, target: PlayerId) -> Result<u32> {
        Ok(self
            .store
            .warnings_for(target)?
            .iter()
            .filter(|w| w.active)
            .map(|w| u32::from(w.severity))
            .sum())
    }

    /// Maps the target's level onto an automatic action. Callers invoke
    /// this after every [`warn`](Self::warn). A tier that would punish an
    /// already-sanctioned target reports the tier without stacking a
    /// second punishment.
    pub fn check_escalation(&self, target: PlayerId) -> Result<Escalation> {
        let level = self.warning_level(target)?;

        if level >= self.thresholds.ban_level {
            let reason = format!("Automatic ban: warning level {level}");
            let expires = Utc::now() + self.thresholds.ban_duration;
            match self.punishments.ban(None, target, &reason, Some(expires)) {
                Ok(_) => {}
                Err(EngineError::AlreadySanctioned { .. }) => {
                    tracing::debug!(%target, level, "ban tier reached but target is already banned");
                }
                Err(other) => return Err(other),
            }
            return Ok(Escalation::TempBan { level });
        }

        if level >= self.thresholds.mute_level {
            let reason = format!("Automatic mute: warning level {level}");
            let expires = Utc::now() + self.thresholds.mute_duration;
            match self.punishments.mute(None, target, &reason, Some(expires)) {
                Ok(_) => {}
                Err(EngineError::AlreadySanctioned { .. }) => {
                    tracing::debug!(%target, level, "mute tier reached but target is already muted");
                }
                Err(other) => return Err(other),
            }
            return Ok(Escalation::TempMute { level });
        }

        if level >= self.thresholds.notice_level {
            tracing::warn!(%target, level, "warning level reached the notice tier; no automatic action is wired");
            return Ok(Escalation::Notice { level });
        }

        Ok(Escalation::None)
    }
}
