//! Moderation engines for Warden.
//!
//! The engines sit between callers and the storage contract:
//!
//! - [`PunishmentEngine`]: bans, mutes, kicks, and IP bans, with family
//!   exclusivity, a short-TTL per-target read cache, and the session
//!   disconnect / notification side effects.
//! - [`WarningEngine`]: graduated warnings, the numeric level, and
//!   automatic escalation into the punishment engine.
//! - [`NoteEngine`]: free-text annotations with backend-assigned
//!   identifiers.
//! - [`AltEngine`]: identity-address correlation and alt detection on
//!   session start.
//!
//! [`ExpirySweeper`] is the background reconciliation task that
//! deactivates lapsed temporary punishments. All engines are constructed
//! explicitly with their dependencies; there is no ambient service
//! registry.

mod alts;
mod cache;
mod error;
mod keyed;
mod notes;
mod punishment;
pub mod session;
mod sweep;
#[cfg(test)]
pub(crate) mod testutil;
mod warning;

pub use alts::AltEngine;
pub use error::{EngineError, Result};
pub use notes::NoteEngine;
pub use punishment::{DEFAULT_CACHE_TTL, PunishmentEngine};
pub use session::{NotificationFanout, SessionRegistry, perms};
pub use sweep::{DEFAULT_SWEEP_INTERVAL, ExpirySweeper, SweepHandle, SweepReport};
pub use warning::{Escalation, EscalationThresholds, WarningEngine};

/// Rejects addresses that do not parse as an IP address before they reach
/// storage or the keyed locks.
pub(crate) fn validate_address(address: &str) -> Result<()> {
    if address.parse::<std::net::IpAddr>().is_ok() {
        Ok(())
    } else {
        Err(EngineError::InvalidAddress(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation_accepts_v4_and_v6() {
        assert!(validate_address("203.0.113.7").is_ok());
        assert!(validate_address("2001:db8::1").is_ok());
        assert!(validate_address("localhost").is_err());
        assert!(validate_address("").is_err());
    }
}
