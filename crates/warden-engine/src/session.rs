//! Boundary traits for the collaborators the engines drive.
//!
//! The session server owns connectivity and presentation; the engines only
//! need these narrow contracts. Production wires the real registry and
//! fan-out in; tests substitute recording doubles.

use warden_types::PlayerId;

/// Read access to live sessions plus the forced-disconnect side effect.
pub trait SessionRegistry: Send + Sync {
    /// The network address the identity is currently connected from, when
    /// connected.
    fn address_of(&self, identity: PlayerId) -> Option<String>;

    fn is_connected(&self, identity: PlayerId) -> bool;

    /// Every currently connected identity.
    fn connected(&self) -> Vec<PlayerId>;

    /// Forcibly ends the identity's session, showing `message`.
    fn disconnect(&self, identity: PlayerId, message: &str);
}

/// Broadcast to every observer holding a named permission.
pub trait NotificationFanout: Send + Sync {
    fn broadcast(&self, permission: &str, message: &str);
}

/// Permission names gating each notification stream.
pub mod perms {
    pub const NOTIFY_BAN: &str = "warden.notify.ban";
    pub const NOTIFY_MUTE: &str = "warden.notify.mute";
    pub const NOTIFY_KICK: &str = "warden.notify.kick";
    pub const NOTIFY_IP_BAN: &str = "warden.notify.ipban";
    pub const NOTIFY_ALTS: &str = "warden.notify.alts";
}
