//! Per-session state.

use crate::health::Subscription;
use crate::identity::{PhysicalIdentity, SessionSlot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Connected,
    Disconnected,
}

/// One physical device as seen by the registry.
///
/// Sessions are never removed. Each connection of the device bumps the
/// generation so that a late break of an older handle can be told apart from a
/// break of the current one.
pub(crate) struct DeviceSession<H> {
    pub slot: SessionSlot,
    pub identity: Option<PhysicalIdentity>,
    pub handle: H,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
    pub lost_at: Option<DateTime<Utc>>,
    pub reconnects: u32,
    pub generation: u64,
    /// Health subscription of the current handle, if still pending.
    pub subscription: Option<Subscription>,
}

impl<H> DeviceSession<H> {
    pub fn new(slot: SessionSlot, identity: Option<PhysicalIdentity>, handle: H) -> Self {
        Self {
            slot,
            identity,
            handle,
            state: SessionState::Connected,
            connected_at: Utc::now(),
            lost_at: None,
            reconnects: 0,
            generation: 0,
            subscription: None,
        }
    }

    /// Swap in the handle of a new connection.
    ///
    /// Returns the previous handle's subscription so the caller can cancel it
    /// outside the registry lock.
    pub fn reconnect(&mut self, handle: H) -> Option<Subscription> {
        self.handle = handle;
        self.state = SessionState::Connected;
        self.connected_at = Utc::now();
        self.reconnects += 1;
        self.generation += 1;
        self.subscription.take()
    }

    /// Record a channel break for `generation`.
    ///
    /// Returns `false` when the break belongs to a superseded connection or the
    /// session is already disconnected.
    pub fn mark_lost(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state == SessionState::Disconnected {
            return false;
        }
        self.state = SessionState::Disconnected;
        self.lost_at = Some(Utc::now());
        self.subscription = None;
        true
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            slot: self.slot,
            identity: self.identity,
            state: self.state,
            connected_at: self.connected_at,
            lost_at: self.lost_at,
            reconnects: self.reconnects,
        }
    }
}

/// Snapshot of a session without its handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub slot: SessionSlot,
    pub identity: Option<PhysicalIdentity>,
    pub state: SessionState,
    /// Start of the most recent connection.
    pub connected_at: DateTime<Utc>,
    /// When the most recent connection broke, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lost_at: Option<DateTime<Utc>>,
    pub reconnects: u32,
}

impl SessionInfo {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}
