//! Lifecycle events emitted by the registry.

use crate::identity::{PhysicalIdentity, SessionSlot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleKind {
    /// First sighting of a device in this slot.
    Connected,
    /// A device came back to a slot it held before.
    Reconnected,
    /// The session's channel broke.
    Lost,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnected => "reconnected",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change in a session's reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub slot: SessionSlot,
    /// `None` when the device never reported an identity.
    pub identity: Option<PhysicalIdentity>,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, slot: SessionSlot, identity: Option<PhysicalIdentity>) -> Self {
        Self {
            kind,
            slot,
            identity,
            timestamp: Utc::now(),
        }
    }

    /// True for `Reconnected`, i.e. the slot was in use before.
    pub fn is_repeat(&self) -> bool {
        self.kind == LifecycleKind::Reconnected
    }

    /// Human-facing name of the session, e.g. `dev0`.
    pub fn name(&self, prefix: &str) -> String {
        self.slot.name(prefix)
    }
}
