//! Physical identities and the slot table that keeps them stable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Default prefix used when deriving human-facing names from slots.
pub const DEFAULT_NAME_PREFIX: &str = "dev";

/// Permanent identity of one physical device (its serial number).
///
/// Serialized as the same 12-digit upper-case hex string that `Display` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalIdentity(pub u64);

impl PhysicalIdentity {
    pub fn serial(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PhysicalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012X}", self.0)
    }
}

impl From<u64> for PhysicalIdentity {
    fn from(serial: u64) -> Self {
        Self(serial)
    }
}

impl FromStr for PhysicalIdentity {
    type Err = std::num::ParseIntError;

    /// Parses a hex serial, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u64::from_str_radix(digits, 16).map(Self)
    }
}

impl Serialize for PhysicalIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PhysicalIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Stable logical index a device keeps for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionSlot(pub usize);

impl SessionSlot {
    pub fn index(&self) -> usize {
        self.0
    }

    /// Human-facing name for this slot, e.g. `dev0`.
    pub fn name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }
}

impl fmt::Display for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only table mapping physical identities to slots.
///
/// Slots are handed out sequentially from 0. A slot bound to an identity keeps
/// that identity forever; unknown identities always get a fresh slot.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    by_identity: HashMap<PhysicalIdentity, SessionSlot>,
    /// Identity of every allocated slot, indexed by slot.
    slots: Vec<Option<PhysicalIdentity>>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an identity to its slot, allocating one if needed.
    pub fn resolve(&mut self, identity: Option<PhysicalIdentity>) -> SessionSlot {
        let Some(identity) = identity else {
            return self.allocate(None);
        };

        if let Some(slot) = self.by_identity.get(&identity) {
            return *slot;
        }

        let slot = self.allocate(Some(identity));
        self.by_identity.insert(identity, slot);
        slot
    }

    fn allocate(&mut self, identity: Option<PhysicalIdentity>) -> SessionSlot {
        let slot = SessionSlot(self.slots.len());
        self.slots.push(identity);
        slot
    }

    /// Slot previously assigned to `identity`, without allocating.
    pub fn slot_of(&self, identity: &PhysicalIdentity) -> Option<SessionSlot> {
        self.by_identity.get(identity).copied()
    }

    /// Identity bound to `slot`. `None` for unallocated slots and for slots
    /// allocated to an unknown identity.
    pub fn identity_of(&self, slot: SessionSlot) -> Option<PhysicalIdentity> {
        self.slots.get(slot.0).copied().flatten()
    }

    /// Number of slots handed out so far.
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }
}
