//! # devsession-core
//!
//! Stable session identities for hot-pluggable devices.
//!
//! Discovery feeds report raw device handles to a [`DeviceRegistry`]. The
//! registry maps each device's serial number to a slot that survives
//! disconnects, watches the handle's [`ChannelHealth`] and reports
//! [`LifecycleEvent`]s to a [`LifecycleSink`].
//!
//! ## Key Concepts
//!
//! - **Slot**: stable index of a physical device, named e.g. `dev0`
//! - **Channel health**: one-shot signal fired when a connection breaks
//! - **Lifecycle event**: Connected, Reconnected or Lost
//! - **Shutdown token**: silences Lost events while the process exits

pub mod event;
pub mod feed;
pub mod health;
pub mod identity;
pub mod session;
pub mod shutdown;
pub mod sink;

// Re-export commonly used types
pub use event::{LifecycleEvent, LifecycleKind};
pub use feed::{discovery_channel, run_feed, Discovery, DiscoveryFilter};
pub use health::{ChannelHealth, Subscription};
pub use identity::{IdentityResolver, PhysicalIdentity, SessionSlot, DEFAULT_NAME_PREFIX};
pub use session::{
    DeviceHandle, DeviceRegistry, RegistryBuilder, SessionError, SessionInfo, SessionState,
};
pub use shutdown::ShutdownToken;
pub use sink::LifecycleSink;
