//! Hand-off from discovery feeds to the registry.
//!
//! Transports enumerate devices on their own task and push [`Discovery`]
//! messages into a channel; [`run_feed`] drains that channel into a
//! [`DeviceRegistry`].

use crate::identity::PhysicalIdentity;
use crate::session::{DeviceHandle, DeviceRegistry};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Default buffer size of [`discovery_channel`].
pub const DEFAULT_FEED_CAPACITY: usize = 32;

/// A device sighting reported by a discovery feed.
#[derive(Debug, Clone)]
pub struct Discovery<H> {
    pub handle: H,
    /// `None` when the handle does not expose a serial number.
    pub identity: Option<PhysicalIdentity>,
}

impl<H> Discovery<H> {
    pub fn new(handle: H, identity: Option<PhysicalIdentity>) -> Self {
        Self { handle, identity }
    }
}

/// Create the channel a feed uses to report devices.
pub fn discovery_channel<H>(
    capacity: usize,
) -> (mpsc::Sender<Discovery<H>>, mpsc::Receiver<Discovery<H>>) {
    mpsc::channel(capacity)
}

/// Restricts which devices a feed registers.
///
/// With no serials configured every device is accepted. Once serials are
/// configured, only those devices are accepted; devices without a serial are
/// rejected since they cannot be matched.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    serials: Option<HashSet<PhysicalIdentity>>,
}

impl DiscoveryFilter {
    /// Accept every device.
    pub fn any() -> Self {
        Self::default()
    }

    /// Accept only the given devices.
    pub fn only(serials: impl IntoIterator<Item = PhysicalIdentity>) -> Self {
        Self {
            serials: Some(serials.into_iter().collect()),
        }
    }

    pub fn accepts(&self, identity: Option<&PhysicalIdentity>) -> bool {
        match (&self.serials, identity) {
            (None, _) => true,
            (Some(serials), Some(identity)) => serials.contains(identity),
            (Some(_), None) => false,
        }
    }
}

/// Forward discoveries into `registry` until the channel closes or the
/// registry's shutdown token is set.
///
/// Returns how many devices were registered.
pub async fn run_feed<H: DeviceHandle>(
    registry: &DeviceRegistry<H>,
    mut rx: mpsc::Receiver<Discovery<H>>,
    filter: &DiscoveryFilter,
) -> usize {
    let shutdown = registry.shutdown_token().clone();
    let mut registered = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::debug!("Discovery stopped by shutdown");
                break;
            }
            next = rx.recv() => {
                let Some(discovery) = next else {
                    log::debug!("Discovery feed closed");
                    break;
                };
                if !filter.accepts(discovery.identity.as_ref()) {
                    log::debug!(
                        "Ignoring device {}: not in serial filter",
                        discovery
                            .identity
                            .map_or_else(|| "with unknown serial".to_string(), |i| i.to_string())
                    );
                    continue;
                }
                registry.on_device_discovered(discovery.handle, discovery.identity);
                registered += 1;
            }
        }
    }

    registered
}
