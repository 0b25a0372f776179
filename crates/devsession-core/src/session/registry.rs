//! DeviceRegistry - stable sessions for devices that come and go.

use super::outbox::Outbox;
use super::state::{DeviceSession, SessionInfo, SessionState};
use crate::event::{LifecycleEvent, LifecycleKind};
use crate::health::ChannelHealth;
use crate::identity::{IdentityResolver, PhysicalIdentity, SessionSlot, DEFAULT_NAME_PREFIX};
use crate::shutdown::ShutdownToken;
use crate::sink::{LifecycleSink, NullSink};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;

/// A raw device handle as delivered by a discovery feed.
///
/// The registry only needs the handle's channel health signal; transport
/// resources stay with the handle itself.
pub trait DeviceHandle: Clone + Send + Sync + 'static {
    fn channel_health(&self) -> &ChannelHealth;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No device session in slot {0}")]
    UnknownSlot(SessionSlot),

    #[error("Device in slot {0} is disconnected")]
    Disconnected(SessionSlot),
}

/// Configuration for building a [`DeviceRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    sink: Option<Arc<dyn LifecycleSink>>,
    shutdown: Option<ShutdownToken>,
    name_prefix: Option<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where lifecycle events go. Defaults to a sink that drops them.
    pub fn sink(mut self, sink: Arc<dyn LifecycleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing shutdown token (usually the process-wide one).
    pub fn shutdown_token(mut self, token: ShutdownToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Prefix for session names, `dev` by default.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn build<H: DeviceHandle>(self) -> DeviceRegistry<H> {
        DeviceRegistry {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState {
                    resolver: IdentityResolver::new(),
                    sessions: Vec::new(),
                }),
                outbox: Outbox::default(),
                sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
                shutdown: self.shutdown.unwrap_or_default(),
                name_prefix: self
                    .name_prefix
                    .unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_string()),
            }),
        }
    }
}

struct RegistryState<H> {
    resolver: IdentityResolver,
    /// Indexed by slot. Every slot the resolver hands out gets a session in the
    /// same critical section, so this stays dense.
    sessions: Vec<DeviceSession<H>>,
}

struct Shared<H> {
    state: Mutex<RegistryState<H>>,
    /// Events waiting for the sink, in the order the state changed.
    outbox: Outbox,
    sink: Arc<dyn LifecycleSink>,
    shutdown: ShutdownToken,
    name_prefix: String,
}

impl<H> Shared<H> {
    fn lock(&self) -> MutexGuard<'_, RegistryState<H>> {
        // Sinks never run under this lock, but a poisoned lock must still not
        // wedge discovery.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand queued events to the sink. Never call with the state lock held.
    fn deliver(&self) {
        self.outbox.drain(self.sink.as_ref(), &self.shutdown, &self.name_prefix);
    }

    fn channel_broken(&self, slot: SessionSlot, generation: u64) {
        {
            let mut state = self.lock();
            let Some(session) = state.sessions.get_mut(slot.index()) else {
                log::warn!("Channel break for unknown slot {}", slot);
                return;
            };
            if !session.mark_lost(generation) {
                log::debug!(
                    "Ignoring break of superseded connection for {}",
                    slot.name(&self.name_prefix)
                );
                return;
            }
            let identity = session.identity;
            self.outbox.push(LifecycleEvent::new(LifecycleKind::Lost, slot, identity));
        }
        self.deliver();
    }
}

/// Registry of device sessions.
///
/// Cheap to clone; clones share the same sessions. Hand a clone to each
/// discovery feed.
pub struct DeviceRegistry<H> {
    shared: Arc<Shared<H>>,
}

impl<H> Clone for DeviceRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: DeviceHandle> DeviceRegistry<H> {
    /// Registry reporting to `sink` with default settings.
    pub fn new(sink: Arc<dyn LifecycleSink>) -> Self {
        RegistryBuilder::new().sink(sink).build()
    }

    /// Register a sighting of a device.
    ///
    /// Known identities get their old slot back (`Reconnected`); unknown
    /// identities and first sightings get a fresh slot (`Connected`). The
    /// event is queued before the handle's health signal is watched, so a
    /// handle that is already broken reports `Connected` then `Lost`.
    ///
    /// The sink sees events in the order the registry state changed. When
    /// another thread is already delivering, the event may reach the sink
    /// after this call returns.
    pub fn on_device_discovered(
        &self,
        handle: H,
        identity: Option<PhysicalIdentity>,
    ) -> LifecycleEvent {
        let health = handle.channel_health().clone();

        let (event, generation, stale) = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            let slot = state.resolver.resolve(identity);
            debug_assert_eq!(state.resolver.identity_of(slot), identity);

            let (event, generation, stale) = match state.sessions.get_mut(slot.index()) {
                Some(session) => {
                    let stale = session.reconnect(handle);
                    let event = LifecycleEvent::new(LifecycleKind::Reconnected, slot, identity);
                    (event, session.generation, stale)
                }
                None => {
                    debug_assert_eq!(slot.index(), state.sessions.len());
                    let session = DeviceSession::new(slot, identity, handle);
                    let generation = session.generation;
                    state.sessions.push(session);
                    let event = LifecycleEvent::new(LifecycleKind::Connected, slot, identity);
                    (event, generation, None)
                }
            };
            self.shared.outbox.push(event.clone());
            (event, generation, stale)
        };

        if let Some(stale) = stale {
            stale.cancel();
        }

        let slot = event.slot;
        log::debug!(
            "Device {} {} as {}",
            identity.map_or_else(|| "with unknown serial".to_string(), |i| i.to_string()),
            event.kind,
            slot.name(&self.shared.name_prefix)
        );
        self.shared.deliver();

        let weak: Weak<Shared<H>> = Arc::downgrade(&self.shared);
        let subscription = health.subscribe(move || {
            if let Some(shared) = weak.upgrade() {
                shared.channel_broken(slot, generation);
            }
        });

        let superseded = {
            let mut state = self.shared.lock();
            match state.sessions.get_mut(slot.index()) {
                Some(session)
                    if session.generation == generation
                        && session.state == SessionState::Connected =>
                {
                    session.subscription = Some(subscription);
                    None
                }
                _ => Some(subscription),
            }
        };
        if let Some(subscription) = superseded {
            subscription.cancel();
        }

        event
    }

    /// Live handle of the device in `slot`.
    pub fn handle(&self, slot: SessionSlot) -> Result<H, SessionError> {
        let state = self.shared.lock();
        let session = state
            .sessions
            .get(slot.index())
            .ok_or(SessionError::UnknownSlot(slot))?;
        match session.state {
            SessionState::Connected => Ok(session.handle.clone()),
            SessionState::Disconnected => Err(SessionError::Disconnected(slot)),
        }
    }
}

impl<H> DeviceRegistry<H> {
    pub fn session(&self, slot: SessionSlot) -> Option<SessionInfo> {
        self.shared.lock().sessions.get(slot.index()).map(DeviceSession::info)
    }

    /// Snapshot of every session, ordered by slot.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.shared.lock().sessions.iter().map(DeviceSession::info).collect()
    }

    pub fn slot_of(&self, identity: &PhysicalIdentity) -> Option<SessionSlot> {
        self.shared.lock().resolver.slot_of(identity)
    }

    /// Human-facing name of a slot, e.g. `dev0`.
    pub fn name_of(&self, slot: SessionSlot) -> String {
        slot.name(&self.shared.name_prefix)
    }

    /// Parse a session name produced by [`Self::name_of`] back into a slot.
    pub fn slot_for_name(&self, name: &str) -> Option<SessionSlot> {
        let index = name.strip_prefix(self.shared.name_prefix.as_str())?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let slot = SessionSlot(index.parse().ok()?);
        (slot.index() < self.len()).then_some(slot)
    }

    pub fn name_prefix(&self) -> &str {
        &self.shared.name_prefix
    }

    /// Number of sessions (slots handed out).
    pub fn len(&self) -> usize {
        self.shared.lock().resolver.allocated()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn connected_count(&self) -> usize {
        self.shared
            .lock()
            .sessions
            .iter()
            .filter(|s| s.state == SessionState::Connected)
            .count()
    }

    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.shared.shutdown
    }
}

impl<H> fmt::Debug for DeviceRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("sessions", &self.len())
            .field("name_prefix", &self.shared.name_prefix)
            .finish()
    }
}
