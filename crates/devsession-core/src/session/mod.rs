//! Device sessions and the registry that owns them.
//!
//! A session is created the first time a physical device is seen and lives
//! for the rest of the process, so its slot (and the name derived from it)
//! keeps pointing at the same device across reconnects.

mod outbox;
mod registry;
mod state;

pub use registry::{DeviceHandle, DeviceRegistry, RegistryBuilder, SessionError};
pub use state::{SessionInfo, SessionState};
