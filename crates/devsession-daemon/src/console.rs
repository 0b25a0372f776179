//! Console presentation of lifecycle events.

use devsession_core::{LifecycleEvent, LifecycleKind, LifecycleSink};
use std::sync::atomic::{AtomicBool, Ordering};

const UNKNOWN_SERIAL: &str = "[unknown serial number]";

/// Logs lifecycle events the way a user at the terminal wants to read them.
///
/// The first connection is followed by the short form of the help text, since
/// the startup banner was written for an empty registry.
#[derive(Debug)]
pub struct ConsoleSink {
    prefix: String,
    helped: AtomicBool,
}

impl ConsoleSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            helped: AtomicBool::new(false),
        }
    }

    /// Help to show after `event`, at most once per sink.
    fn follow_up(&self, event: &LifecycleEvent) -> Option<String> {
        if event.kind != LifecycleKind::Connected || self.helped.swap(true, Ordering::Relaxed) {
            return None;
        }
        Some(help_text(&self.prefix, true))
    }
}

impl LifecycleSink for ConsoleSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        let (level, message) = describe(event, &self.prefix);
        log::log!(level, "{}", message);
        if let Some(help) = self.follow_up(event) {
            println!("{}", help);
        }
    }
}

/// Log level and message for an event.
pub fn describe(event: &LifecycleEvent, prefix: &str) -> (log::Level, String) {
    let name = event.name(prefix);
    let serial = event
        .identity
        .map_or_else(|| UNKNOWN_SERIAL.to_string(), |i| i.to_string());

    match event.kind {
        LifecycleKind::Connected => (
            log::Level::Info,
            format!("Connected to device {} as {}", serial, name),
        ),
        LifecycleKind::Reconnected => (
            log::Level::Info,
            format!("Reconnected to device {} as {}", serial, name),
        ),
        LifecycleKind::Lost => (log::Level::Warn, format!("Oh no {} disappeared", name)),
    }
}

/// Usage hints. Without devices the text explains what to expect on
/// connect; once one is known it only points at the stable names.
pub fn help_text(prefix: &str, has_devices: bool) -> String {
    let first = format!("{}0", prefix);
    let mut lines = Vec::new();
    if !has_devices {
        lines.push("Please connect your device.".to_string());
        lines.push(String::new());
        lines.push("After that, the following message should appear:".to_string());
        lines.push(format!("  \"Connected to device [serial number] as {}\"", first));
        lines.push(String::new());
    }
    lines.push(format!(
        "Devices keep their name across reconnects: {} stays {} until exit.",
        first, first
    ));
    lines.push("Press Ctrl-C to quit.".to_string());
    lines.join("\n")
}
