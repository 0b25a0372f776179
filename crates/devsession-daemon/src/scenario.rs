//! Scripted discovery feed.
//!
//! Stands in for a transport: a JSON-lines script attaches simulated devices
//! and breaks their channels, which is enough to drive the registry end to end
//! without hardware.
//!
//! ```text
//! {"op": "attach", "device": "left", "serial": "0x2061386"}
//! {"op": "sleep", "ms": 100}
//! {"op": "break", "device": "left"}
//! {"op": "attach", "device": "left", "serial": "0x2061386"}
//! ```

use devsession_core::{ChannelHealth, DeviceHandle, Discovery, PhysicalIdentity};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scenario step on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Line {line} breaks device '{device}' before it was attached")]
    UnknownDevice { line: usize, device: String },
}

/// A device produced by the script. Each attach creates a fresh handle with
/// its own channel.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    label: Arc<str>,
    health: ChannelHealth,
}

impl SimulatedDevice {
    pub fn new(label: &str) -> Self {
        Self {
            label: Arc::from(label),
            health: ChannelHealth::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Break the device's channel, as the transport would on an I/O failure.
    pub fn disconnect(&self) -> bool {
        self.health.fire()
    }
}

impl DeviceHandle for SimulatedDevice {
    fn channel_health(&self) -> &ChannelHealth {
        &self.health
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    Attach {
        device: String,
        #[serde(default)]
        serial: Option<PhysicalIdentity>,
    },
    Break {
        device: String,
    },
    Sleep {
        ms: u64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scenario {
    steps: Vec<Step>,
}

impl Scenario {
    /// Parse a script. Blank lines and lines starting with `#` are skipped.
    pub fn parse(source: &str) -> Result<Self, ScenarioError> {
        let mut steps = Vec::new();
        let mut attached = HashSet::new();

        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }

            let step: Step =
                serde_json::from_str(raw).map_err(|source| ScenarioError::Parse { line, source })?;
            match &step {
                Step::Attach { device, .. } => {
                    attached.insert(device.clone());
                }
                Step::Break { device } if !attached.contains(device) => {
                    return Err(ScenarioError::UnknownDevice {
                        line,
                        device: device.clone(),
                    });
                }
                _ => {}
            }
            steps.push(step);
        }

        Ok(Self { steps })
    }

    pub async fn load(path: &Path) -> Result<Self, ScenarioError> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ScenarioError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&source)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the script, reporting attached devices on `tx`.
    ///
    /// Returns how many attach steps were delivered. Stops early if the
    /// receiving side goes away.
    pub async fn play(self, tx: mpsc::Sender<Discovery<SimulatedDevice>>) -> usize {
        let mut live: HashMap<String, SimulatedDevice> = HashMap::new();
        let mut attached = 0;

        for step in self.steps {
            match step {
                Step::Attach { device, serial } => {
                    let handle = SimulatedDevice::new(&device);
                    watch_channel(handle.clone());
                    live.insert(device, handle.clone());
                    if tx.send(Discovery::new(handle, serial)).await.is_err() {
                        log::debug!("Discovery feed closed, stopping scenario");
                        break;
                    }
                    attached += 1;
                }
                Step::Break { device } => {
                    if let Some(handle) = live.get(&device) {
                        log::debug!("Breaking channel of '{}'", handle.label());
                        handle.disconnect();
                    }
                }
                Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            }
        }

        attached
    }
}

/// Stand-in for a transport's read loop, which ends when the channel breaks.
fn watch_channel(device: SimulatedDevice) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        device.channel_health().broken().await;
        log::debug!("Channel of '{}' closed", device.label());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devsession_core::discovery_channel;

    mod parse {
        use super::*;

        #[test]
        fn parses_all_step_kinds() {
            let scenario = Scenario::parse(
                r#"
                # a device comes and goes
                {"op": "attach", "device": "a", "serial": "0x2A"}
                {"op": "sleep", "ms": 5}
                {"op": "break", "device": "a"}
                {"op": "attach", "device": "b"}
                "#,
            )
            .unwrap();

            assert_eq!(
                scenario.steps(),
                &[
                    Step::Attach {
                        device: "a".to_string(),
                        serial: Some(PhysicalIdentity(0x2A)),
                    },
                    Step::Sleep { ms: 5 },
                    Step::Break {
                        device: "a".to_string()
                    },
                    Step::Attach {
                        device: "b".to_string(),
                        serial: None,
                    },
                ]
            );
        }

        #[test]
        fn reports_line_of_bad_json() {
            let err = Scenario::parse("{\"op\": \"sleep\", \"ms\": 1}\n{\"op\": \"explode\"}").unwrap_err();
            assert!(matches!(err, ScenarioError::Parse { line: 2, .. }));
        }

        #[test]
        fn rejects_bad_serial() {
            let err = Scenario::parse(r#"{"op": "attach", "device": "a", "serial": "xyz"}"#).unwrap_err();
            assert!(matches!(err, ScenarioError::Parse { line: 1, .. }));
        }

        #[test]
        fn rejects_break_before_attach() {
            let err = Scenario::parse(r#"{"op": "break", "device": "ghost"}"#).unwrap_err();
            match err {
                ScenarioError::UnknownDevice { line, device } => {
                    assert_eq!(line, 1);
                    assert_eq!(device, "ghost");
                }
                other => panic!("Expected UnknownDevice, got {:?}", other),
            }
        }

        #[test]
        fn empty_script_is_valid() {
            assert!(Scenario::parse("\n# nothing\n").unwrap().steps().is_empty());
        }
    }

    mod load {
        use super::*;

        #[tokio::test]
        async fn missing_file_is_io_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = Scenario::load(&dir.path().join("none.jsonl")).await.unwrap_err();
            assert!(matches!(err, ScenarioError::Io { .. }));
        }

        #[tokio::test]
        async fn loads_from_disk() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("script.jsonl");
            std::fs::write(&path, r#"{"op": "attach", "device": "a"}"#).unwrap();
            assert_eq!(Scenario::load(&path).await.unwrap().steps().len(), 1);
        }
    }

    mod play {
        use super::*;

        #[tokio::test]
        async fn attaches_fresh_handles_and_breaks_latest() {
            let scenario = Scenario::parse(
                r#"
                {"op": "attach", "device": "a", "serial": "1"}
                {"op": "break", "device": "a"}
                {"op": "attach", "device": "a", "serial": "1"}
                "#,
            )
            .unwrap();
            let (tx, mut rx) = discovery_channel(8);

            assert_eq!(scenario.play(tx).await, 2);

            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            assert!(rx.recv().await.is_none());

            assert_eq!(first.identity, Some(PhysicalIdentity(1)));
            assert!(first.handle.channel_health().is_broken());
            assert!(!second.handle.channel_health().is_broken());
            assert_eq!(second.handle.label(), "a");
        }

        #[tokio::test]
        async fn channel_watch_ends_on_break() {
            let device = SimulatedDevice::new("w");
            let watch = watch_channel(device.clone());
            assert!(!watch.is_finished());

            device.disconnect();
            tokio::time::timeout(Duration::from_secs(5), watch)
                .await
                .unwrap()
                .unwrap();
        }

        #[tokio::test]
        async fn stops_when_receiver_is_gone() {
            let scenario = Scenario::parse(
                "{\"op\": \"attach\", \"device\": \"a\"}\n{\"op\": \"attach\", \"device\": \"b\"}",
            )
            .unwrap();
            let (tx, rx) = discovery_channel(8);
            drop(rx);
            assert_eq!(scenario.play(tx).await, 0);
        }
    }
}
