//! Background listener for a hardware touch panel exposed through evdev.
//!
//! Runs on its own detached thread, blocking on device reads, and pushes one
//! [`AdvanceToken`] per press-down into the shared queue. A missing device or
//! a host without evdev disables the feature without error.

use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::config::TouchConfig;
use crate::events::AdvanceToken;

#[derive(Debug)]
pub enum TouchCapability {
    Available(TouchDevice),
    Unavailable(String),
}

#[cfg(target_os = "linux")]
pub struct TouchDevice {
    device: evdev::Device,
    path: PathBuf,
}

#[cfg(target_os = "linux")]
impl std::fmt::Debug for TouchDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TouchDevice")
            .field("path", &self.path)
            .field("name", &self.device.name())
            .finish()
    }
}

#[cfg(not(target_os = "linux"))]
#[derive(Debug)]
pub enum TouchDevice {}

/// Probe for a touch-capable input device, and start the listener when one
/// is found. Returns whether a listener is running.
pub fn start(cfg: &TouchConfig, tx: Sender<AdvanceToken>) -> bool {
    match probe(cfg) {
        TouchCapability::Available(device) => match spawn_listener(device, tx) {
            Ok(_) => true,
            Err(err) => {
                warn!(%err, "failed to start touch listener thread");
                false
            }
        },
        TouchCapability::Unavailable(reason) => {
            info!(reason, "hardware touch listener disabled");
            false
        }
    }
}

#[cfg(target_os = "linux")]
pub fn probe(cfg: &TouchConfig) -> TouchCapability {
    use evdev::{Device, KeyCode};

    let supports_touch = |device: &Device| {
        device
            .supported_keys()
            .is_some_and(|keys| keys.contains(KeyCode::BTN_TOUCH))
    };

    if let Some(path) = &cfg.device {
        return match Device::open(path) {
            Ok(device) if supports_touch(&device) => {
                info!(device = %path.display(), name = device.name().unwrap_or(""), "touch listener bound");
                TouchCapability::Available(TouchDevice {
                    device,
                    path: path.clone(),
                })
            }
            Ok(_) => TouchCapability::Unavailable(format!(
                "{} does not advertise BTN_TOUCH",
                path.display()
            )),
            Err(err) => {
                TouchCapability::Unavailable(format!("failed to open {}: {err}", path.display()))
            }
        };
    }

    let mut candidates: Vec<(PathBuf, Device)> = evdev::enumerate()
        .filter(|(_, device)| supports_touch(device))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    match candidates.into_iter().next() {
        Some((path, device)) => {
            info!(device = %path.display(), name = device.name().unwrap_or(""), "touch listener bound");
            TouchCapability::Available(TouchDevice { device, path })
        }
        None => TouchCapability::Unavailable("no evdev device advertises BTN_TOUCH".to_string()),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn probe(_cfg: &TouchConfig) -> TouchCapability {
    TouchCapability::Unavailable("evdev is not supported on this platform".to_string())
}

#[cfg(target_os = "linux")]
pub fn spawn_listener(touch: TouchDevice, tx: Sender<AdvanceToken>) -> io::Result<JoinHandle<()>> {
    use evdev::EventSummary;

    let TouchDevice { mut device, path } = touch;
    thread::Builder::new()
        .name("evdev-touch".into())
        .spawn(move || {
            loop {
                let events = match device.fetch_events() {
                    Ok(events) => events,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        warn!(device = %path.display(), %err, "touch device read failed; listener stopped");
                        return;
                    }
                };
                for event in events {
                    if let EventSummary::Key(_, code, value) = event.destructure()
                        && is_touch_press(code, value)
                    {
                        debug!("evdev touch press detected");
                        if tx.send(AdvanceToken).is_err() {
                            debug!("touch token queue closed; listener stopped");
                            return;
                        }
                    }
                }
            }
        })
}

#[cfg(not(target_os = "linux"))]
pub fn spawn_listener(touch: TouchDevice, _tx: Sender<AdvanceToken>) -> io::Result<JoinHandle<()>> {
    match touch {}
}

/// Press-down transition of the touch contact; releases and repeats do not count.
#[cfg(target_os = "linux")]
fn is_touch_press(code: evdev::KeyCode, value: i32) -> bool {
    code == evdev::KeyCode::BTN_TOUCH && value == 1
}
