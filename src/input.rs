//! Panel button input
//!
//! Reads evdev `input_event` records from the panel's input device and
//! forwards key events to the panel loop. The read is re-armed after every
//! event or error; the reader only stops on EOF, open failure, or when the
//! loop has gone away.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::inbound::InboundEvent;
use crate::state::NavEvent;

/// evdev key event type
pub const EV_KEY: u16 = 0x01;

/// Button codes reported by the panel
pub const BTN_SOUTH: u16 = 0x130;
pub const BTN_NORTH: u16 = 0x133;
pub const BTN_SELECT: u16 = 0x13a;

/// Size of `struct input_event` on 64-bit targets
pub const INPUT_EVENT_LEN: usize = 24;

/// Decoded `input_event` (timestamp dropped)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn parse(buf: &[u8; INPUT_EVENT_LEN]) -> Self {
        Self {
            event_type: u16::from_ne_bytes([buf[16], buf[17]]),
            code: u16::from_ne_bytes([buf[18], buf[19]]),
            value: i32::from_ne_bytes([buf[20], buf[21], buf[22], buf[23]]),
        }
    }
}

/// Map a raw key event to a navigation event
///
/// Events with value 0 are dropped; unknown codes map to nothing.
pub fn map_button(code: u16, value: i32) -> Option<NavEvent> {
    if value == 0 {
        return None;
    }
    match code {
        BTN_NORTH => Some(NavEvent::Increment),
        BTN_SOUTH => Some(NavEvent::Decrement),
        BTN_SELECT => Some(NavEvent::Execute),
        _ => None,
    }
}

/// Spawn a reader task for one input device
pub fn spawn_button_reader(path: PathBuf, tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = read_buttons(&path, tx).await {
            error!(device = %path.display(), "Button reader stopped: {:#}", e);
        }
    })
}

async fn read_buttons(path: &Path, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open input device {}", path.display()))?;
    info!(device = %path.display(), "Listening for panel buttons");

    let mut buf = [0u8; INPUT_EVENT_LEN];
    loop {
        match file.read_exact(&mut buf).await {
            Ok(_) => {
                let event = RawInputEvent::parse(&buf);
                if event.event_type != EV_KEY {
                    continue;
                }
                debug!(code = event.code, value = event.value, "Button event");
                let inbound = InboundEvent::ButtonPressed {
                    code: event.code,
                    value: event.value,
                };
                if tx.send(inbound).await.is_err() {
                    debug!("Panel loop closed, stopping button reader");
                    return Ok(());
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!(device = %path.display(), "Input device closed");
                return Ok(());
            }
            Err(e) => {
                warn!(device = %path.display(), error = %e, "Input read failed, re-arming");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(event_type: u16, code: u16, value: i32) -> [u8; INPUT_EVENT_LEN] {
        let mut buf = [0u8; INPUT_EVENT_LEN];
        buf[16..18].copy_from_slice(&event_type.to_ne_bytes());
        buf[18..20].copy_from_slice(&code.to_ne_bytes());
        buf[20..24].copy_from_slice(&value.to_ne_bytes());
        buf
    }

    #[test]
    fn test_parse_input_event() {
        let event = RawInputEvent::parse(&raw(EV_KEY, BTN_SELECT, 1));
        assert_eq!(
            event,
            RawInputEvent { event_type: EV_KEY, code: BTN_SELECT, value: 1 }
        );
    }

    #[test]
    fn test_button_mapping() {
        assert_eq!(map_button(BTN_NORTH, 1), Some(NavEvent::Increment));
        assert_eq!(map_button(BTN_SOUTH, 1), Some(NavEvent::Decrement));
        assert_eq!(map_button(BTN_SELECT, 2), Some(NavEvent::Execute));
        assert_eq!(map_button(BTN_SELECT, 0), None);
        assert_eq!(map_button(0x101, 1), None);
    }

    #[tokio::test]
    async fn test_reader_forwards_key_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event0");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&raw(0x00, 0, 0)); // EV_SYN
        bytes.extend_from_slice(&raw(EV_KEY, BTN_NORTH, 1));
        bytes.extend_from_slice(&raw(EV_KEY, BTN_NORTH, 0));
        std::fs::write(&path, bytes).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        spawn_button_reader(path, tx).await.unwrap();

        let mut codes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let InboundEvent::ButtonPressed { code, value } = event {
                codes.push((code, value));
            }
        }
        assert_eq!(codes, vec![(BTN_NORTH, 1), (BTN_NORTH, 0)]);
    }

    #[tokio::test]
    async fn test_reader_stops_on_missing_device() {
        let (tx, _rx) = mpsc::channel(1);
        spawn_button_reader(PathBuf::from("/nonexistent/event9"), tx)
            .await
            .unwrap();
    }
}
