//! Inbound events
//!
//! Every producer (button readers, the HTTP API, startup presence) sends
//! these into one channel consumed by the panel loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

use crate::state::{NavEvent, StateSnapshot};

/// Length of a boot progress code
pub const BOOT_PROGRESS_LEN: usize = 8;

/// Error log severity, as reported by the logging service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Informational,
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Informational => "INFORMATIONAL",
            Severity::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

/// Error log entry that enabled the error detail functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorLogEntry {
    pub severity: Severity,
    pub id: u32,
    /// Reference code shown on the panel
    pub reference: String,
}

/// Event delivered to the panel loop
#[derive(Debug)]
pub enum InboundEvent {
    PresenceChanged { panel: String, present: bool },
    ErrorLogAdded(ErrorLogEntry),
    BootProgressChanged([u8; BOOT_PROGRESS_LEN]),
    /// Raw evdev key event
    ButtonPressed { code: u16, value: i32 },
    Navigate(NavEvent),
    Display { line1: Vec<u8>, line2: Vec<u8> },
    LampTest(bool),
    EnableFunctions(Vec<u8>),
    /// Manual operating mode entered or left
    OperatingModeChanged { manual: bool },
    QueryState(oneshot::Sender<StateSnapshot>),
}
