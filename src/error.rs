//! Error types for the panel service
//!
//! `PanelError` covers startup failures that leave the service without a
//! usable panel. `HostError` covers the operational failures of forwarding a
//! function to the host; those are logged as platform events and never
//! propagated past the forwarder.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration or device errors raised while building the panel
#[derive(Error, Debug)]
pub enum PanelError {
    /// The function table has no enabled entry, so there is no default state
    #[error("no panel function is enabled")]
    NoEnabledFunction,

    /// The function table declares the same id twice
    #[error("duplicate panel function id {0}")]
    DuplicateFunction(u8),

    /// The bus device could not be opened
    #[error("failed to open panel bus device {path}: {reason}")]
    DeviceOpen { path: PathBuf, reason: String },

    /// The device opened but the peripheral address could not be bound
    #[error("failed to bind address {address:#04x} on {path}: {reason}")]
    AddressBind {
        path: PathBuf,
        address: u16,
        reason: String,
    },

    /// The peripheral address does not fit a 7-bit bus address
    #[error("invalid panel bus address {address:#04x} (must be 7-bit)")]
    InvalidAddress { address: u16 },
}

/// Operational errors on the host forwarding path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// No descriptor record, or no entry carrying the requested state set
    #[error("no effecter with state set {state_set_id:#06x} found in {records} descriptor record(s)")]
    NotFound { state_set_id: u16, records: usize },

    /// A descriptor record is shorter than its own fields claim
    #[error("malformed state effecter PDR: {0}")]
    MalformedPdr(String),

    /// Every correlation id is currently in flight
    #[error("no PLDM instance id available")]
    InstanceIdExhausted,

    /// The request could not be serialized
    #[error("failed to encode set state request: {0}")]
    Encode(String),

    /// The descriptor lookup itself failed
    #[error("descriptor lookup failed: {0}")]
    Lookup(String),

    /// The host transport refused or failed the send
    #[error("host transport error: {0}")]
    Transport(String),
}

impl HostError {
    /// Machine-readable identifier used when the error is logged as a platform event
    pub fn event_id(&self) -> &'static str {
        match self {
            HostError::NotFound { .. } => "Panel.Error.EffecterNotFound",
            HostError::MalformedPdr(_) => "Panel.Error.MalformedPdr",
            HostError::InstanceIdExhausted => "Panel.Error.InstanceIdUnavailable",
            HostError::Encode(_) => "Panel.Error.EncodeFailure",
            HostError::Lookup(_) => "Panel.Error.PdrLookupFailure",
            HostError::Transport(_) => "Panel.Error.HostCommunicationError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_distinct() {
        let errors = [
            HostError::NotFound { state_set_id: 1, records: 0 },
            HostError::MalformedPdr("short".into()),
            HostError::InstanceIdExhausted,
            HostError::Encode("count".into()),
            HostError::Lookup("gone".into()),
            HostError::Transport("refused".into()),
        ];

        let mut ids: Vec<_> = errors.iter().map(HostError::event_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), errors.len());
    }

    #[test]
    fn test_not_found_message() {
        let err = HostError::NotFound { state_set_id: 0x800A, records: 2 };
        assert_eq!(
            err.to_string(),
            "no effecter with state set 0x800a found in 2 descriptor record(s)"
        );
    }
}
