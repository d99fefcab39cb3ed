//! Operator panel service
//!
//! Drives the operator panel of a server: navigation through the panel
//! function catalog, checksummed frames to the panel microcontroller over
//! I2C, and forwarding of selected functions to the host as PLDM state
//! effecter requests.

pub mod api;
pub mod config;
pub mod error;
pub mod event_log;
pub mod host;
pub mod inbound;
pub mod input;
pub mod panel;
pub mod protocol;
pub mod state;
pub mod transport;

pub use error::{HostError, PanelError};
pub use inbound::InboundEvent;
pub use panel::Panel;
