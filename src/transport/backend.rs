//! Panel bus backends
//!
//! The set of backends is closed: a Linux I2C character device, or an
//! in-memory bus used on bench setups and in tests.

use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::{BackendKind, PanelConfig};
use crate::error::PanelError;

/// Errors reported by a single bus write
#[derive(Error, Debug)]
pub enum BusError {
    #[error("i2c write failed: {0}")]
    I2c(String),

    #[error("simulated bus fault")]
    Injected,
}

/// Exclusive handle on the panel bus
pub enum Backend {
    I2c(I2cdev),
    Simulated(SimulatedBus),
}

impl Backend {
    /// Open the backend selected by the panel configuration
    ///
    /// `force_simulated` overrides the configured backend (`--simulate`).
    pub fn open(config: &PanelConfig, force_simulated: bool) -> Result<Self, PanelError> {
        if config.address > 0x7F {
            return Err(PanelError::InvalidAddress {
                address: config.address,
            });
        }

        let kind = if force_simulated {
            BackendKind::Simulated
        } else {
            config.backend
        };

        match kind {
            BackendKind::I2c => {
                let mut dev = I2cdev::new(&config.device).map_err(|e| PanelError::DeviceOpen {
                    path: config.device.clone(),
                    reason: e.to_string(),
                })?;
                // Bind now so a busy or absent peripheral fails startup
                // instead of the first write.
                dev.set_slave_address(config.address)
                    .map_err(|e| PanelError::AddressBind {
                        path: config.device.clone(),
                        address: config.address,
                        reason: e.to_string(),
                    })?;
                debug!(
                    panel = %config.name,
                    device = %config.device.display(),
                    address = %format!("{:#04x}", config.address),
                    "Opened I2C device"
                );
                Ok(Backend::I2c(dev))
            }
            BackendKind::Simulated => {
                debug!(panel = %config.name, "Using simulated panel bus");
                Ok(Backend::Simulated(SimulatedBus::new()))
            }
        }
    }

    /// Write one frame, returning the number of bytes the bus accepted
    pub fn write(&mut self, address: u8, frame: &[u8]) -> Result<usize, BusError> {
        match self {
            Backend::I2c(dev) => dev
                .write(address, frame)
                .map(|()| frame.len())
                .map_err(|e| BusError::I2c(format!("{:?}", e))),
            Backend::Simulated(bus) => bus.write(frame),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::I2c(_) => BackendKind::I2c,
            Backend::Simulated(_) => BackendKind::Simulated,
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    frames: Vec<Vec<u8>>,
    attempts: usize,
    fail_remaining: usize,
    short_remaining: usize,
}

/// In-memory bus that records accepted frames
///
/// Clones share the same state, so a caller can keep a clone to inspect
/// traffic after handing the bus to a transport.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail
    pub fn fail_always(&self) {
        self.state.lock().fail_remaining = usize::MAX;
    }

    /// Make the next `count` writes fail
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_remaining = count;
    }

    /// Make the next `count` writes accept only part of the frame
    pub fn short_write_next(&self, count: usize) {
        self.state.lock().short_remaining = count;
    }

    /// Frames fully accepted so far
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().frames.clone()
    }

    /// Write attempts seen so far, successful or not
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    fn write(&self, frame: &[u8]) -> Result<usize, BusError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if state.fail_remaining > 0 {
            if state.fail_remaining != usize::MAX {
                state.fail_remaining -= 1;
            }
            return Err(BusError::Injected);
        }

        if state.short_remaining > 0 {
            state.short_remaining -= 1;
            return Ok(frame.len() / 2);
        }

        state.frames.push(frame.to_vec());
        Ok(frame.len())
    }
}
