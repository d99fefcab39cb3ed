//! Panel bus transport
//!
//! Owns the bus handle for one panel. Writes are gated on the panel being
//! present and retried a bounded number of times; failures are logged and
//! dropped, never returned to the caller.

pub mod backend;

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{PanelConfig, PanelVariant};
use crate::error::PanelError;
use crate::protocol::{self, Button, ButtonOperation, PanelCommand};

pub use backend::{Backend, BusError, SimulatedBus};

/// Attempts per frame before it is dropped
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// Time the microcontroller needs after a soft reset
pub const SETTLE_DELAY: Duration = Duration::from_millis(3000);

/// What happened to a frame handed to [`Transport::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent { attempts: usize },
    /// Panel not ready or empty frame
    Skipped,
    Failed,
}

/// Gated, retrying writer for one panel
pub struct Transport {
    name: String,
    address: u8,
    variant: PanelVariant,
    backend: Backend,
    ready: bool,
}

impl Transport {
    /// Open the bus for a configured panel
    pub fn open(config: &PanelConfig, force_simulated: bool) -> Result<Self, PanelError> {
        let backend = Backend::open(config, force_simulated)?;
        let address = u8::try_from(config.address).map_err(|_| PanelError::InvalidAddress {
            address: config.address,
        })?;

        info!(
            panel = %config.name,
            device = %config.device.display(),
            address = %format!("{:#04x}", address),
            variant = ?config.variant,
            backend = ?backend.kind(),
            "Panel transport opened"
        );

        Ok(Self::with_backend(&config.name, address, config.variant, backend))
    }

    pub fn with_backend(name: &str, address: u8, variant: PanelVariant, backend: Backend) -> Self {
        Self {
            name: name.to_string(),
            address,
            variant,
            backend,
            ready: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> PanelVariant {
        self.variant
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Encode and write a command
    pub fn send(&mut self, command: &PanelCommand) -> WriteOutcome {
        debug!(panel = %self.name, "Sending {}", command);
        self.write(&command.encode())
    }

    /// Write a frame with bounded retries
    pub fn write(&mut self, frame: &[u8]) -> WriteOutcome {
        if !self.ready {
            debug!(panel = %self.name, "Panel not ready, dropping frame");
            return WriteOutcome::Skipped;
        }
        if frame.is_empty() {
            debug!(panel = %self.name, "Empty frame, nothing to write");
            return WriteOutcome::Skipped;
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.backend.write(self.address, frame) {
                Ok(written) if written == frame.len() => {
                    debug!(
                        panel = %self.name,
                        attempt,
                        frame = %hex::encode(frame),
                        "Frame written"
                    );
                    return WriteOutcome::Sent { attempts: attempt };
                }
                Ok(written) => {
                    warn!(
                        panel = %self.name,
                        address = %format!("{:#04x}", self.address),
                        attempt,
                        written,
                        expected = frame.len(),
                        "Short write to panel"
                    );
                }
                Err(e) => {
                    warn!(
                        panel = %self.name,
                        address = %format!("{:#04x}", self.address),
                        attempt,
                        expected = frame.len(),
                        error = %e,
                        "Panel write failed"
                    );
                }
            }
        }

        error!(
            panel = %self.name,
            attempts = MAX_WRITE_ATTEMPTS,
            command = %hex::encode(&frame[..frame.len().min(2)]),
            "Giving up on panel frame"
        );
        WriteOutcome::Failed
    }

    /// Update the presence flag, bringing an LCD panel up when it appears
    pub async fn set_ready(&mut self, ready: bool) {
        let was_ready = self.ready;
        self.ready = ready;

        if was_ready == ready {
            return;
        }
        info!(panel = %self.name, ready, "Panel readiness changed");

        if ready && self.variant == PanelVariant::Lcd {
            self.bring_up().await;
        }
    }

    /// Soft reset, wait for the microcontroller, then configure the buttons
    async fn bring_up(&mut self) {
        info!(panel = %self.name, "Bringing up panel microcontroller");
        self.write(&protocol::soft_reset());

        tokio::time::sleep(SETTLE_DELAY).await;

        for button in Button::ALL {
            self.write(&protocol::button_control(button, ButtonOperation::SingleExecution));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated(variant: PanelVariant) -> (Transport, SimulatedBus) {
        let bus = SimulatedBus::new();
        let transport =
            Transport::with_backend("lcd", 0x5A, variant, Backend::Simulated(bus.clone()));
        (transport, bus)
    }

    #[test]
    fn test_write_skipped_when_not_ready() {
        let (mut transport, bus) = simulated(PanelVariant::Base);
        assert_eq!(transport.write(&protocol::lamp_test()), WriteOutcome::Skipped);
        assert_eq!(bus.attempts(), 0);
    }

    #[tokio::test]
    async fn test_write_skips_empty_frame() {
        let (mut transport, bus) = simulated(PanelVariant::Base);
        transport.set_ready(true).await;
        assert_eq!(transport.write(&[]), WriteOutcome::Skipped);
        assert_eq!(bus.attempts(), 0);
    }

    #[tokio::test]
    async fn test_always_failing_bus_tries_five_times() {
        let (mut transport, bus) = simulated(PanelVariant::Base);
        transport.set_ready(true).await;
        bus.fail_always();

        assert_eq!(transport.write(&protocol::lamp_test()), WriteOutcome::Failed);
        assert_eq!(bus.attempts(), MAX_WRITE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_short_write_is_retried() {
        let (mut transport, bus) = simulated(PanelVariant::Base);
        transport.set_ready(true).await;
        bus.short_write_next(2);

        let frame = protocol::lamp_test();
        assert_eq!(transport.write(&frame), WriteOutcome::Sent { attempts: 3 });
        assert_eq!(bus.frames(), vec![frame]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lcd_bring_up_sequence() {
        let (mut transport, bus) = simulated(PanelVariant::Lcd);

        let started = tokio::time::Instant::now();
        transport.set_ready(true).await;
        assert!(started.elapsed() >= SETTLE_DELAY);

        let expected = vec![
            protocol::soft_reset(),
            protocol::button_control(Button::Increment, ButtonOperation::SingleExecution),
            protocol::button_control(Button::Decrement, ButtonOperation::SingleExecution),
            protocol::button_control(Button::Execute, ButtonOperation::SingleExecution),
        ];
        assert_eq!(bus.frames(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bring_up_only_on_rising_edge() {
        let (mut transport, bus) = simulated(PanelVariant::Lcd);
        transport.set_ready(true).await;
        transport.set_ready(true).await;
        assert_eq!(bus.frames().len(), 4);

        transport.set_ready(false).await;
        assert!(!transport.is_ready());
        assert_eq!(bus.frames().len(), 4);

        transport.set_ready(true).await;
        assert_eq!(bus.frames().len(), 8);
    }

    #[tokio::test]
    async fn test_base_panel_has_no_bring_up() {
        let (mut transport, bus) = simulated(PanelVariant::Base);
        transport.set_ready(true).await;
        assert!(transport.is_ready());
        assert!(bus.frames().is_empty());
    }
}
