//! Panel orchestration
//!
//! The [`Panel`] owns the navigation state machine, one transport per
//! configured panel and the optional host forwarder. It is driven by a single
//! consumer loop, one [`InboundEvent`] at a time:
//! - Presence changes gate the transports and bring LCD panels up
//! - Buttons and API navigation move through the function catalog
//! - Executed functions are run locally or forwarded to the host


use tracing::{debug, info, warn};

use crate::config::{PanelVariant, SystemConfig};
use crate::host::HostForwarder;
use crate::inbound::{ErrorLogEntry, InboundEvent, Severity, BOOT_PROGRESS_LEN};
use crate::input::map_button;
use crate::protocol::PanelCommand;
use crate::state::{
    NavEvent, StateMachine, StateSnapshot, SubState, Transition, ERROR_DETAIL_FUNCTIONS,
    MANUAL_MODE,
};
use crate::transport::Transport;

/// Functions whose execution is forwarded to the host
pub const HOST_FUNCTIONS: [u8; 13] = [3, 8, 21, 22, 25, 26, 34, 41, 42, 43, 55, 63, 64];

/// Boot progress code that clears the display
pub const BOOT_PROGRESS_CLEAR: [u8; BOOT_PROGRESS_LEN] = [b'0'; BOOT_PROGRESS_LEN];

const CONFIRM_PROMPT: &str = "EXECUTE AGAIN TO CONFIRM";
const ACKNOWLEDGE: &str = "00";
const NOT_AVAILABLE: &str = "NOT AVAILABLE";
const FORWARD_FAILED: &str = "FAILED";

/// Root object of the service
pub struct Panel {
    machine: StateMachine,
    transports: Vec<Transport>,
    forwarder: Option<HostForwarder>,
    system: SystemConfig,
    /// Most recent non-informational error log
    last_error: Option<ErrorLogEntry>,
    /// Debounced function waiting for its confirming Execute
    armed: Option<u8>,
}

impl Panel {
    pub fn new(
        machine: StateMachine,
        transports: Vec<Transport>,
        forwarder: Option<HostForwarder>,
        system: SystemConfig,
    ) -> Self {
        Self {
            machine,
            transports,
            forwarder,
            system,
            last_error: None,
            armed: None,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.machine.snapshot()
    }

    pub fn transports(&self) -> &[Transport] {
        &self.transports
    }

    pub fn last_error(&self) -> Option<&ErrorLogEntry> {
        self.last_error.as_ref()
    }

    /// Process one inbound event
    pub async fn handle(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::PresenceChanged { panel, present } => {
                self.set_presence(&panel, present).await
            }
            InboundEvent::ErrorLogAdded(entry) => self.error_logged(entry),
            InboundEvent::BootProgressChanged(code) => self.boot_progress(&code),
            InboundEvent::ButtonPressed { code, value } => match map_button(code, value) {
                Some(nav) => self.navigate(nav).await,
                None => debug!(code = %format!("{:#x}", code), value, "Ignoring button event"),
            },
            InboundEvent::Navigate(nav) => self.navigate(nav).await,
            InboundEvent::Display { line1, line2 } => self.display(&line1, &line2),
            InboundEvent::LampTest(true) => self.lamp_test(),
            InboundEvent::LampTest(false) => self.render(),
            InboundEvent::EnableFunctions(ids) => self.machine.enable(&ids),
            InboundEvent::OperatingModeChanged { manual } => self.operating_mode(manual),
            InboundEvent::QueryState(reply) => {
                if reply.send(self.machine.snapshot()).is_err() {
                    debug!("State query caller went away");
                }
            }
        }
    }

    async fn set_presence(&mut self, name: &str, present: bool) {
        let Some(transport) = self.transports.iter_mut().find(|t| t.name() == name) else {
            warn!(panel = %name, "Presence change for unknown panel");
            return;
        };

        let was_ready = transport.is_ready();
        transport.set_ready(present).await;

        if present && !was_ready && transport.variant() == PanelVariant::Lcd {
            self.render();
        }
    }

    fn error_logged(&mut self, entry: ErrorLogEntry) {
        if entry.severity == Severity::Informational {
            debug!(id = entry.id, "Informational error log, panel unchanged");
            return;
        }

        info!(
            id = entry.id,
            severity = %entry.severity,
            reference = %entry.reference,
            "Error logged, enabling error detail functions"
        );
        self.machine.enable(&ERROR_DETAIL_FUNCTIONS);
        self.last_error = Some(entry);
    }

    fn operating_mode(&mut self, manual: bool) {
        let before = self.machine.current_state();
        self.machine.set_gate(MANUAL_MODE, manual);

        if !manual {
            if let Some(function) = self.armed.take() {
                debug!(function, "Manual mode left, confirmation cancelled");
            }
        }
        if self.machine.current_state() != before {
            self.render();
        }
    }

    fn boot_progress(&mut self, code: &[u8; BOOT_PROGRESS_LEN]) {
        if *code == BOOT_PROGRESS_CLEAR {
            self.display(b"", b"");
        } else {
            self.display(code, b"");
        }
    }

    async fn navigate(&mut self, event: NavEvent) {
        match self.machine.on_event(event) {
            Transition::Moved => {
                if let Some(function) = self.armed.take() {
                    debug!(function, "Navigation cancelled pending confirmation");
                }
                self.render();
            }
            Transition::Invoke {
                function,
                sub_function,
            } => self.invoke(function, sub_function).await,
        }
    }

    async fn invoke(&mut self, function: u8, sub_function: Option<u8>) {
        let requires_debounce = self
            .machine
            .catalog()
            .find(function)
            .is_some_and(|f| f.requires_debounce);

        if requires_debounce && self.armed != Some(function) {
            self.armed = Some(function);
            info!(function, "Awaiting confirmation");
            self.show(&format!("{:02}", function), CONFIRM_PROMPT);
            return;
        }
        self.armed = None;

        info!(function, ?sub_function, "Executing panel function");
        let title = match sub_function {
            Some(n) => format!("{:02}{:02}", function, n),
            None => format!("{:02}", function),
        };

        match function {
            1 | 2 => self.show(&title, ACKNOWLEDGE),
            4 => self.lamp_test(),
            11 => {
                let text = self.last_error.as_ref().map(|e| e.reference.clone());
                self.show(&title, text.as_deref().unwrap_or(NOT_AVAILABLE));
            }
            12 => {
                let text = self.last_error.as_ref().map(|e| format!("{:08X}", e.id));
                self.show(&title, text.as_deref().unwrap_or(NOT_AVAILABLE));
            }
            13 => {
                let text = self.last_error.as_ref().map(|e| e.severity.to_string());
                self.show(&title, text.as_deref().unwrap_or(NOT_AVAILABLE));
            }
            20 => {
                let text = format!(
                    "{} {}",
                    self.system.machine_type_model.as_deref().unwrap_or("UNKNOWN"),
                    self.system.serial_number.as_deref().unwrap_or("UNKNOWN"),
                );
                self.show(&title, &text);
            }
            30 => {
                let interface = sub_function
                    .and_then(|n| self.system.interfaces.get(usize::from(n)))
                    .cloned();
                self.show(&title, interface.as_deref().unwrap_or(NOT_AVAILABLE));
            }
            id if HOST_FUNCTIONS.contains(&id) => match &self.forwarder {
                Some(forwarder) => {
                    let status = if forwarder.send_panel_function_to_host(id).await {
                        ACKNOWLEDGE
                    } else {
                        FORWARD_FAILED
                    };
                    self.show(&title, status);
                }
                None => warn!(function = id, "Host forwarding disabled, function ignored"),
            },
            id => debug!(function = id, "No action bound to panel function"),
        }
    }

    /// Draw the navigation position on every LCD panel
    fn render(&mut self) {
        let (function, sub_state) = self.machine.current_state();
        let mut line1 = format!("{:02}", function);
        if self.machine.sub_range_active() {
            match sub_state {
                SubState::Item(n) => line1.push_str(&format!("{:02}", n)),
                SubState::Exit => line1.push_str("**"),
            }
        }
        self.display(line1.as_bytes(), b"");
    }

    fn show(&mut self, line1: &str, line2: &str) {
        self.display(line1.as_bytes(), line2.as_bytes());
    }

    fn display(&mut self, line1: &[u8], line2: &[u8]) {
        let command = PanelCommand::Display {
            line1: line1.to_vec(),
            line2: line2.to_vec(),
        };
        for transport in self
            .transports
            .iter_mut()
            .filter(|t| t.variant() == PanelVariant::Lcd)
        {
            transport.send(&command);
        }
    }

    fn lamp_test(&mut self) {
        for transport in &mut self.transports {
            transport.send(&PanelCommand::LampTest);
        }
    }
}
