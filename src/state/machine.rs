//! Panel navigation state machine
//!
//! Tracks the active function and, for functions with a sub-range, the active
//! sub-function. Sub-range positions are ordered `0..=upper` followed by
//! [`SubState::Exit`], and navigation wraps around that order.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::FunctionCatalog;
use crate::error::PanelError;

/// Navigation events produced by the panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NavEvent {
    Increment,
    Decrement,
    Execute,
}

/// Position inside a function's sub-range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubState {
    Item(u8),
    /// Entry/exit cursor that sits after the upper bound
    Exit,
}

impl SubState {
    fn next(self, upper: u8) -> Self {
        match self {
            SubState::Item(n) if n < upper => SubState::Item(n + 1),
            SubState::Item(_) => SubState::Exit,
            SubState::Exit => SubState::Item(0),
        }
    }

    fn prev(self, upper: u8) -> Self {
        match self {
            SubState::Item(0) => SubState::Exit,
            SubState::Item(n) => SubState::Item(n - 1),
            SubState::Exit => SubState::Item(upper),
        }
    }
}

/// Result of feeding one event into the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The navigation position changed
    Moved,
    /// Execute on a leaf: the caller runs the function
    Invoke { function: u8, sub_function: Option<u8> },
}

/// Current navigation position, as reported to the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub function: u8,
    pub sub_state: SubState,
    pub sub_range_active: bool,
    pub enabled: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NavigationState {
    index: usize,
    sub_state: SubState,
    sub_range_active: bool,
}

/// Table-driven navigation over the function catalog
pub struct StateMachine {
    catalog: FunctionCatalog,
    nav: NavigationState,
}

impl StateMachine {
    /// Create a machine positioned on the first enabled function
    pub fn new(catalog: FunctionCatalog) -> Result<Self, PanelError> {
        let mut machine = Self {
            catalog,
            nav: NavigationState {
                index: 0,
                sub_state: SubState::Item(0),
                sub_range_active: false,
            },
        };
        machine.reset()?;
        Ok(machine)
    }

    /// Return to the first enabled function with the sub-range closed
    pub fn reset(&mut self) -> Result<(), PanelError> {
        let index = self
            .catalog
            .iter()
            .position(|f| f.enabled)
            .ok_or(PanelError::NoEnabledFunction)?;

        self.nav = NavigationState {
            index,
            sub_state: SubState::Item(0),
            sub_range_active: false,
        };
        Ok(())
    }

    /// Enable the given functions; unknown ids are ignored
    pub fn enable(&mut self, ids: &[u8]) {
        for &id in ids {
            match self.catalog.position(id) {
                Some(index) => {
                    self.catalog.set_enabled(index, true);
                    debug!(function = id, "Panel function enabled");
                }
                None => warn!(function = id, "Ignoring enable for unknown panel function"),
            }
        }
    }

    /// Enable or disable every function gated by `source`
    ///
    /// If the active function ends up disabled the machine returns to the
    /// first enabled function.
    pub fn set_gate(&mut self, source: &str, enabled: bool) {
        let gated: Vec<usize> = self
            .catalog
            .iter()
            .enumerate()
            .filter(|(_, f)| f.debounce_source.as_deref() == Some(source))
            .map(|(index, _)| index)
            .collect();
        for &index in &gated {
            self.catalog.set_enabled(index, enabled);
        }
        info!(source, enabled, functions = gated.len(), "Panel function gate changed");

        let current_enabled = self.catalog.get(self.nav.index).is_some_and(|f| f.enabled);
        if !current_enabled {
            if let Err(e) = self.reset() {
                warn!(error = %e, "No panel function left after gate change");
            }
        }
    }

    /// Active function id and sub-state
    pub fn current_state(&self) -> (u8, SubState) {
        (self.current_id(), self.nav.sub_state)
    }

    pub fn sub_range_active(&self) -> bool {
        self.nav.sub_range_active
    }

    pub fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            function: self.current_id(),
            sub_state: self.nav.sub_state,
            sub_range_active: self.nav.sub_range_active,
            enabled: self.catalog.enabled_ids(),
        }
    }

    /// Apply a navigation event
    pub fn on_event(&mut self, event: NavEvent) -> Transition {
        let upper = self.current_upper();

        let transition = match (event, upper, self.nav.sub_range_active) {
            (NavEvent::Increment, Some(upper), true) => {
                self.nav.sub_state = self.nav.sub_state.next(upper);
                Transition::Moved
            }
            (NavEvent::Decrement, Some(upper), true) => {
                self.nav.sub_state = self.nav.sub_state.prev(upper);
                Transition::Moved
            }
            (NavEvent::Increment, _, _) => {
                self.step_function(true);
                Transition::Moved
            }
            (NavEvent::Decrement, _, _) => {
                self.step_function(false);
                Transition::Moved
            }
            (NavEvent::Execute, None, _) => Transition::Invoke {
                function: self.current_id(),
                sub_function: None,
            },
            (NavEvent::Execute, Some(_), false) => {
                self.nav.sub_range_active = true;
                self.nav.sub_state = SubState::Exit;
                Transition::Moved
            }
            (NavEvent::Execute, Some(_), true) => match self.nav.sub_state {
                SubState::Exit => {
                    self.nav.sub_range_active = false;
                    self.nav.sub_state = SubState::Item(0);
                    Transition::Moved
                }
                SubState::Item(n) => Transition::Invoke {
                    function: self.current_id(),
                    sub_function: Some(n),
                },
            },
        };

        debug!(
            ?event,
            function = self.current_id(),
            sub_state = ?self.nav.sub_state,
            sub_range_active = self.nav.sub_range_active,
            "Navigation event applied"
        );
        transition
    }

    fn current_id(&self) -> u8 {
        self.catalog.get(self.nav.index).map(|f| f.id).unwrap_or_default()
    }

    fn current_upper(&self) -> Option<u8> {
        self.catalog.get(self.nav.index).and_then(|f| f.sub_range)
    }

    /// Move to the next/previous enabled function, wrapping at either end
    fn step_function(&mut self, forward: bool) {
        let len = self.catalog.len();
        if len == 0 {
            return;
        }

        let found = (1..=len)
            .map(|step| {
                if forward {
                    (self.nav.index + step) % len
                } else {
                    (self.nav.index + len - step) % len
                }
            })
            .find(|&i| self.catalog.get(i).is_some_and(|f| f.enabled));

        if let Some(index) = found {
            if index != self.nav.index {
                info!(
                    from = self.current_id(),
                    to = self.catalog.get(index).map(|f| f.id).unwrap_or_default(),
                    "Panel function changed"
                );
            }
            self.nav = NavigationState {
                index,
                sub_state: SubState::Item(0),
                sub_range_active: false,
            };
        }
    }
}
