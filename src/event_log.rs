//! Platform event records
//!
//! Operational failures are turned into structured events with a
//! machine-readable id. The default sink writes them to the tracing
//! subscriber; tests use [`MemoryEventLog`] to inspect them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Informational,
    Warning,
    Error,
}

/// Structured platform event
#[derive(Debug, Clone, Serialize)]
pub struct PlatformEvent {
    pub id: String,
    pub description: String,
    pub severity: EventSeverity,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl PlatformEvent {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        severity: EventSeverity,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            severity,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Sink for platform events
pub trait EventLog: Send + Sync {
    fn create(&self, event: PlatformEvent);
}

/// Writes events to the tracing subscriber
#[derive(Debug, Default, Clone)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn create(&self, event: PlatformEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.severity {
            EventSeverity::Error => error!(
                event_id = %event.id,
                timestamp = %event.timestamp.to_rfc3339(),
                metadata = %metadata,
                "{}",
                event.description
            ),
            EventSeverity::Warning => warn!(
                event_id = %event.id,
                timestamp = %event.timestamp.to_rfc3339(),
                metadata = %metadata,
                "{}",
                event.description
            ),
            EventSeverity::Informational => info!(
                event_id = %event.id,
                timestamp = %event.timestamp.to_rfc3339(),
                metadata = %metadata,
                "{}",
                event.description
            ),
        }
    }
}

/// Keeps events in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryEventLog {
    events: Arc<Mutex<Vec<PlatformEvent>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.events.lock().clone()
    }
}

impl EventLog for MemoryEventLog {
    fn create(&self, event: PlatformEvent) {
        self.events.lock().push(event);
    }
}
