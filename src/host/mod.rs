//! Host function forwarding
//!
//! Forwards the operator's selected panel function to the host by setting a
//! state effecter: the effecter slot is found in the host's state effecter
//! PDRs, and a SetStateEffecterStates request carrying the function number
//! is sent over MCTP. Forwarding is best effort; every failure becomes a
//! platform event and the caller carries on.

pub mod instance_id;
pub mod pdr;
pub mod pldm;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixDatagram;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::HostError;
use crate::event_log::{EventLog, EventSeverity, PlatformEvent};

pub use instance_id::{InstanceId, InstanceIdPool};
pub use pdr::{locate_slot, EffecterDescriptor, StateEffecterPdr};
pub use pldm::{build_set_request, encode_set_request, fields_for};

/// MCTP message type for PLDM
pub const MCTP_MSG_TYPE_PLDM: u8 = 0x01;

/// Source of the host's state effecter PDRs
#[async_trait]
pub trait PdrRepository: Send + Sync {
    async fn find_state_effecter_pdrs(
        &self,
        entity_type: u16,
        state_set_id: u16,
    ) -> Result<Vec<Vec<u8>>, HostError>;
}

/// Sends an encoded PLDM message to an MCTP endpoint
#[async_trait]
pub trait HostTransport: Send + Sync {
    async fn send(&self, eid: u8, message: &[u8]) -> Result<(), HostError>;
}

/// PDRs supplied up front (from the configuration file)
#[derive(Debug, Clone, Default)]
pub struct StaticPdrRepository {
    records: Vec<Vec<u8>>,
}

impl StaticPdrRepository {
    pub fn new(records: Vec<Vec<u8>>) -> Self {
        Self { records }
    }

    /// Decode hex-encoded records
    pub fn from_hex(records: &[String]) -> Result<Self, HostError> {
        let records = records
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                hex::decode(text.trim())
                    .map_err(|e| HostError::Lookup(format!("PDR {} is not valid hex: {}", idx, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }
}

#[async_trait]
impl PdrRepository for StaticPdrRepository {
    async fn find_state_effecter_pdrs(
        &self,
        entity_type: u16,
        _state_set_id: u16,
    ) -> Result<Vec<Vec<u8>>, HostError> {
        Ok(self
            .records
            .iter()
            .filter(|raw| match StateEffecterPdr::parse(raw) {
                Ok(pdr) => pdr.entity_type == entity_type,
                Err(e) => {
                    debug!(error = %e, "Dropping undecodable PDR from lookup");
                    false
                }
            })
            .cloned()
            .collect())
    }
}

/// Datagram transport to the MCTP demultiplexer: `[eid][type][message]`
#[derive(Debug, Clone)]
pub struct MctpSocketTransport {
    socket: PathBuf,
}

impl MctpSocketTransport {
    pub fn new(socket: PathBuf) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl HostTransport for MctpSocketTransport {
    async fn send(&self, eid: u8, message: &[u8]) -> Result<(), HostError> {
        let sock = UnixDatagram::unbound()
            .map_err(|e| HostError::Transport(format!("socket: {}", e)))?;

        let mut frame = Vec::with_capacity(message.len() + 2);
        frame.push(eid);
        frame.push(MCTP_MSG_TYPE_PLDM);
        frame.extend_from_slice(message);

        let sent = sock.send_to(&frame, &self.socket).await.map_err(|e| {
            HostError::Transport(format!("send to {}: {}", self.socket.display(), e))
        })?;
        if sent != frame.len() {
            return Err(HostError::Transport(format!(
                "short send: {} of {} bytes",
                sent,
                frame.len()
            )));
        }

        debug!(eid, frame = %hex::encode(&frame), "PLDM message sent");
        Ok(())
    }
}

/// Forwards selected panel functions to the host
pub struct HostForwarder {
    pdrs: Arc<dyn PdrRepository>,
    transport: Arc<dyn HostTransport>,
    events: Arc<dyn EventLog>,
    instance_ids: InstanceIdPool,
    eid: u8,
    entity_type: u16,
    state_set_id: u16,
}

impl HostForwarder {
    pub fn new(
        config: &HostConfig,
        pdrs: Arc<dyn PdrRepository>,
        transport: Arc<dyn HostTransport>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            pdrs,
            transport,
            events,
            instance_ids: InstanceIdPool::new(),
            eid: config.eid,
            entity_type: config.entity_type,
            state_set_id: config.state_set_id,
        }
    }

    /// Forwarder backed by the configured PDRs and MCTP socket
    pub fn from_config(config: &HostConfig, events: Arc<dyn EventLog>) -> Result<Self, HostError> {
        let pdrs = StaticPdrRepository::from_hex(&config.effecter_pdrs)?;
        let transport = MctpSocketTransport::new(config.socket.clone());
        Ok(Self::new(config, Arc::new(pdrs), Arc::new(transport), events))
    }

    pub fn instance_ids(&self) -> &InstanceIdPool {
        &self.instance_ids
    }

    /// Forward a function; failures are logged as platform events
    ///
    /// Returns whether the request reached the host transport.
    pub async fn send_panel_function_to_host(&self, function_id: u8) -> bool {
        match self.try_send(function_id).await {
            Ok(descriptor) => {
                info!(
                    function = function_id,
                    effecter_id = descriptor.effecter_id,
                    slot = descriptor.slot_index,
                    eid = self.eid,
                    "Panel function forwarded to host"
                );
                true
            }
            Err(e) => {
                warn!(
                    function = function_id,
                    error = %e,
                    "Failed to forward panel function to host"
                );
                let event = PlatformEvent::new(
                    e.event_id(),
                    format!("Failed to forward panel function {:02} to host: {}", function_id, e),
                    EventSeverity::Error,
                )
                .with("FUNCTION", function_id)
                .with("EID", self.eid)
                .with("STATE_SET_ID", format!("{:#06x}", self.state_set_id));
                self.events.create(event);
                false
            }
        }
    }

    async fn try_send(&self, function_id: u8) -> Result<EffecterDescriptor, HostError> {
        let records = self
            .pdrs
            .find_state_effecter_pdrs(self.entity_type, self.state_set_id)
            .await?;
        let descriptor = locate_slot(&records, self.state_set_id)?;

        let instance_id = self.instance_ids.acquire()?;
        let fields = fields_for(&descriptor, function_id);
        let packet = encode_set_request(instance_id.value(), descriptor.effecter_id, &fields)?;

        self.transport.send(self.eid, &packet).await?;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::MemoryEventLog;
    use crate::host::pdr::tests::{sample_pdr, SET_A, TARGET};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(u8, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl HostTransport for RecordingTransport {
        async fn send(&self, eid: u8, message: &[u8]) -> Result<(), HostError> {
            if self.fail {
                return Err(HostError::Transport("endpoint unreachable".into()));
            }
            self.sent.lock().push((eid, message.to_vec()));
            Ok(())
        }
    }

    fn forwarder(
        records: Vec<Vec<u8>>,
        transport: Arc<RecordingTransport>,
    ) -> (HostForwarder, MemoryEventLog) {
        let events = MemoryEventLog::new();
        let config = HostConfig {
            enabled: true,
            ..HostConfig::default()
        };
        let forwarder = HostForwarder::new(
            &config,
            Arc::new(StaticPdrRepository::new(records)),
            transport,
            Arc::new(events.clone()),
        );
        (forwarder, events)
    }

    #[tokio::test]
    async fn test_forward_sends_request() {
        let transport = Arc::new(RecordingTransport::default());
        let records = vec![sample_pdr(0x0010, &[SET_A, TARGET]).to_bytes()];
        let (forwarder, events) = forwarder(records, transport.clone());

        assert!(forwarder.send_panel_function_to_host(21).await);

        let sent = transport.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        let (eid, packet) = &sent[0];
        assert_eq!(*eid, 9);
        assert_eq!(packet[0] & 0x80, 0x80);
        assert_eq!(&packet[3..], &[0x10, 0x00, 2, 0x00, 0x00, 0x01, 21]);
        assert!(events.events().is_empty());
        assert_eq!(forwarder.instance_ids().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_missing_pdr_logs_event() {
        let transport = Arc::new(RecordingTransport::default());
        let (forwarder, events) = forwarder(Vec::new(), transport.clone());

        assert!(!forwarder.send_panel_function_to_host(21).await);

        assert!(transport.sent.lock().is_empty());
        let logged = events.events();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].id, "Panel.Error.EffecterNotFound");
        assert_eq!(logged[0].metadata.get("FUNCTION").map(String::as_str), Some("21"));
    }

    #[tokio::test]
    async fn test_transport_failure_releases_instance_id() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let records = vec![sample_pdr(1, &[TARGET]).to_bytes()];
        let (forwarder, events) = forwarder(records, transport);

        assert!(!forwarder.send_panel_function_to_host(22).await);

        assert_eq!(forwarder.instance_ids().in_flight(), 0);
        assert_eq!(events.events()[0].id, "Panel.Error.HostCommunicationError");
    }

    #[tokio::test]
    async fn test_exhausted_pool_aborts_send() {
        let transport = Arc::new(RecordingTransport::default());
        let records = vec![sample_pdr(1, &[TARGET]).to_bytes()];
        let (forwarder, events) = forwarder(records, transport.clone());

        let _held: Vec<_> = (0..32)
            .map(|_| forwarder.instance_ids().acquire().unwrap())
            .collect();
        forwarder.send_panel_function_to_host(34).await;

        assert!(transport.sent.lock().is_empty());
        assert_eq!(events.events()[0].id, "Panel.Error.InstanceIdUnavailable");
    }

    #[tokio::test]
    async fn test_static_repository_filters_by_entity() {
        let mut other = sample_pdr(2, &[TARGET]);
        other.entity_type = 45;
        let repo = StaticPdrRepository::new(vec![
            other.to_bytes(),
            sample_pdr(3, &[TARGET]).to_bytes(),
        ]);

        let found = repo.find_state_effecter_pdrs(69, TARGET).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(locate_slot(&found, TARGET).unwrap().effecter_id, 3);
    }

    #[tokio::test]
    async fn test_mixed_record_dump_still_forwards() {
        let transport = Arc::new(RecordingTransport::default());
        let mut sensor = sample_pdr(4, &[TARGET]).to_bytes();
        sensor[5] = 2; // numeric sensor PDR
        let records = vec![sensor, vec![0x01, 0x02], sample_pdr(0x0010, &[TARGET]).to_bytes()];
        let (forwarder, events) = forwarder(records, transport.clone());

        assert!(forwarder.send_panel_function_to_host(25).await);

        assert_eq!(transport.sent.lock().len(), 1);
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(StaticPdrRepository::from_hex(&["xyz".to_string()]).is_err());
        let ok = StaticPdrRepository::from_hex(&[hex::encode(sample_pdr(1, &[TARGET]).to_bytes())]);
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_mctp_socket_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mctp.sock");
        let server = UnixDatagram::bind(&path).unwrap();

        let transport = MctpSocketTransport::new(path);
        transport.send(9, &[0x80, 0x02, 0x39]).await.unwrap();

        let mut buf = [0u8; 16];
        let n = server.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[9, MCTP_MSG_TYPE_PLDM, 0x80, 0x02, 0x39]);
    }

    #[tokio::test]
    async fn test_mctp_socket_missing_endpoint() {
        let transport = MctpSocketTransport::new(PathBuf::from("/nonexistent/mctp.sock"));
        assert!(matches!(
            transport.send(9, &[0x80]).await,
            Err(HostError::Transport(_))
        ));
    }
}
