//! State effecter PDR parsing
//!
//! Layout (little endian):
//!
//! ```text
//! [record_handle u32][version u8][type u8][change_number u16][length u16]
//! [terminus_handle u16][effecter_id u16][entity_type u16][entity_instance u16]
//! [container_id u16][semantic_id u16][init u8][has_description u8][count u8]
//! count x [state_set_id u16][states_size u8][states; states_size]
//! ```

use bytes::{Buf, BufMut};
use tracing::debug;

use crate::error::HostError;

/// PDR type code of a state effecter PDR
pub const STATE_EFFECTER_PDR_TYPE: u8 = 11;

/// Common PDR header length
pub const PDR_HEADER_LEN: usize = 10;

/// Fixed part of a state effecter PDR after the common header
const EFFECTER_FIXED_LEN: usize = 15;

/// Effecter slot resolved for a state set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffecterDescriptor {
    pub effecter_id: u16,
    pub effecter_count: u8,
    /// Position of the matching entry; always below `effecter_count`
    pub slot_index: u8,
}

/// One possible-states entry of a composite effecter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PossibleStates {
    pub state_set_id: u16,
    pub states: Vec<u8>,
}

/// Decoded state effecter PDR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEffecterPdr {
    pub record_handle: u32,
    pub terminus_handle: u16,
    pub effecter_id: u16,
    pub entity_type: u16,
    pub entity_instance: u16,
    pub container_id: u16,
    pub possible_states: Vec<PossibleStates>,
}

impl StateEffecterPdr {
    /// Decode a record, checking every length against the buffer
    pub fn parse(mut buf: &[u8]) -> Result<Self, HostError> {
        need(buf, PDR_HEADER_LEN + EFFECTER_FIXED_LEN, "fixed fields")?;

        let record_handle = buf.get_u32_le();
        let _version = buf.get_u8();
        let pdr_type = buf.get_u8();
        let _change_number = buf.get_u16_le();
        let _length = buf.get_u16_le();

        if pdr_type != STATE_EFFECTER_PDR_TYPE {
            return Err(HostError::MalformedPdr(format!(
                "record {} has type {}, expected {}",
                record_handle, pdr_type, STATE_EFFECTER_PDR_TYPE
            )));
        }

        let terminus_handle = buf.get_u16_le();
        let effecter_id = buf.get_u16_le();
        let entity_type = buf.get_u16_le();
        let entity_instance = buf.get_u16_le();
        let container_id = buf.get_u16_le();
        let _semantic_id = buf.get_u16_le();
        let _init = buf.get_u8();
        let _has_description = buf.get_u8();
        let count = buf.get_u8();

        let mut possible_states = Vec::with_capacity(count as usize);
        for position in 0..count {
            need(buf, 3, "possible states header")
                .map_err(|e| with_position(e, record_handle, position))?;
            let state_set_id = buf.get_u16_le();
            let size = buf.get_u8() as usize;

            need(buf, size, "possible states bitfield")
                .map_err(|e| with_position(e, record_handle, position))?;
            let states = buf[..size].to_vec();
            buf.advance(size);

            possible_states.push(PossibleStates { state_set_id, states });
        }

        Ok(Self {
            record_handle,
            terminus_handle,
            effecter_id,
            entity_type,
            entity_instance,
            container_id,
            possible_states,
        })
    }

    /// Serialize back to wire layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.put_u16_le(self.terminus_handle);
        body.put_u16_le(self.effecter_id);
        body.put_u16_le(self.entity_type);
        body.put_u16_le(self.entity_instance);
        body.put_u16_le(self.container_id);
        body.put_u16_le(0); // semantic id
        body.put_u8(0); // effecter init: no init
        body.put_u8(0); // no description PDR
        body.put_u8(self.possible_states.len() as u8);
        for entry in &self.possible_states {
            body.put_u16_le(entry.state_set_id);
            body.put_u8(entry.states.len() as u8);
            body.put_slice(&entry.states);
        }

        let mut out = Vec::with_capacity(PDR_HEADER_LEN + body.len());
        out.put_u32_le(self.record_handle);
        out.put_u8(1); // version
        out.put_u8(STATE_EFFECTER_PDR_TYPE);
        out.put_u16_le(0); // record change number
        out.put_u16_le(body.len() as u16);
        out.put_slice(&body);
        out
    }

    /// Position of the first entry carrying `state_set_id`
    pub fn slot_of(&self, state_set_id: u16) -> Option<u8> {
        self.possible_states
            .iter()
            .position(|p| p.state_set_id == state_set_id)
            .map(|i| i as u8)
    }
}

fn need(buf: &[u8], len: usize, what: &str) -> Result<(), HostError> {
    if buf.remaining() < len {
        return Err(HostError::MalformedPdr(format!(
            "{}: need {} bytes, {} left",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn with_position(err: HostError, record: u32, position: u8) -> HostError {
    match err {
        HostError::MalformedPdr(msg) => {
            HostError::MalformedPdr(format!("record {} entry {}: {}", record, position, msg))
        }
        other => other,
    }
}

/// Find the composite effecter slot carrying `state_set_id`
///
/// Records are scanned in order and entries in declared order; the first
/// match wins. Records that do not decode are skipped; if nothing matches
/// and a record was skipped, the last decode error is returned instead of
/// `NotFound`.
pub fn locate_slot(
    records: &[Vec<u8>],
    state_set_id: u16,
) -> Result<EffecterDescriptor, HostError> {
    let mut skipped = None;

    for record in records {
        let pdr = match StateEffecterPdr::parse(record) {
            Ok(pdr) => pdr,
            Err(e) => {
                debug!(error = %e, "Skipping undecodable effecter PDR");
                skipped = Some(e);
                continue;
            }
        };
        if let Some(slot_index) = pdr.slot_of(state_set_id) {
            return Ok(EffecterDescriptor {
                effecter_id: pdr.effecter_id,
                effecter_count: pdr.possible_states.len() as u8,
                slot_index,
            });
        }
    }

    Err(skipped.unwrap_or(HostError::NotFound {
        state_set_id,
        records: records.len(),
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SET_A: u16 = 0x0011;
    pub(crate) const TARGET: u16 = 0x800A;
    pub(crate) const SET_B: u16 = 0x0196;

    pub(crate) fn sample_pdr(effecter_id: u16, sets: &[u16]) -> StateEffecterPdr {
        StateEffecterPdr {
            record_handle: 42,
            terminus_handle: 1,
            effecter_id,
            entity_type: 69,
            entity_instance: 0,
            container_id: 0,
            possible_states: sets
                .iter()
                .map(|&state_set_id| PossibleStates {
                    state_set_id,
                    states: vec![0xFE, 0xFF],
                })
                .collect(),
        }
    }

    #[test]
    fn test_locate_target_in_middle() {
        let records = vec![sample_pdr(7, &[SET_A, TARGET, SET_B]).to_bytes()];
        let found = locate_slot(&records, TARGET).unwrap();
        assert_eq!(
            found,
            EffecterDescriptor { effecter_id: 7, effecter_count: 3, slot_index: 1 }
        );
    }

    #[test]
    fn test_first_match_wins() {
        let records = vec![
            sample_pdr(7, &[SET_A]).to_bytes(),
            sample_pdr(8, &[TARGET, TARGET]).to_bytes(),
            sample_pdr(9, &[TARGET]).to_bytes(),
        ];
        let found = locate_slot(&records, TARGET).unwrap();
        assert_eq!(found.effecter_id, 8);
        assert_eq!(found.slot_index, 0);
        assert_eq!(found.effecter_count, 2);
    }

    #[test]
    fn test_bad_record_before_match_is_skipped() {
        let mut other_type = sample_pdr(6, &[TARGET]).to_bytes();
        other_type[5] = 9;
        let mut truncated = sample_pdr(5, &[TARGET]).to_bytes();
        truncated.truncate(12);
        let records = vec![
            other_type,
            truncated,
            sample_pdr(7, &[SET_A, TARGET, SET_B]).to_bytes(),
        ];

        let found = locate_slot(&records, TARGET).unwrap();
        assert_eq!(
            found,
            EffecterDescriptor { effecter_id: 7, effecter_count: 3, slot_index: 1 }
        );
    }

    #[test]
    fn test_empty_records_not_found() {
        assert_eq!(
            locate_slot(&[], TARGET),
            Err(HostError::NotFound { state_set_id: TARGET, records: 0 })
        );
    }

    #[test]
    fn test_no_matching_entry() {
        let records = vec![sample_pdr(7, &[SET_A, SET_B]).to_bytes()];
        assert!(matches!(
            locate_slot(&records, TARGET),
            Err(HostError::NotFound { records: 1, .. })
        ));
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let mut bytes = sample_pdr(7, &[SET_A, TARGET]).to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            locate_slot(&[bytes], TARGET),
            Err(HostError::MalformedPdr(_))
        ));
    }

    #[test]
    fn test_wrong_pdr_type_is_malformed() {
        let mut bytes = sample_pdr(7, &[TARGET]).to_bytes();
        bytes[5] = 4; // numeric sensor PDR
        assert!(matches!(
            StateEffecterPdr::parse(&bytes),
            Err(HostError::MalformedPdr(_))
        ));
    }

    #[test]
    fn test_parse_matches_serialized_fields() {
        let pdr = sample_pdr(0x1234, &[TARGET]);
        let parsed = StateEffecterPdr::parse(&pdr.to_bytes()).unwrap();
        assert_eq!(parsed, pdr);
    }
}
