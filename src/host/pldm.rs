//! PLDM SetStateEffecterStates request encoding
//!
//! ```text
//! [rq|d|iid][hdr_ver|type][command][effecter_id u16][count u8]
//! count x [set_request u8][effecter_state u8]
//! ```

use bytes::BufMut;

use super::pdr::{locate_slot, EffecterDescriptor};
use crate::error::HostError;

/// PLDM type for platform monitoring and control
pub const PLDM_PLATFORM: u8 = 0x02;

/// SetStateEffecterStates command code
pub const SET_STATE_EFFECTER_STATES: u8 = 0x39;

/// Largest instance id that fits the 5-bit header field
pub const MAX_INSTANCE_ID: u8 = 0x1F;

/// Composite effecters carry at most this many fields
pub const MAX_COMPOSITE_COUNT: u8 = 8;

const REQUEST_BIT: u8 = 0x80;

/// Per-field request semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SetRequest {
    NoChange = 0x00,
    RequestSet = 0x01,
}

/// One composite field of the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateField {
    pub set_request: SetRequest,
    pub effecter_state: u8,
}

impl StateField {
    pub const NO_CHANGE: StateField = StateField {
        set_request: SetRequest::NoChange,
        effecter_state: 0,
    };
}

/// Fields for a descriptor: no-change everywhere except the resolved slot
pub fn fields_for(descriptor: &EffecterDescriptor, desired_value: u8) -> Vec<StateField> {
    (0..descriptor.effecter_count)
        .map(|position| {
            if position == descriptor.slot_index {
                StateField {
                    set_request: SetRequest::RequestSet,
                    effecter_state: desired_value,
                }
            } else {
                StateField::NO_CHANGE
            }
        })
        .collect()
}

/// Serialize a SetStateEffecterStates request
pub fn encode_set_request(
    instance_id: u8,
    effecter_id: u16,
    fields: &[StateField],
) -> Result<Vec<u8>, HostError> {
    if instance_id > MAX_INSTANCE_ID {
        return Err(HostError::Encode(format!(
            "instance id {} exceeds {}",
            instance_id, MAX_INSTANCE_ID
        )));
    }
    if fields.is_empty() || fields.len() > MAX_COMPOSITE_COUNT as usize {
        return Err(HostError::Encode(format!(
            "composite effecter count {} outside 1..={}",
            fields.len(),
            MAX_COMPOSITE_COUNT
        )));
    }

    let mut out = Vec::with_capacity(3 + 3 + fields.len() * 2);
    out.put_u8(REQUEST_BIT | instance_id);
    out.put_u8(PLDM_PLATFORM);
    out.put_u8(SET_STATE_EFFECTER_STATES);
    out.put_u16_le(effecter_id);
    out.put_u8(fields.len() as u8);
    for field in fields {
        out.put_u8(field.set_request as u8);
        out.put_u8(field.effecter_state);
    }
    Ok(out)
}

/// Resolve the slot for `state_set_id` and build the request setting it to `desired_value`
pub fn build_set_request(
    records: &[Vec<u8>],
    state_set_id: u16,
    instance_id: u8,
    desired_value: u8,
) -> Result<Vec<u8>, HostError> {
    let descriptor = locate_slot(records, state_set_id)?;
    let fields = fields_for(&descriptor, desired_value);
    encode_set_request(instance_id, descriptor.effecter_id, &fields)
}
