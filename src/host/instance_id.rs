//! PLDM instance id pool
//!
//! Requests and responses are correlated by a 5-bit instance id. Ids are
//! handed out round-robin from a monotonic cursor so a just-released id is
//! not immediately reused.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use super::pldm::MAX_INSTANCE_ID;
use crate::error::HostError;

const POOL_SIZE: usize = MAX_INSTANCE_ID as usize + 1;

#[derive(Debug)]
struct PoolState {
    in_use: [bool; POOL_SIZE],
    cursor: usize,
}

/// Shared instance id allocator
#[derive(Debug, Clone)]
pub struct InstanceIdPool {
    state: Arc<Mutex<PoolState>>,
}

/// An allocated id; returned to the pool on drop
#[derive(Debug)]
pub struct InstanceId {
    id: u8,
    pool: InstanceIdPool,
}

impl InstanceId {
    pub fn value(&self) -> u8 {
        self.id
    }
}

impl Drop for InstanceId {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}

impl InstanceIdPool {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                in_use: [false; POOL_SIZE],
                cursor: 0,
            })),
        }
    }

    /// Allocate the next free id after the cursor
    pub fn acquire(&self) -> Result<InstanceId, HostError> {
        let mut state = self.state.lock();

        for step in 0..POOL_SIZE {
            let candidate = (state.cursor + step) % POOL_SIZE;
            if !state.in_use[candidate] {
                state.in_use[candidate] = true;
                state.cursor = (candidate + 1) % POOL_SIZE;
                trace!(instance_id = candidate, "Instance id acquired");
                return Ok(InstanceId {
                    id: candidate as u8,
                    pool: self.clone(),
                });
            }
        }

        Err(HostError::InstanceIdExhausted)
    }

    /// Return an id to the pool; releasing a free id is a no-op
    pub fn release(&self, id: u8) {
        if let Some(slot) = self.state.lock().in_use.get_mut(id as usize) {
            *slot = false;
            trace!(instance_id = id, "Instance id released");
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_use.iter().filter(|&&used| used).count()
    }
}

impl Default for InstanceIdPool {
    fn default() -> Self {
        Self::new()
    }
}
