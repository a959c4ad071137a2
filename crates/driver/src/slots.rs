//! Device slot allocator
//!
//! Hands out the small integer identity (0..64) that names an attached
//! device instance. First free slot wins; once all 64 are taken every attach
//! is refused until a device is fully destroyed.

use protocol::{AttachError, SlotId};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Maximum number of concurrently attached devices
pub const MAX_DEVICES: usize = 64;

/// Fixed-capacity slot bitmap shared by every attach and detach
#[derive(Debug)]
pub struct SlotAllocator {
    slots: Mutex<[bool; MAX_DEVICES]>,
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new([false; MAX_DEVICES]),
        }
    }

    /// Take the lowest free slot
    pub fn allocate(&self) -> Result<SlotId, AttachError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        let index = slots
            .iter()
            .position(|taken| !taken)
            .ok_or(AttachError::Exhausted {
                capacity: MAX_DEVICES,
            })?;
        slots[index] = true;

        debug!("Allocated slot {}", index);
        Ok(SlotId(index as u8))
    }

    /// Return a slot to the pool
    pub fn release(&self, slot: SlotId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(taken) = slots.get_mut(usize::from(slot.0)) {
            *taken = false;
            debug!("Released slot {}", slot);
        }
    }

    /// Allocate a slot that is released when the lease is dropped
    pub fn lease(self: &Arc<Self>) -> Result<SlotLease, AttachError> {
        let slot = self.allocate()?;
        Ok(SlotLease {
            slot,
            allocator: Arc::clone(self),
        })
    }

    /// Number of slots currently taken
    pub fn in_use(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|taken| **taken)
            .count()
    }

    pub fn is_taken(&self, slot: SlotId) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(usize::from(slot.0))
            .copied()
            .unwrap_or(false)
    }
}

/// A taken slot, returned to the allocator on drop
#[derive(Debug)]
pub struct SlotLease {
    slot: SlotId,
    allocator: Arc<SlotAllocator>,
}

impl SlotLease {
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.allocator.release(self.slot);
    }
}
