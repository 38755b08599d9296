//! Fixed-capacity frame pool
//!
//! All frame buffers are allocated once when the pool is created. Components
//! borrow a slot through a [`FrameHandle`], which cannot be copied or cloned:
//! handing it to another component moves ownership, and returning it through
//! [`FramePool::release`] consumes it.

use crate::frame::{Frame, FrameMeta};
use crate::NwkError;
use nwk_wire::{FrameHeader, HEADER_SIZE};
use tracing::{debug, trace};

/// Exclusive claim on one pool slot
#[derive(Debug, PartialEq, Eq)]
pub struct FrameHandle(u8);

impl FrameHandle {
    /// Pool slot this handle refers to
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Mint a handle without allocating, to exercise misuse in tests
    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        FrameHandle(index as u8)
    }
}

#[derive(Debug)]
struct Slot {
    allocated: bool,
    frame: Frame,
}

/// Fixed set of reusable frame buffers
#[derive(Debug)]
pub struct FramePool {
    slots: Vec<Slot>,
}

impl FramePool {
    /// Create a pool of `capacity` frames (at most 255)
    pub fn new(capacity: usize) -> Result<Self, NwkError> {
        if capacity == 0 || capacity > u8::MAX as usize {
            return Err(NwkError::Config(format!(
                "frame pool capacity must be within 1..=255, got {}",
                capacity
            )));
        }

        let slots = (0..capacity)
            .map(|index| Slot {
                allocated: false,
                frame: Frame::new(index),
            })
            .collect();

        Ok(Self { slots })
    }

    /// Claim a free frame sized for `payload_size` bytes of payload
    ///
    /// Memory is not cleared; the header and metadata are reset. Exhaustion is
    /// backpressure: the caller drops or defers its work.
    pub fn alloc(&mut self, payload_size: usize) -> Result<FrameHandle, NwkError> {
        let index = self
            .slots
            .iter()
            .position(|slot| !slot.allocated)
            .ok_or(NwkError::PoolExhausted)?;

        let slot = &mut self.slots[index];
        slot.frame.set_payload_len(payload_size)?;
        *slot.frame.header_mut() = FrameHeader::default();
        slot.frame.set_meta(FrameMeta::None);
        slot.allocated = true;

        trace!(
            "Allocated frame {} ({} bytes)",
            index,
            HEADER_SIZE + payload_size
        );
        Ok(FrameHandle(index as u8))
    }

    /// Return a frame to the pool
    pub fn release(&mut self, handle: FrameHandle) -> Result<(), NwkError> {
        let index = handle.index();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(NwkError::DoubleRelease { index })?;

        if !slot.allocated {
            debug!("Frame {} released while free", index);
            return Err(NwkError::DoubleRelease { index });
        }

        slot.allocated = false;
        slot.frame.set_meta(FrameMeta::None);
        trace!("Released frame {}", index);
        Ok(())
    }

    /// Frame behind a live handle
    pub fn get(&self, handle: &FrameHandle) -> &Frame {
        &self.slots[handle.index()].frame
    }

    /// Mutable frame behind a live handle
    pub fn get_mut(&mut self, handle: &FrameHandle) -> &mut Frame {
        &mut self.slots[handle.index()].frame
    }

    /// Positional access to allocated frames
    pub fn by_index(&self, index: usize) -> Option<&Frame> {
        self.slots
            .get(index)
            .filter(|slot| slot.allocated)
            .map(|slot| &slot.frame)
    }

    /// Allocated frames in slot order
    pub fn allocated(&self) -> impl Iterator<Item = &Frame> {
        self.slots
            .iter()
            .filter(|slot| slot.allocated)
            .map(|slot| &slot.frame)
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of free slots
    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.allocated).count()
    }
}
