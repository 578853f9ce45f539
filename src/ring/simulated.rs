/*!
 * Simulated Completion Ring
 *
 * Heap-backed stand-in for the kernel's completion ring mapping, with the
 * kernel's producer role played by [`CompletionProducer`]. Used by tests,
 * benchmarks and the demo binary where no real ring is available.
 *
 * ## Layout
 *
 * ```text
 * [head u32 | pad to 64]   offset 0
 * [tail u32 | pad to 64]   offset 64
 * [Cqe 0][Cqe 1]...        offset 128
 * ```
 */

use super::completion::{CompletionQueue, CompletionRingParams};
use super::cqe::Cqe;
use crate::core::config::RingConfig;
use crate::core::errors::{RingError, RingResult};
use crate::core::limits::{CQE_SIZE, MAX_CQ_ENTRIES, RING_ALIGNMENT};
use crate::core::types::{Address, Cursor};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

const HEAD_OFFSET: usize = 0;
const TAIL_OFFSET: usize = RING_ALIGNMENT;
const CQES_OFFSET: usize = 2 * RING_ALIGNMENT;

/// Owned memory region laid out like a kernel completion ring
pub struct SimulatedRing {
    base: NonNull<u8>,
    layout: Layout,
    entries: u32,
}

// SAFETY: the region is uniquely owned; access is handed out through split()
unsafe impl Send for SimulatedRing {}

impl SimulatedRing {
    /// Create a ring with `entries` slots and both cursors at zero
    pub fn new(entries: u32) -> RingResult<Self> {
        Self::with_initial_cursor(entries, 0)
    }

    /// Create a ring sized from configuration
    pub fn from_config(config: &RingConfig) -> RingResult<Self> {
        Self::new(config.cq_entries)
    }

    /// Create a ring whose head and tail both start at `start`
    pub fn with_initial_cursor(entries: u32, start: Cursor) -> RingResult<Self> {
        if entries == 0 || !entries.is_power_of_two() || entries > MAX_CQ_ENTRIES {
            return Err(RingError::InvalidLayout(format!(
                "simulated ring needs a power of two in 1..={} entries, got {}",
                MAX_CQ_ENTRIES, entries
            )));
        }

        let size = CQES_OFFSET + entries as usize * CQE_SIZE;
        let layout = Layout::from_size_align(size, RING_ALIGNMENT)
            .map_err(|e| RingError::InvalidLayout(e.to_string()))?;

        // SAFETY: layout has non-zero size
        let base = NonNull::new(unsafe { alloc_zeroed(layout) })
            .ok_or_else(|| RingError::InvalidLayout(format!("failed to allocate {} bytes", size)))?;

        let ring = Self {
            base,
            layout,
            entries,
        };
        ring.cursor(HEAD_OFFSET).store(start, Ordering::Relaxed);
        ring.cursor(TAIL_OFFSET).store(start, Ordering::Relaxed);

        debug!(entries = entries, start = start, size = size, "Simulated completion ring created");
        Ok(ring)
    }

    fn cursor(&self, offset: usize) -> &AtomicU32 {
        // SAFETY: offset is one of the aligned cursor slots inside the region
        unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU32) }
    }

    fn address_of(&self, offset: usize) -> Address {
        self.base.as_ptr() as Address + offset
    }

    pub fn entries(&self) -> u32 {
        self.entries
    }

    /// Describe the region the way ring setup would
    pub fn params(&self) -> CompletionRingParams {
        CompletionRingParams {
            head_address: self.address_of(HEAD_OFFSET),
            tail_address: self.address_of(TAIL_OFFSET),
            ring_mask: self.entries - 1,
            ring_entries: self.entries,
            entries_address: self.address_of(CQES_OFFSET),
            ring_size: self.layout.size(),
            ring_address: self.address_of(0),
            ring_fd: -1,
            ring_capacity: self.entries,
        }
    }

    /// Hand out the single producer and the single consumer of this ring
    pub fn split(&mut self) -> RingResult<(CompletionProducer<'_>, CompletionQueue<'_>)> {
        // SAFETY: the region outlives both halves, which borrow self mutably
        let queue = unsafe { CompletionQueue::new(self.params())? };

        // SAFETY: CQES_OFFSET is 64-byte aligned and the array holds `entries` records
        let entries = unsafe {
            NonNull::new_unchecked(self.base.as_ptr().add(CQES_OFFSET) as *mut Cqe)
        };
        let producer = CompletionProducer {
            head: self.cursor(HEAD_OFFSET),
            tail: self.cursor(TAIL_OFFSET),
            entries,
            mask: self.entries - 1,
            capacity: self.entries,
            local_tail: self.cursor(TAIL_OFFSET).load(Ordering::Acquire),
        };

        Ok((producer, queue))
    }
}

impl Drop for SimulatedRing {
    fn drop(&mut self) {
        // SAFETY: allocated in with_initial_cursor with the same layout
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

/// Kernel-side producer for a [`SimulatedRing`]
///
/// Writes records at the local tail and publishes them in batches with a
/// release store, the way the kernel posts completions.
pub struct CompletionProducer<'ring> {
    head: &'ring AtomicU32,
    tail: &'ring AtomicU32,
    entries: NonNull<Cqe>,
    mask: u32,
    capacity: u32,
    local_tail: Cursor,
}

// SAFETY: the producer is the only writer of the tail and of free slots
unsafe impl Send for CompletionProducer<'_> {}

impl CompletionProducer<'_> {
    /// Write a record without publishing it
    pub fn push(&mut self, cqe: impl Into<Cqe>) -> RingResult<()> {
        let pending = self.local_tail.wrapping_sub(self.consumer_head());
        if pending >= self.capacity {
            return Err(RingError::Overflow {
                pending,
                capacity: self.capacity,
            });
        }

        // SAFETY: the slot was released by the consumer (head acquired above)
        unsafe {
            self.entries
                .as_ptr()
                .add((self.local_tail & self.mask) as usize)
                .write(cqe.into());
        }
        self.local_tail = self.local_tail.wrapping_add(1);
        Ok(())
    }

    /// Make every pushed record visible to the consumer
    pub fn publish(&self) {
        self.tail.store(self.local_tail, Ordering::Release);
    }

    /// Push and publish a single record
    pub fn post(&mut self, cqe: impl Into<Cqe>) -> RingResult<()> {
        self.push(cqe)?;
        self.publish();
        Ok(())
    }

    /// Consumer cursor as the kernel sees it
    pub fn consumer_head(&self) -> Cursor {
        self.head.load(Ordering::Acquire)
    }

    /// Local tail, including records not yet published
    pub fn tail(&self) -> Cursor {
        self.local_tail
    }

    /// Records pushed but not yet published
    pub fn unpublished(&self) -> u32 {
        self.local_tail
            .wrapping_sub(self.tail.load(Ordering::Relaxed))
    }

    /// Free slots from the producer's point of view
    pub fn available(&self) -> u32 {
        self.capacity
            .saturating_sub(self.local_tail.wrapping_sub(self.consumer_head()))
    }
}
