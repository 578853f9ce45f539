/*!
 * Completion Queue
 * Consumer side of a kernel-shared io_uring completion ring
 */

use super::cqe::{Completion, Cqe};
use crate::core::errors::{RingError, RingResult};
use crate::core::types::{Address, Cursor, RingFd, Size, UserData};
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::mem::align_of;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-completion handler invoked by [`CompletionQueue::process`]
///
/// Return `true` to keep draining the current batch, `false` to stop. Entries
/// left behind are delivered on the next call.
pub trait CompletionCallback {
    fn handle(&mut self, res: i32, flags: u32, user_data: UserData) -> bool;
}

impl<F> CompletionCallback for F
where
    F: FnMut(i32, u32, UserData) -> bool,
{
    #[inline(always)]
    fn handle(&mut self, res: i32, flags: u32, user_data: UserData) -> bool {
        self(res, flags, user_data)
    }
}

/// Addresses and sizes handed over by ring setup
///
/// Only the first five fields are interpreted. The rest describe the mapping
/// for whoever owns it and are passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRingParams {
    /// Consumer cursor, written here and read by the kernel
    pub head_address: Address,
    /// Producer cursor, written by the kernel
    pub tail_address: Address,
    pub ring_mask: u32,
    pub ring_entries: u32,
    /// Base of the completion record array
    pub entries_address: Address,
    pub ring_size: Size,
    pub ring_address: Address,
    pub ring_fd: RingFd,
    pub ring_capacity: u32,
}

impl CompletionRingParams {
    /// Check the parts of the layout the reader depends on
    pub fn validate(&self) -> RingResult<()> {
        check_address("head", self.head_address, align_of::<AtomicU32>())?;
        check_address("tail", self.tail_address, align_of::<AtomicU32>())?;
        check_address("entries", self.entries_address, align_of::<Cqe>())?;

        if self.ring_entries == 0 || !self.ring_entries.is_power_of_two() {
            return Err(RingError::InvalidLayout(format!(
                "ring entries {} is not a non-zero power of two",
                self.ring_entries
            )));
        }
        if self.ring_mask != self.ring_entries - 1 {
            return Err(RingError::InvalidLayout(format!(
                "mask {} does not match {} entries",
                self.ring_mask, self.ring_entries
            )));
        }
        Ok(())
    }
}

fn check_address(name: &str, address: Address, align: usize) -> RingResult<()> {
    if address == 0 {
        return Err(RingError::InvalidLayout(format!("{} address is null", name)));
    }
    if address % align != 0 {
        return Err(RingError::InvalidLayout(format!(
            "{} address {:#x} is not {}-byte aligned",
            name, address, align
        )));
    }
    Ok(())
}

/// Reader for kernel-published completion records
///
/// Drains entries in order, hands each one to a callback and publishes the
/// consumer cursor back to the kernel. One owner calls `process`; use
/// [`CompletionQueue::monitor`] to observe the ring from other threads.
pub struct CompletionQueue<'ring> {
    k_head: NonNull<AtomicU32>,
    k_tail: NonNull<AtomicU32>,
    entries: NonNull<Cqe>,
    ring_mask: u32,
    ring_entries: u32,
    ring_size: Size,
    ring_address: Address,
    ring_fd: RingFd,
    ring_capacity: u32,
    /// Local copy of the consumer cursor, equal to the last published head
    head: Cursor,
    closed: Arc<AtomicBool>,
    _mapping: PhantomData<&'ring AtomicU32>,
}

// SAFETY: the queue only touches the mapping through atomics and reads of
// published records. Moving it to the worker that owns the ring is fine.
unsafe impl Send for CompletionQueue<'_> {}

impl<'ring> CompletionQueue<'ring> {
    /// Create a reader over an established completion ring mapping
    ///
    /// # Safety
    ///
    /// The head, tail and entries addresses must stay mapped for `'ring`, the
    /// entries array must hold `ring_entries` records, and no other consumer
    /// may advance the head while this queue is alive.
    pub unsafe fn new(params: CompletionRingParams) -> RingResult<Self> {
        params.validate()?;

        let k_head = NonNull::new_unchecked(params.head_address as *mut AtomicU32);
        let k_tail = NonNull::new_unchecked(params.tail_address as *mut AtomicU32);
        let entries = NonNull::new_unchecked(params.entries_address as *mut Cqe);
        let head = k_head.as_ref().load(Ordering::Acquire);

        debug!(
            ring_fd = params.ring_fd,
            entries = params.ring_entries,
            head = head,
            "Completion queue attached"
        );

        Ok(Self {
            k_head,
            k_tail,
            entries,
            ring_mask: params.ring_mask,
            ring_entries: params.ring_entries,
            ring_size: params.ring_size,
            ring_address: params.ring_address,
            ring_fd: params.ring_fd,
            ring_capacity: params.ring_capacity,
            head,
            closed: Arc::new(AtomicBool::new(false)),
            _mapping: PhantomData,
        })
    }

    #[inline(always)]
    fn shared_head(&self) -> &'ring AtomicU32 {
        // SAFETY: valid for 'ring per the constructor contract
        unsafe { self.k_head.as_ref() }
    }

    #[inline(always)]
    fn shared_tail(&self) -> &'ring AtomicU32 {
        // SAFETY: valid for 'ring per the constructor contract
        unsafe { self.k_tail.as_ref() }
    }

    /// Stop servicing the ring. Idempotent; the mapping is left alone.
    pub fn close(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(ring_fd = self.ring_fd, head = self.head, "Completion queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check if any completion is ready for [`process`](Self::process)
    #[inline]
    pub fn has_completions(&self) -> bool {
        !self.is_closed() && self.head != self.shared_tail().load(Ordering::Acquire)
    }

    /// Number of published, unconsumed completions
    #[inline]
    pub fn count(&self) -> u32 {
        if self.is_closed() {
            return 0;
        }
        self.shared_tail()
            .load(Ordering::Acquire)
            .wrapping_sub(self.head)
    }

    /// Drain completions published up to now and return how many were handled
    ///
    /// Completions published while the batch runs wait for the next call.
    pub fn process<C>(&mut self, callback: &mut C) -> usize
    where
        C: CompletionCallback + ?Sized,
    {
        match self.try_process(|res, flags, user_data| {
            Ok::<_, Infallible>(callback.handle(res, flags, user_data))
        }) {
            Ok(processed) => processed,
            Err(never) => match never {},
        }
    }

    /// Like [`process`](Self::process), but the handler may fail
    ///
    /// On error the entries consumed so far, including the failing one, are
    /// published before the error is returned, so none are delivered twice.
    pub fn try_process<E, F>(&mut self, mut handler: F) -> Result<usize, E>
    where
        F: FnMut(i32, u32, UserData) -> Result<bool, E>,
    {
        if self.is_closed() {
            return Ok(0);
        }

        let tail = self.shared_tail().load(Ordering::Acquire);
        let entries = self.entries;
        let mask = self.ring_mask;
        let mut head = HeadPublisher::new(self.shared_head(), &mut self.head);
        let mut processed = 0;

        while head.cursor() != tail {
            // SAFETY: cursor is behind the acquired tail and the slot is not
            // released to the kernel until the publisher stores a later head
            let cqe = unsafe { Cqe::read(entries, mask, head.cursor()) };
            head.advance();
            processed += 1;

            if !handler(cqe.res, cqe.flags, cqe.user_data)? {
                trace!(
                    processed = processed,
                    remaining = tail.wrapping_sub(head.cursor()),
                    "Completion batch stopped early"
                );
                break;
            }
        }

        Ok(processed)
    }

    /// Collect up to `max` completions in order
    pub fn reap(&mut self, max: usize) -> Vec<Completion> {
        let mut reaped = Vec::with_capacity(max.min(self.count() as usize));
        if max == 0 {
            return reaped;
        }

        self.process(&mut |res: i32, flags: u32, user_data: UserData| {
            reaped.push(Completion::new(res, flags, user_data));
            reaped.len() < max
        });
        reaped
    }

    /// Decode pending completions without consuming them
    ///
    /// For diagnostics only; the head cursor does not move.
    pub fn snapshot(&self) -> Vec<Completion> {
        if self.is_closed() {
            return Vec::new();
        }

        let pending = self.count().min(self.ring_entries);
        (0..pending)
            .map(|offset| {
                let cursor = self.head.wrapping_add(offset);
                // SAFETY: cursor lies in [head, tail) as observed above
                Completion::from(unsafe { Cqe::read(self.entries, self.ring_mask, cursor) })
            })
            .collect()
    }

    /// Read-only handle that can be shared with monitoring threads
    pub fn monitor(&self) -> CompletionQueueMonitor<'ring> {
        CompletionQueueMonitor {
            k_head: self.k_head,
            k_tail: self.k_tail,
            closed: Arc::clone(&self.closed),
            _mapping: PhantomData,
        }
    }

    /// Local consumer cursor
    pub fn head(&self) -> Cursor {
        self.head
    }

    pub fn ring_mask(&self) -> u32 {
        self.ring_mask
    }

    pub fn ring_entries(&self) -> u32 {
        self.ring_entries
    }

    pub fn ring_size(&self) -> Size {
        self.ring_size
    }

    pub fn ring_address(&self) -> Address {
        self.ring_address
    }

    pub fn ring_fd(&self) -> RingFd {
        self.ring_fd
    }

    pub fn ring_capacity(&self) -> u32 {
        self.ring_capacity
    }
}

impl fmt::Display for CompletionQueue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionQueue [")?;
        if self.is_closed() {
            f.write_str("closed")?;
        } else {
            for (i, completion) in self.snapshot().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", completion)?;
            }
        }
        f.write_str("]")
    }
}

impl fmt::Debug for CompletionQueue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("ring_fd", &self.ring_fd)
            .field("ring_entries", &self.ring_entries)
            .field("head", &self.head)
            .field("pending", &self.count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Owns the local head during a drain and publishes it on every exit path
///
/// The release store in `Drop` runs on normal return, early stop, error
/// propagation and unwinding alike.
struct HeadPublisher<'a> {
    shared: &'a AtomicU32,
    local: &'a mut Cursor,
}

impl<'a> HeadPublisher<'a> {
    fn new(shared: &'a AtomicU32, local: &'a mut Cursor) -> Self {
        Self { shared, local }
    }

    #[inline(always)]
    fn cursor(&self) -> Cursor {
        *self.local
    }

    #[inline(always)]
    fn advance(&mut self) {
        *self.local = self.local.wrapping_add(1);
    }
}

impl Drop for HeadPublisher<'_> {
    fn drop(&mut self) {
        // Release: record reads above must complete before the kernel sees the slot free
        self.shared.store(*self.local, Ordering::Release);
    }
}

/// Shareable read-only view of a completion queue
///
/// Counts against the head published to the kernel, which equals the
/// owner's local head whenever it is not inside `process`.
#[derive(Clone)]
pub struct CompletionQueueMonitor<'ring> {
    k_head: NonNull<AtomicU32>,
    k_tail: NonNull<AtomicU32>,
    closed: Arc<AtomicBool>,
    _mapping: PhantomData<&'ring AtomicU32>,
}

// SAFETY: only atomic loads through the pointers
unsafe impl Send for CompletionQueueMonitor<'_> {}
unsafe impl Sync for CompletionQueueMonitor<'_> {}

impl CompletionQueueMonitor<'_> {
    fn cursors(&self) -> (Cursor, Cursor) {
        // SAFETY: same mapping and lifetime as the owning queue
        unsafe {
            let head = self.k_head.as_ref().load(Ordering::Acquire);
            let tail = self.k_tail.as_ref().load(Ordering::Acquire);
            (head, tail)
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn has_completions(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let (head, tail) = self.cursors();
        head != tail
    }

    pub fn count(&self) -> u32 {
        if self.is_closed() {
            return 0;
        }
        let (head, tail) = self.cursors();
        tail.wrapping_sub(head)
    }
}

impl fmt::Debug for CompletionQueueMonitor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueueMonitor")
            .field("pending", &self.count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
