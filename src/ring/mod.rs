/*!
 * io_uring Completion Ring
 *
 * Consumer side of the kernel's completion ring: records are read straight
 * out of shared memory, handed to a callback in FIFO order and released back
 * to the kernel by publishing the head cursor.
 *
 * ## Memory Ordering
 *
 * - Tail is loaded with `Acquire` so every record written before the kernel
 *   advanced it is visible
 * - Head is stored with `Release` only after the records below it were read,
 *   so the kernel never reuses a slot that is still being decoded
 */

mod completion;
mod cqe;
mod simulated;

pub use completion::{
    CompletionCallback, CompletionQueue, CompletionQueueMonitor, CompletionRingParams,
};
pub use cqe::{Completion, Cqe};
pub use simulated::{CompletionProducer, SimulatedRing};
