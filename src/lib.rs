/*!
 * io_uring Completion Ring Library
 * Reads kernel-published completion records and hands them to the event loop
 */

pub mod core;
pub mod monitoring;
pub mod ring;

// Re-exports
pub use crate::core::{RingConfig, RingError, RingResult};
pub use monitoring::{init_tracing, DrainSpan};
pub use ring::{
    Completion, CompletionCallback, CompletionProducer, CompletionQueue, CompletionQueueMonitor,
    CompletionRingParams, Cqe, SimulatedRing,
};
