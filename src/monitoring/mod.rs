/*!
 * Monitoring
 * Structured logging and drain tracing
 */

mod tracer;

pub use tracer::{init_tracing, DrainSpan};
