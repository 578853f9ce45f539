/*!
 * Structured Tracing
 * Logging bootstrap and drain-batch spans using the tracing crate
 *
 * Features:
 * - JSON-formatted logs for structured parsing
 * - Per-batch spans with processed counts and timing
 * - Slow drain warnings
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Drains slower than this are reported at warn level
const SLOW_DRAIN: Duration = Duration::from_millis(5);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - URING_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("URING_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        // JSON output for production/parsing
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        // Human-readable output for development
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span covering one drain of a completion ring
pub struct DrainSpan {
    span: tracing::Span,
    start: Instant,
    batch: u64,
    processed: usize,
}

impl DrainSpan {
    pub fn new(ring_fd: i32, batch: u64) -> Self {
        let span = span!(
            Level::DEBUG,
            "drain",
            ring_fd = ring_fd,
            batch = batch,
            processed = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            batch,
            processed: 0,
        }
    }

    /// Record how many completions this drain handed out
    pub fn record_processed(&mut self, processed: usize) {
        self.processed = processed;
        self.span.record("processed", processed);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for DrainSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > SLOW_DRAIN {
            warn!(
                batch = self.batch,
                processed = self.processed,
                duration_us = duration.as_micros() as u64,
                slow = true,
                "slow completion drain"
            );
        } else if self.processed > 0 {
            debug!(
                batch = self.batch,
                processed = self.processed,
                duration_us = duration.as_micros() as u64,
                "completion drain finished"
            );
        }
    }
}
