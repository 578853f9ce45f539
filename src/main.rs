/*!
 * Completion Drain - Demo Entry Point
 *
 * Runs a simulated kernel producer on a blocking thread and drains the
 * completion ring from a tokio event loop:
 * - producer publishes completions in batches, backing off on overflow
 * - event loop polls, drains at most `batch_limit` per tick
 * - a monitor task reports pending completions concurrently
 */

use std::error::Error;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use uring_completion::{
    init_tracing, CompletionCallback, CompletionProducer, CompletionQueue, CompletionQueueMonitor, Cqe, DrainSpan,
    RingConfig, RingError, SimulatedRing,
};

/// -EAGAIN, posted for every seventh operation
const DEMO_ERROR: i32 = -11;

/// Event loop handler: checks ordering and caps each drain at `limit`
struct DrainTally {
    limit: usize,
    in_batch: usize,
    expected: u64,
    received: u64,
    failures: u64,
    out_of_order: u64,
}

impl DrainTally {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            in_batch: 0,
            expected: 0,
            received: 0,
            failures: 0,
            out_of_order: 0,
        }
    }
}

impl CompletionCallback for DrainTally {
    fn handle(&mut self, res: i32, _flags: u32, user_data: u64) -> bool {
        if user_data != self.expected {
            self.out_of_order += 1;
        }
        if res < 0 {
            self.failures += 1;
        }
        self.expected = user_data.wrapping_add(1);
        self.received += 1;
        self.in_batch += 1;
        self.in_batch < self.limit
    }
}

fn run_producer(
    mut producer: CompletionProducer<'static>,
    consumer: CompletionQueueMonitor<'static>,
    total: u64,
    batch: u32,
) {
    let mut next = 0u64;
    let mut overflows = 0u64;

    while next < total && !consumer.is_closed() {
        let mut pushed = 0;
        while pushed < batch && next < total {
            let res = if next % 7 == 6 { DEMO_ERROR } else { 512 };
            match producer.push(Cqe::new(next, res, 0)) {
                Ok(()) => {
                    next += 1;
                    pushed += 1;
                }
                Err(RingError::Overflow { .. }) => {
                    overflows += 1;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "producer stopped");
                    return;
                }
            }
        }

        producer.publish();
        if pushed < batch && next < total {
            std::thread::sleep(Duration::from_micros(50));
        }
    }

    info!(published = next, overflows = overflows, "producer finished");
}

/// Drain on every tick until `total` completions arrive or `shutdown` resolves
///
/// Returns the number of drain batches run.
async fn drain_until<F: Future>(
    queue: &mut CompletionQueue<'_>,
    tally: &mut DrainTally,
    poll_interval: Duration,
    total: u64,
    shutdown: F,
) -> u64 {
    let mut ticker = tokio::time::interval(poll_interval);
    let mut batch = 0u64;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                warn!("Interrupted, closing completion queue");
                break;
            }
        }

        while queue.has_completions() {
            let mut span = DrainSpan::new(queue.ring_fd(), batch);
            tally.in_batch = 0;
            let processed = {
                let _entered = span.enter();
                queue.process(&mut *tally)
            };
            span.record_processed(processed);
            batch += 1;
        }

        if tally.received >= total {
            break;
        }
    }

    batch
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let config = RingConfig::from_env()?;
    info!(
        cq_entries = config.cq_entries,
        batch_limit = config.batch_limit,
        total = config.total_completions,
        "Completion drain starting"
    );

    // The ring lives for the whole process; both halves borrow it for 'static
    let ring: &'static mut SimulatedRing = Box::leak(Box::new(SimulatedRing::from_config(&config)?));
    let (producer, mut queue) = ring.split()?;

    let total = config.total_completions;
    let producer_batch = config.producer_batch;
    let consumer = queue.monitor();
    let producer_task = tokio::task::spawn_blocking(move || {
        run_producer(producer, consumer, total, producer_batch)
    });

    let monitor = queue.monitor();
    let monitor_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        while !monitor.is_closed() {
            ticker.tick().await;
            debug!(pending = monitor.count(), "completion ring pending");
        }
    });

    let mut tally = DrainTally::new(config.batch_limit);
    let batch = drain_until(
        &mut queue,
        &mut tally,
        config.poll_interval(),
        total,
        tokio::signal::ctrl_c(),
    )
    .await;

    debug!(queue = %queue, "final ring state");
    queue.close();

    producer_task.await?;
    monitor_task.await?;

    info!(
        received = tally.received,
        failures = tally.failures,
        out_of_order = tally.out_of_order,
        batches = batch,
        "Completion drain finished"
    );

    if tally.out_of_order > 0 {
        return Err(format!("{} completions arrived out of order", tally.out_of_order).into());
    }
    Ok(())
}
