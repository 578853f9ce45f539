/*!
 * Completion Queue Tests
 * Ordered draining, early stop, close and diagnostics
 */

use pretty_assertions::assert_eq;
use std::panic::{catch_unwind, AssertUnwindSafe};
use uring_completion::{Completion, CompletionCallback, Cqe, RingConfig, SimulatedRing};

/// Records every completion and stops after `stop_after` entries
struct Recorder {
    seen: Vec<(i32, u32, u64)>,
    stop_after: Option<usize>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            seen: Vec::new(),
            stop_after: None,
        }
    }

    fn stopping_after(n: usize) -> Self {
        Self {
            seen: Vec::new(),
            stop_after: Some(n),
        }
    }
}

impl CompletionCallback for Recorder {
    fn handle(&mut self, res: i32, flags: u32, user_data: u64) -> bool {
        self.seen.push((res, flags, user_data));
        match self.stop_after {
            Some(n) => self.seen.len() < n,
            None => true,
        }
    }
}

#[test]
fn test_drains_two_entries_in_order() {
    let mut ring = SimulatedRing::new(4).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();
    assert_eq!(queue.ring_mask(), 3);

    producer.push(Cqe::new(100, 5, 0)).unwrap();
    producer.push(Cqe::new(101, -4, 0)).unwrap();
    producer.publish();

    let mut recorder = Recorder::new();
    assert_eq!(queue.process(&mut recorder), 2);
    assert_eq!(recorder.seen, vec![(5, 0, 100), (-4, 0, 101)]);
    assert!(!queue.has_completions());
    assert_eq!(producer.consumer_head(), 2);
}

#[test]
fn test_early_stop_defers_remainder() {
    let mut ring = SimulatedRing::new(4).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();

    producer.push(Cqe::new(100, 5, 0)).unwrap();
    producer.push(Cqe::new(101, -4, 0)).unwrap();
    producer.publish();

    let mut first = Recorder::stopping_after(1);
    assert_eq!(queue.process(&mut first), 1);
    assert_eq!(first.seen, vec![(5, 0, 100)]);
    assert!(queue.has_completions());
    assert_eq!(queue.count(), 1);
    assert_eq!(producer.consumer_head(), 1);

    let mut second = Recorder::new();
    assert_eq!(queue.process(&mut second), 1);
    assert_eq!(second.seen, vec![(-4, 0, 101)]);
    assert!(!queue.has_completions());
}

#[test]
fn test_empty_ring_processes_nothing() {
    let mut ring = SimulatedRing::new(4).unwrap();
    let (_producer, mut queue) = ring.split().unwrap();

    let mut recorder = Recorder::new();
    assert!(!queue.has_completions());
    assert_eq!(queue.count(), 0);
    assert_eq!(queue.process(&mut recorder), 0);
    assert!(recorder.seen.is_empty());
}

#[test]
fn test_entries_published_during_batch_wait_for_next_call() {
    let mut ring = SimulatedRing::new(8).unwrap();
    let (producer, mut queue) = ring.split().unwrap();
    let producer = std::cell::RefCell::new(producer);
    producer.borrow_mut().post(Cqe::new(1, 0, 0)).unwrap();

    let mut seen = Vec::new();
    let processed = queue.process(&mut |_res: i32, _flags: u32, udata: u64| {
        seen.push(udata);
        // Publish more while the batch is running
        producer.borrow_mut().post(Cqe::new(udata + 1, 0, 0)).unwrap();
        true
    });

    assert_eq!(processed, 1);
    assert_eq!(seen, vec![1]);
    assert_eq!(queue.count(), 1);
    assert_eq!(queue.reap(8), vec![Completion::new(0, 0, 2)]);
}

#[test]
fn test_closed_queue_is_inert() {
    let mut ring = SimulatedRing::new(4).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();
    let monitor = queue.monitor();

    queue.close();
    producer.post(Cqe::new(1, 0, 0)).unwrap();
    producer.post(Cqe::new(2, 0, 0)).unwrap();

    let mut recorder = Recorder::new();
    assert!(!queue.has_completions());
    assert_eq!(queue.count(), 0);
    assert_eq!(queue.process(&mut recorder), 0);
    assert!(recorder.seen.is_empty());
    assert_eq!(producer.consumer_head(), 0);

    assert!(monitor.is_closed());
    assert!(!monitor.has_completions());
    assert_eq!(monitor.count(), 0);
}

#[test]
fn test_panicking_callback_still_publishes_head() {
    let mut ring = SimulatedRing::new(8).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();
    for udata in 10..14u64 {
        producer.push(Cqe::new(udata, 0, 0)).unwrap();
    }
    producer.publish();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        queue.process(&mut |_res: i32, _flags: u32, udata: u64| {
            if udata == 11 {
                panic!("handler blew up");
            }
            true
        })
    }));
    assert!(outcome.is_err());

    // 10 and 11 were consumed before the panic
    assert_eq!(producer.consumer_head(), 2);
    assert_eq!(queue.head(), 2);

    let rest: Vec<u64> = queue.reap(8).iter().map(|c| c.user_data).collect();
    assert_eq!(rest, vec![12, 13]);
}

#[test]
fn test_dyn_callback() {
    let mut ring = SimulatedRing::new(4).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();
    producer.post(Cqe::new(7, 3, 1)).unwrap();

    let mut boxed: Box<dyn CompletionCallback> = Box::new(Recorder::new());
    assert_eq!(queue.process(boxed.as_mut()), 1);
}

#[test]
fn test_snapshot_does_not_consume() {
    let mut ring = SimulatedRing::new(4).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();
    producer.push(Cqe::new(100, 5, 0)).unwrap();
    producer.push(Cqe::new(101, -4, 2)).unwrap();
    producer.publish();

    let snapshot = queue.snapshot();
    assert_eq!(
        snapshot,
        vec![Completion::new(5, 0, 100), Completion::new(-4, 2, 101)]
    );
    assert_eq!(
        queue.to_string(),
        "CompletionQueue [(res=5, flags=0, udata=100), (res=-4, flags=2, udata=101)]"
    );
    assert_eq!(queue.count(), 2);
    assert_eq!(producer.consumer_head(), 0);

    // Snapshot follows the head after a partial drain
    queue.reap(1);
    assert_eq!(
        queue.to_string(),
        "CompletionQueue [(res=-4, flags=2, udata=101)]"
    );

    queue.reap(1);
    assert_eq!(queue.to_string(), "CompletionQueue []");
}

#[test]
fn test_passthrough_fields() {
    let mut ring = SimulatedRing::new(16).unwrap();
    let params = ring.params();
    let (_producer, queue) = ring.split().unwrap();

    assert_eq!(queue.ring_entries(), 16);
    assert_eq!(queue.ring_capacity(), 16);
    assert_eq!(queue.ring_fd(), params.ring_fd);
    assert_eq!(queue.ring_size(), params.ring_size);
    assert_eq!(queue.ring_address(), params.ring_address);
}

#[test]
fn test_flags_and_user_data_round_trip() {
    let mut ring = SimulatedRing::new(4).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();
    producer.post(Cqe::new(u64::MAX, i32::MIN, u32::MAX)).unwrap();

    let reaped = queue.reap(1);
    assert_eq!(reaped, vec![Completion::new(i32::MIN, u32::MAX, u64::MAX)]);
}

#[test]
fn test_small_config_drains_in_batch_limit_chunks() {
    let config = RingConfig::small();
    let mut ring = SimulatedRing::from_config(&config).unwrap();
    assert_eq!(ring.entries(), config.cq_entries);
    let (mut producer, mut queue) = ring.split().unwrap();

    let mut next = 0u64;
    let mut drained = Vec::new();
    let mut batches = Vec::new();
    while (drained.len() as u64) < config.total_completions {
        while producer.available() > 0 && next < config.total_completions {
            producer.post(Cqe::new(next, next as i32, 0)).unwrap();
            next += 1;
        }
        let remaining = config.total_completions - drained.len() as u64;
        assert_eq!(u64::from(queue.count()), remaining.min(u64::from(config.cq_entries)));

        let mut recorder = Recorder::stopping_after(config.batch_limit);
        let processed = queue.process(&mut recorder);
        assert_eq!(processed, config.batch_limit);
        batches.push(processed);
        drained.extend(recorder.seen.into_iter().map(|(_, _, user_data)| user_data));
    }

    assert_eq!(batches.len(), (config.total_completions as usize) / config.batch_limit);
    assert_eq!(drained, (0..config.total_completions).collect::<Vec<_>>());
    assert!(!queue.has_completions());
}
