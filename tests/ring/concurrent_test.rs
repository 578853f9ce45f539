/*!
 * Cross-Thread Tests
 * Producer and consumer on separate threads with acquire/release cursors
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use uring_completion::{Cqe, RingError, SimulatedRing};

const TOTAL: u64 = 50_000;

#[test]
fn test_producer_thread_consumer_thread() {
    let mut ring = SimulatedRing::with_initial_cursor(64, u32::MAX - 1000).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();

    let received = thread::scope(|s| {
        s.spawn(move || {
            let mut next = 0u64;
            while next < TOTAL {
                match producer.push(Cqe::new(next, (next % 1024) as i32, 0)) {
                    Ok(()) => {
                        next += 1;
                        if next % 8 == 0 {
                            producer.publish();
                        }
                    }
                    Err(RingError::Overflow { .. }) => {
                        producer.publish();
                        thread::yield_now();
                    }
                    Err(e) => panic!("unexpected producer error: {}", e),
                }
            }
            producer.publish();
        });

        let consumer = s.spawn(move || {
            let mut expected = 0u64;
            let mut batch = 0u64;
            while expected < TOTAL {
                if !queue.has_completions() {
                    thread::yield_now();
                    continue;
                }
                // Stop every third batch early to exercise partial publishes
                let limit = if batch % 3 == 0 { 5 } else { usize::MAX };
                let mut in_batch = 0usize;
                queue.process(&mut |res: i32, _flags: u32, udata: u64| {
                    assert_eq!(udata, expected, "completion out of order");
                    assert_eq!(res, (udata % 1024) as i32, "record torn");
                    expected += 1;
                    in_batch += 1;
                    in_batch < limit
                });
                batch += 1;
            }
            assert!(!queue.has_completions());
            expected
        });

        consumer.join().unwrap()
    });

    assert_eq!(received, TOTAL);
}

#[test]
fn test_monitor_from_another_thread() {
    let mut ring = SimulatedRing::new(32).unwrap();
    let (mut producer, mut queue) = ring.split().unwrap();
    let monitor = queue.monitor();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                // Never more pending than the ring can hold
                assert!(monitor.count() <= 32);
                thread::yield_now();
            }
        });

        for round in 0..200u64 {
            for i in 0..16 {
                producer.push(Cqe::new(round * 16 + i, 0, 0)).unwrap();
            }
            producer.publish();
            assert_eq!(queue.reap(16).len(), 16);
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(monitor.count(), 0);
    queue.close();
    assert!(monitor.is_closed());
}
