use lf_fifo::MpscQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

fn dequeue<T, const POOL_SIZE: usize>(queue: &MpscQueue<T, POOL_SIZE>) -> T {
    loop {
        if let Some(value) = queue.try_dequeue() {
            return value;
        }
        thread::yield_now();
    }
}

#[test]
fn spsc_preserves_order() {
    const COUNT: usize = 50_000;
    let queue: MpscQueue<usize> = MpscQueue::new();

    let producer = {
        let q = queue.clone();
        thread::spawn(move || {
            for i in 0..COUNT {
                q.enqueue(i);
            }
        })
    };

    for i in 0..COUNT {
        assert_eq!(i, dequeue(&queue));
    }

    producer.join().unwrap();
    assert!(queue.try_dequeue().is_none());
}

// Many tagged producers, one consumer: everything arrives exactly once and
// each producer's values arrive in its enqueue order.
#[test]
fn tagged_producers_stay_ordered() {
    const COUNT: usize = 10_000;
    const PRODUCERS: usize = 4;

    let queue: MpscQueue<(usize, usize)> = MpscQueue::new();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let q = queue.clone();
            thread::spawn(move || {
                for i in 0..COUNT {
                    q.enqueue((id, i));
                }
            })
        })
        .collect();

    let mut next = vec![0; PRODUCERS];
    for _ in 0..COUNT * PRODUCERS {
        let (id, value) = dequeue(&queue);
        assert_eq!(next[id], value, "producer {id} out of order");
        next[id] += 1;
    }

    for th in producers {
        th.join().unwrap();
    }

    assert!(queue.try_dequeue().is_none());
    assert_eq!(next, vec![COUNT; PRODUCERS]);
}

#[test]
fn empty_polling_is_stable() {
    let queue: MpscQueue<usize> = MpscQueue::new();

    for _ in 0..1_000 {
        assert!(queue.try_dequeue().is_none());
        assert!(queue.is_lock_free());
    }

    queue.enqueue(7);
    assert_eq!(7, dequeue(&queue));
    assert!(queue.try_dequeue().is_none());
}

#[test]
fn clear_discards_pending_values() {
    let queue: MpscQueue<usize> = MpscQueue::new();

    for i in 0..100 {
        queue.enqueue(i);
    }

    queue.clear();
    assert!(queue.try_dequeue().is_none());

    queue.enqueue(1);
    assert_eq!(1, dequeue(&queue));
}

#[test]
fn pooled_nodes_roundtrip() {
    const COUNT: usize = 10_000;
    const PRODUCERS: usize = 2;
    let queue: MpscQueue<usize, 8> = MpscQueue::with_pool();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let q = queue.clone();
            thread::spawn(move || {
                for i in 0..COUNT {
                    q.enqueue(i);
                }
            })
        })
        .collect();

    for _ in 0..COUNT * PRODUCERS {
        let _ = dequeue(&queue);
    }

    for th in producers {
        th.join().unwrap();
    }

    assert!(queue.try_dequeue().is_none());
}

static DROPS: AtomicUsize = AtomicUsize::new(0);

struct DropTracker(#[allow(dead_code)] usize);

impl Drop for DropTracker {
    fn drop(&mut self) {
        let _ = DROPS.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn drop_releases_undequeued_values() {
    const COUNT: usize = 100;
    const TAKEN: usize = 25;

    let queue: MpscQueue<DropTracker> = MpscQueue::new();
    for i in 0..COUNT {
        queue.enqueue(DropTracker(i));
    }
    for _ in 0..TAKEN {
        let _ = dequeue(&queue);
    }

    assert_eq!(TAKEN, DROPS.load(Ordering::Relaxed));
    drop(queue);
    assert_eq!(COUNT, DROPS.load(Ordering::Relaxed));
}
