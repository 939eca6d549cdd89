use lf_fifo::LinkQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

fn dequeue<T, const POOL_SIZE: usize>(queue: &LinkQueue<T, POOL_SIZE>) -> T {
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
    let queue: LinkQueue<usize> = LinkQueue::new();

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

#[test]
fn mpmc_conservation_and_per_producer_order() {
    const COUNT: usize = 5_000;
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 2;

    let queue: LinkQueue<(usize, usize)> = LinkQueue::new();
    let received = Arc::new(AtomicUsize::new(0));
    let streams: Arc<Vec<Mutex<Vec<(usize, usize)>>>> =
        Arc::new((0..CONSUMERS).map(|_| Mutex::new(Vec::new())).collect());

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

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|c| {
            let q = queue.clone();
            let received = Arc::clone(&received);
            let streams = Arc::clone(&streams);
            thread::spawn(move || {
                let mut local = Vec::new();
                while received.load(Ordering::SeqCst) < COUNT * PRODUCERS {
                    if let Some(pair) = q.try_dequeue() {
                        local.push(pair);
                        let _ = received.fetch_add(1, Ordering::SeqCst);
                    } else {
                        thread::yield_now();
                    }
                }
                *streams[c].lock().unwrap() = local;
            })
        })
        .collect();

    for th in producers.into_iter().chain(consumers) {
        th.join().unwrap();
    }

    assert!(queue.try_dequeue().is_none());

    let mut by_producer = vec![Vec::new(); PRODUCERS];
    for stream in streams.iter() {
        let stream = stream.lock().unwrap();

        let mut last = vec![None; PRODUCERS];
        for &(id, value) in stream.iter() {
            if let Some(prev) = last[id] {
                assert!(value > prev, "producer {id} reordered: {prev} then {value}");
            }
            last[id] = Some(value);
            by_producer[id].push(value);
        }
    }

    for values in &mut by_producer {
        values.sort_unstable();
        assert_eq!(*values, (0..COUNT).collect::<Vec<_>>());
    }
}

#[test]
fn empty_polling_is_stable() {
    let queue: LinkQueue<usize> = LinkQueue::new();

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
    let queue: LinkQueue<usize> = LinkQueue::new();

    for i in 0..100 {
        queue.enqueue(i);
    }

    queue.clear();
    assert!(queue.try_dequeue().is_none());

    // The queue stays usable afterwards.
    queue.enqueue(1);
    assert_eq!(1, dequeue(&queue));
}

// The pooled variant recycles node storage through the same protocol.
#[test]
fn pooled_nodes_roundtrip() {
    const COUNT: usize = 10_000;
    let queue: LinkQueue<usize, 8> = LinkQueue::with_pool();

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

    let queue: LinkQueue<DropTracker, 4> = LinkQueue::with_pool();
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
