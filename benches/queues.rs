use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use lf_fifo::{BlockQueue, Fifo, LinkQueue, MpscQueue};
use std::thread;

const COUNT: usize = 10_000;

fn roundtrip<Q>(queue: &Q)
where
    Q: Fifo<Item = usize>,
{
    for i in 0..COUNT {
        queue.enqueue(i);
    }
    for _ in 0..COUNT {
        while queue.try_dequeue().is_none() {}
    }
}

fn pipe<Q>(queue: Q)
where
    Q: Fifo<Item = usize> + Clone + Send + 'static,
{
    let producer = {
        let q = queue.clone();
        thread::spawn(move || {
            for i in 0..COUNT {
                q.enqueue(i);
            }
        })
    };

    let mut received = 0;
    while received < COUNT {
        if queue.try_dequeue().is_some() {
            received += 1;
        }
    }

    producer.join().unwrap();
}

fn contend<Q>(queue: Q, producers: usize, consumers: usize)
where
    Q: Fifo<Item = usize> + Clone + Send + 'static,
{
    let quota = COUNT / consumers;

    let ths: Vec<_> = (0..producers)
        .map(|_| {
            let q = queue.clone();
            thread::spawn(move || {
                for i in 0..COUNT / producers {
                    q.enqueue(i);
                }
            })
        })
        .chain((0..consumers).map(|_| {
            let q = queue.clone();
            thread::spawn(move || {
                for _ in 0..quota {
                    loop {
                        if q.try_dequeue().is_some() {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            })
        }))
        .collect();

    for th in ths {
        th.join().unwrap();
    }
}

fn sequential_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_roundtrip");
    group.throughput(Throughput::Elements(COUNT as u64));

    let queue: BlockQueue<usize> = BlockQueue::new();
    group.bench_function("block_queue", |b| b.iter(|| roundtrip(&queue)));

    let queue: LinkQueue<usize> = LinkQueue::new();
    group.bench_function("link_queue", |b| b.iter(|| roundtrip(&queue)));

    let queue: LinkQueue<usize, 8> = LinkQueue::with_pool();
    group.bench_function("link_queue_pooled", |b| b.iter(|| roundtrip(&queue)));

    let queue: MpscQueue<usize> = MpscQueue::new();
    group.bench_function("mpsc_queue", |b| b.iter(|| roundtrip(&queue)));

    group.finish();
}

fn spsc_pipe(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_pipe");
    group.throughput(Throughput::Elements(COUNT as u64));

    group.bench_function("block_queue", |b| b.iter(|| pipe(BlockQueue::<usize>::new())));
    group.bench_function("link_queue", |b| b.iter(|| pipe(LinkQueue::<usize>::new())));
    group.bench_function("mpsc_queue", |b| b.iter(|| pipe(MpscQueue::<usize>::new())));

    group.finish();
}

fn mpmc_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpmc_4x4");
    group.throughput(Throughput::Elements(COUNT as u64));

    group.bench_function("block_queue", |b| {
        b.iter(|| contend(BlockQueue::<usize>::new(), 4, 4))
    });
    group.bench_function("link_queue", |b| {
        b.iter(|| contend(LinkQueue::<usize>::new(), 4, 4))
    });

    group.finish();
}

criterion_group!(benches, sequential_roundtrip, spsc_pipe, mpmc_contended);
criterion_main!(benches);
