#![deny(
    warnings,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
    missing_docs,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications,
    unused_results,
    rust_2018_idioms
)]

//! Lock-free unbounded FIFO queues for task schedulers and
//! producer/consumer pipelines.
//!
//! Three queue variants share the same primitives (exponential backoff,
//! cache padding, a small object cache pool) and differ in how many
//! threads may sit on each end:
//!
//! - [`BlockQueue`] — multi-producer multi-consumer, segmented into
//!   63-slot blocks so the allocator runs once per lap. The workhorse.
//! - [`LinkQueue`] — multi-producer multi-consumer, one node per element.
//! - [`MpscQueue`] — multi-producer *single*-consumer, with a CAS-free
//!   dequeue fast path.
//!
//! All of them are unbounded: `enqueue` always succeeds and never blocks,
//! `try_dequeue` returns `None` instead of waiting. [`BlockingQueue`]
//! wraps any of them when a consumer should park instead of polling.
//!
//! # Examples
//!
//! Multi producer, multi consumer:
//!
//! ```
//! use lf_fifo::BlockQueue;
//! use std::thread;
//!
//! const COUNT: usize = 1_000;
//! const CONCURRENCY: usize = 4;
//!
//! let queue: BlockQueue<usize> = BlockQueue::new();
//!
//! let producers: Vec<_> = (0..CONCURRENCY)
//!     .map(|_| {
//!         let q = queue.clone();
//!         thread::spawn(move || {
//!             for i in 0..COUNT {
//!                 q.enqueue(i);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let consumers: Vec<_> = (0..CONCURRENCY)
//!     .map(|_| {
//!         let q = queue.clone();
//!         thread::spawn(move || {
//!             for _ in 0..COUNT {
//!                 loop {
//!                     if q.try_dequeue().is_some() {
//!                         break;
//!                     }
//!                     thread::yield_now();
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for th in producers.into_iter().chain(consumers) {
//!     th.join().unwrap();
//! }
//!
//! assert!(queue.try_dequeue().is_none());
//! ```
//!
//! A consumer that parks instead of polling:
//!
//! ```
//! use lf_fifo::{BlockQueue, BlockingQueue};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(BlockingQueue::new(BlockQueue::<String>::new()));
//!
//! let consumer = {
//!     let q = Arc::clone(&queue);
//!     thread::spawn(move || q.dequeue())
//! };
//!
//! queue.enqueue(String::from("job"));
//! assert_eq!(consumer.join().unwrap(), "job");
//! ```

mod backoff;
mod block;
mod block_queue;
mod blocking;
mod cache_pad;
mod link_queue;
mod mpsc_queue;
mod node;
mod pool;
mod slot;
mod variant;

pub use block_queue::BlockQueue;
pub use blocking::BlockingQueue;
pub use link_queue::LinkQueue;
pub use mpsc_queue::MpscQueue;

/// The operations every queue in this crate exposes.
///
/// [`BlockingQueue`] accepts any implementor; the trait is also the hook
/// for driving the queue variants interchangeably from generic code.
pub trait Fifo {
    /// The element type carried by the queue.
    type Item;

    /// Adds a value at the tail of the queue. Never blocks.
    fn enqueue(&self, value: Self::Item);

    /// Removes the value at the head of the queue, or returns `None` when
    /// the queue is observed empty or the attempt loses a race.
    fn try_dequeue(&self) -> Option<Self::Item>;

    /// Advisory: whether the queue's operations are lock-free.
    fn is_lock_free(&self) -> bool;
}

/// A [`Fifo`] whose dequeue can park the calling thread.
pub trait BlockingFifo: Fifo {
    /// Removes the value at the head of the queue, blocking until one is
    /// available.
    fn dequeue(&self) -> Self::Item;
}
