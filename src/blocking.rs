//! An adapter that adds a blocking dequeue to any non-blocking queue.

use crate::backoff::Backoff;
use crate::{BlockingFifo, Fifo};

use std::fmt;
use std::sync::{Condvar, Mutex};

/// Wraps a [`Fifo`] and adds [`dequeue`], which parks the calling thread
/// until a value arrives.
///
/// Every enqueue signals a condition variable; a consumer that finds the
/// queue empty first burns through an exponential backoff and only then
/// parks, so the signal cost is paid only under real starvation. A queue
/// that already blocks natively implements [`BlockingFifo`] itself and
/// needs no adapter.
///
/// # Examples
///
/// ```
/// use lf_fifo::{BlockingQueue, LinkQueue};
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(BlockingQueue::new(LinkQueue::<usize>::new()));
///
/// let consumer = {
///     let q = Arc::clone(&queue);
///     thread::spawn(move || q.dequeue())
/// };
///
/// queue.enqueue(7);
/// assert_eq!(consumer.join().unwrap(), 7);
/// ```
///
/// [`dequeue`]: BlockingQueue::dequeue
pub struct BlockingQueue<Q> {
    queue: Q,
    mutex: Mutex<()>,
    not_empty: Condvar,
}

impl<Q: Fifo> BlockingQueue<Q> {
    /// Wraps `queue` with blocking-dequeue support.
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            mutex: Mutex::new(()),
            not_empty: Condvar::new(),
        }
    }

    /// Adds a value and wakes every parked consumer.
    pub fn enqueue(&self, value: Q::Item) {
        self.queue.enqueue(value);

        // Taking the mutex orders this signal after a racing consumer's
        // decision to park, so the wakeup cannot fall between its last
        // poll and its wait.
        let guard = self.mutex.lock().unwrap();
        self.not_empty.notify_all();
        drop(guard);
    }

    /// Removes the value at the head of the queue, if any. Never blocks.
    pub fn try_dequeue(&self) -> Option<Q::Item> {
        self.queue.try_dequeue()
    }

    /// Removes the value at the head of the queue, parking the thread
    /// until one is available.
    pub fn dequeue(&self) -> Q::Item {
        let backoff = Backoff::new();

        loop {
            if let Some(value) = self.queue.try_dequeue() {
                return value;
            }

            if backoff.is_completed() {
                let guard = self.mutex.lock().unwrap();

                // Re-poll under the mutex: an enqueue that landed before
                // the lock has already sent its notification.
                if let Some(value) = self.queue.try_dequeue() {
                    return value;
                }

                // Spurious wakeups just take another lap through the poll.
                drop(self.not_empty.wait(guard).unwrap());
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Advisory: the adapter's wakeup signalling takes a mutex, so the
    /// combined queue is not lock-free even when the inner queue is.
    pub fn is_lock_free(&self) -> bool {
        false
    }
}

impl<Q: Fifo> Fifo for BlockingQueue<Q> {
    type Item = Q::Item;

    fn enqueue(&self, value: Q::Item) {
        BlockingQueue::enqueue(self, value)
    }

    fn try_dequeue(&self) -> Option<Q::Item> {
        BlockingQueue::try_dequeue(self)
    }

    fn is_lock_free(&self) -> bool {
        BlockingQueue::is_lock_free(self)
    }
}

impl<Q: Fifo> BlockingFifo for BlockingQueue<Q> {
    fn dequeue(&self) -> Q::Item {
        BlockingQueue::dequeue(self)
    }
}

impl<Q: Fifo + Default> Default for BlockingQueue<Q> {
    fn default() -> Self {
        Self::new(Q::default())
    }
}

impl<Q> fmt::Debug for BlockingQueue<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("BlockingQueue { .. }")
    }
}
