//! A lock-free multi-producer single-consumer linked-list queue.

use crate::cache_pad::CachePad;
use crate::node::{self, Node};
use crate::pool::ObjectPool;
use crate::variant::cell::UnsafeCell;
use crate::variant::sync::atomic::{AtomicPtr, Ordering};
use crate::variant::sync::Arc;
use crate::Fifo;

use std::fmt;
use std::ptr;

/// An unbounded lock-free queue for many producers and one consumer.
///
/// The enqueue side is identical to [`LinkQueue`]; the dequeue side is a
/// plain pointer walk with no atomic claim, which makes it the fastest
/// variant when a single thread drains the queue.
///
/// It is a contract violation to call [`try_dequeue`] from more than one
/// thread at a time; producers may run from any number of threads.
///
/// # Examples
///
/// ```
/// use lf_fifo::MpscQueue;
/// use std::thread;
///
/// const COUNT: usize = 1_000;
/// const PRODUCERS: usize = 4;
///
/// let queue: MpscQueue<usize> = MpscQueue::new();
///
/// let producers: Vec<_> = (0..PRODUCERS)
///     .map(|_| {
///         let q = queue.clone();
///         thread::spawn(move || {
///             for i in 0..COUNT {
///                 q.enqueue(i);
///             }
///         })
///     })
///     .collect();
///
/// let mut received = 0;
/// while received < COUNT * PRODUCERS {
///     if queue.try_dequeue().is_some() {
///         received += 1;
///     }
/// }
///
/// for producer in producers {
///     producer.join().unwrap();
/// }
/// assert!(queue.try_dequeue().is_none());
/// ```
///
/// [`LinkQueue`]: crate::LinkQueue
/// [`try_dequeue`]: MpscQueue::try_dequeue
pub struct MpscQueue<T, const POOL_SIZE: usize = 0> {
    inner: Arc<Inner<T, POOL_SIZE>>,
}

impl<T> MpscQueue<T> {
    /// Creates an empty queue without node pooling.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::MpscQueue;
    ///
    /// let queue = MpscQueue::<usize>::new();
    /// ```
    pub fn new() -> Self {
        Self::with_pool()
    }
}

impl<T, const POOL_SIZE: usize> MpscQueue<T, POOL_SIZE> {
    /// Creates an empty queue that recycles up to `POOL_SIZE` retired
    /// nodes.
    pub fn with_pool() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Adds a value at the tail of the queue. Safe from any thread.
    pub fn enqueue(&self, value: T) {
        self.inner.enqueue(value)
    }

    /// Removes the value at the head of the queue, if any.
    ///
    /// Must only ever run on one thread at a time; concurrent calls from
    /// several threads are a contract violation, even when the calls
    /// themselves do not overlap with each other.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::MpscQueue;
    ///
    /// let queue = MpscQueue::<usize>::new();
    /// queue.enqueue(1);
    ///
    /// assert_eq!(queue.try_dequeue(), Some(1));
    /// assert_eq!(queue.try_dequeue(), None);
    /// ```
    pub fn try_dequeue(&self) -> Option<T> {
        self.inner.try_dequeue()
    }

    /// Dequeues and drops everything currently in the queue. Consumer-side
    /// only, like [`try_dequeue`].
    ///
    /// [`try_dequeue`]: MpscQueue::try_dequeue
    pub fn clear(&self) {
        while self.try_dequeue().is_some() {}
    }

    /// Advisory: this queue never takes a lock.
    pub fn is_lock_free(&self) -> bool {
        true
    }
}

impl<T> Default for MpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const POOL_SIZE: usize> Clone for MpscQueue<T, POOL_SIZE> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, const POOL_SIZE: usize> fmt::Debug for MpscQueue<T, POOL_SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("MpscQueue { .. }")
    }
}

/// The single-consumer contract of [`MpscQueue::try_dequeue`] carries over
/// to the trait surface.
impl<T, const POOL_SIZE: usize> Fifo for MpscQueue<T, POOL_SIZE> {
    type Item = T;

    fn enqueue(&self, value: T) {
        MpscQueue::enqueue(self, value)
    }

    fn try_dequeue(&self) -> Option<T> {
        MpscQueue::try_dequeue(self)
    }

    fn is_lock_free(&self) -> bool {
        MpscQueue::is_lock_free(self)
    }
}

struct Inner<T, const POOL_SIZE: usize> {
    /// Enqueue end, shared by all producers. Forced to null during
    /// teardown so in-flight producers back out.
    tail: CachePad<AtomicPtr<Node<T>>>,

    /// Dequeue end, owned by the single consumer; no atomicity needed.
    head: UnsafeCell<*mut Node<T>>,

    pool: ObjectPool<Node<T>, POOL_SIZE>,
}

// Producers only touch `tail` and the pool; `head` belongs to the single
// consumer, per the `try_dequeue` contract.
unsafe impl<T: Send, const POOL_SIZE: usize> Send for Inner<T, POOL_SIZE> {}
unsafe impl<T: Send, const POOL_SIZE: usize> Sync for Inner<T, POOL_SIZE> {}

impl<T, const POOL_SIZE: usize> Inner<T, POOL_SIZE> {
    fn new() -> Self {
        let pool = ObjectPool::new();
        let dummy = pool.alloc(Node::dummy());

        Self {
            tail: CachePad::new(AtomicPtr::new(dummy)),
            head: UnsafeCell::new(dummy),
            pool,
        }
    }

    fn enqueue(&self, value: T) {
        let node = self.pool.alloc(Node::new(value));

        if !unsafe { node::append(&self.tail, node) } {
            // The queue is being torn down; give the node back.
            unsafe { self.pool.dealloc(node) };
        }
    }

    fn try_dequeue(&self) -> Option<T> {
        self.head.with_mut(|head| unsafe {
            let current = *head;
            let next = (*current).next.load(Ordering::Acquire);
            if next.is_null() {
                return None;
            }

            // The old head retires and `next` becomes the new dummy once
            // its value is moved out.
            *head = next;
            let value = (*next).value.take();
            self.pool.dealloc(current);
            value
        })
    }
}

impl<T, const POOL_SIZE: usize> Drop for Inner<T, POOL_SIZE> {
    fn drop(&mut self) {
        // Null the tail first so a producer that somehow still runs backs
        // out; the real guarantee is the no-concurrent-drop contract.
        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            match self.tail.compare_exchange_weak(
                tail,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => tail = current,
            }
        }

        // Drain until only the final node is left, then release it.
        loop {
            let head = self.head.with(|head| unsafe { *head });
            if head == tail {
                break;
            }
            while self.try_dequeue().is_some() {}
        }

        unsafe { self.pool.dealloc(tail) };
    }
}
