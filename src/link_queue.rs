//! A lock-free multi-producer multi-consumer linked-list queue.

use crate::backoff::Backoff;
use crate::cache_pad::CachePad;
use crate::node::{self, Node};
use crate::pool::ObjectPool;
use crate::variant::sync::atomic::{AtomicPtr, Ordering};
use crate::variant::sync::Arc;
use crate::Fifo;

use std::fmt;
use std::ptr;

/// An unbounded lock-free MPMC queue with one node per element.
///
/// Simpler than [`BlockQueue`] and cheaper at low rates, at the cost of
/// one allocation per element; `POOL_SIZE` (default 0, no pooling) retired
/// nodes are cached for reuse.
///
/// The queue is a cheap handle: cloning it shares the underlying state.
///
/// # Examples
///
/// ```
/// use lf_fifo::LinkQueue;
/// use std::thread;
///
/// const COUNT: usize = 1_000;
///
/// let queue: LinkQueue<usize> = LinkQueue::new();
///
/// let producer = {
///     let q = queue.clone();
///     thread::spawn(move || {
///         for i in 0..COUNT {
///             q.enqueue(i);
///         }
///     })
/// };
///
/// let mut received = 0;
/// while received < COUNT {
///     if queue.try_dequeue().is_some() {
///         received += 1;
///     }
/// }
///
/// producer.join().unwrap();
/// assert!(queue.try_dequeue().is_none());
/// ```
///
/// [`BlockQueue`]: crate::BlockQueue
pub struct LinkQueue<T, const POOL_SIZE: usize = 0> {
    inner: Arc<Inner<T, POOL_SIZE>>,
}

impl<T> LinkQueue<T> {
    /// Creates an empty queue without node pooling.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::LinkQueue;
    ///
    /// let queue = LinkQueue::<usize>::new();
    /// ```
    pub fn new() -> Self {
        Self::with_pool()
    }
}

impl<T, const POOL_SIZE: usize> LinkQueue<T, POOL_SIZE> {
    /// Creates an empty queue that recycles up to `POOL_SIZE` retired
    /// nodes.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::LinkQueue;
    ///
    /// let queue = LinkQueue::<usize, 8>::with_pool();
    /// queue.enqueue(7);
    /// assert_eq!(queue.try_dequeue(), Some(7));
    /// ```
    pub fn with_pool() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Adds a value at the tail of the queue.
    pub fn enqueue(&self, value: T) {
        self.inner.enqueue(value)
    }

    /// Removes the value at the head of the queue, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::LinkQueue;
    ///
    /// let queue = LinkQueue::<usize>::new();
    /// queue.enqueue(1);
    ///
    /// assert_eq!(queue.try_dequeue(), Some(1));
    /// assert_eq!(queue.try_dequeue(), None);
    /// ```
    pub fn try_dequeue(&self) -> Option<T> {
        self.inner.try_dequeue()
    }

    /// Dequeues and drops everything currently in the queue.
    pub fn clear(&self) {
        while self.try_dequeue().is_some() {}
    }

    /// Advisory: this queue never takes a lock.
    pub fn is_lock_free(&self) -> bool {
        true
    }
}

impl<T> Default for LinkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const POOL_SIZE: usize> Clone for LinkQueue<T, POOL_SIZE> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, const POOL_SIZE: usize> fmt::Debug for LinkQueue<T, POOL_SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("LinkQueue { .. }")
    }
}

impl<T, const POOL_SIZE: usize> Fifo for LinkQueue<T, POOL_SIZE> {
    type Item = T;

    fn enqueue(&self, value: T) {
        LinkQueue::enqueue(self, value)
    }

    fn try_dequeue(&self) -> Option<T> {
        LinkQueue::try_dequeue(self)
    }

    fn is_lock_free(&self) -> bool {
        LinkQueue::is_lock_free(self)
    }
}

/// Claim tag on the head pointer's low bit.
///
/// A consumer owns the head node from the moment its CAS installs the tag
/// until it stores an untagged pointer back. Nodes contain an [`AtomicPtr`]
/// so their alignment keeps the low bit free.
const CLAIM: usize = 1;

fn tagged<T>(ptr: *mut Node<T>) -> *mut Node<T> {
    (ptr as usize | CLAIM) as *mut Node<T>
}

fn untagged<T>(ptr: *mut Node<T>) -> *mut Node<T> {
    (ptr as usize & !CLAIM) as *mut Node<T>
}

struct Inner<T, const POOL_SIZE: usize> {
    /// Dequeue end. A permanent dummy node sits here; the low pointer bit
    /// is the consumer claim tag.
    head: CachePad<AtomicPtr<Node<T>>>,

    /// Enqueue end. Forced to null during teardown so in-flight producers
    /// back out.
    tail: CachePad<AtomicPtr<Node<T>>>,

    pool: ObjectPool<Node<T>, POOL_SIZE>,
}

// The queue moves values of T across threads but never shares a &T.
unsafe impl<T: Send, const POOL_SIZE: usize> Send for Inner<T, POOL_SIZE> {}
unsafe impl<T: Send, const POOL_SIZE: usize> Sync for Inner<T, POOL_SIZE> {}

impl<T, const POOL_SIZE: usize> Inner<T, POOL_SIZE> {
    fn new() -> Self {
        let pool = ObjectPool::new();
        let dummy = pool.alloc(Node::dummy());

        Self {
            head: CachePad::new(AtomicPtr::new(dummy)),
            tail: CachePad::new(AtomicPtr::new(dummy)),
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
        let backoff = Backoff::new();
        let mut observed = self.head.load(Ordering::Acquire);

        // Claim the head node by tagging the pointer's low bit.
        let head = loop {
            let head = untagged(observed);
            match self.head.compare_exchange_weak(
                head,
                tagged(head),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break head,
                Err(current) => {
                    observed = current;
                    backoff.spin();
                }
            }
        };

        unsafe {
            let next = (*head).next.load(Ordering::Acquire);
            if next.is_null() {
                // Nothing behind the dummy; hand the head back untagged.
                self.head.store(head, Ordering::Release);
                return None;
            }

            // Move the value out before publishing the new head, after
            // which another consumer may already release `next`.
            let value = (*next).value.take();
            self.head.store(next, Ordering::Release);

            self.pool.dealloc(head);
            value
        }
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

        // Drain until only the final node is left, then release it. That
        // node is the dummy the head ends on, which `try_dequeue` never
        // frees.
        loop {
            let head = untagged(self.head.load(Ordering::Acquire));
            if head == tail {
                break;
            }
            while self.try_dequeue().is_some() {}
        }

        unsafe { self.pool.dealloc(tail) };
    }
}
