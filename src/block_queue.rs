//! The segmented lock-free multi-producer multi-consumer queue.

use crate::backoff::Backoff;
use crate::block::{Block, BLOCK_CAP, LAP};
use crate::cache_pad::CachePad;
use crate::pool::ObjectPool;
use crate::slot::{DESTROY, READ, WRITE};
use crate::variant::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};
use crate::variant::sync::Arc;
use crate::Fifo;

use std::fmt;
use std::mem::{self, MaybeUninit};

/// An unbounded lock-free MPMC queue backed by a linked list of
/// fixed-capacity blocks.
///
/// Values are stored in 63-slot segments, so the allocator runs once per
/// lap instead of once per element, and retired blocks are recycled
/// through a small cache of `POOL_SIZE` (default 2) allocations.
///
/// The queue is a cheap handle: cloning it shares the underlying state.
///
/// # Examples
///
/// ```
/// use lf_fifo::BlockQueue;
/// use std::thread;
///
/// const COUNT: usize = 1_000;
///
/// let queue: BlockQueue<usize> = BlockQueue::new();
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
pub struct BlockQueue<T, const POOL_SIZE: usize = 2> {
    inner: Arc<Inner<T, POOL_SIZE>>,
}

impl<T> BlockQueue<T> {
    /// Creates an empty queue with the default block pool.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::BlockQueue;
    ///
    /// let queue = BlockQueue::<usize>::new();
    /// ```
    pub fn new() -> Self {
        Self::with_pool()
    }
}

impl<T, const POOL_SIZE: usize> BlockQueue<T, POOL_SIZE> {
    /// Creates an empty queue that recycles up to `POOL_SIZE` retired
    /// blocks.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::BlockQueue;
    ///
    /// // No recycling: every block goes back to the allocator.
    /// let queue = BlockQueue::<usize, 0>::with_pool();
    /// queue.enqueue(7);
    /// assert_eq!(queue.try_dequeue(), Some(7));
    /// ```
    pub fn with_pool() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Adds a value at the tail of the queue.
    ///
    /// Never blocks, though it may briefly spin while another producer
    /// installs the next block.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::BlockQueue;
    ///
    /// let queue = BlockQueue::<usize>::new();
    /// queue.enqueue(1);
    /// queue.enqueue(2);
    /// ```
    pub fn enqueue(&self, value: T) {
        self.inner.enqueue(value)
    }

    /// Removes the value at the head of the queue, if any.
    ///
    /// Returns `None` when the queue is observed empty *or* when another
    /// consumer wins the head race; callers that want an element retry in
    /// their own loop.
    ///
    /// # Examples
    ///
    /// ```
    /// use lf_fifo::BlockQueue;
    ///
    /// let queue = BlockQueue::<usize>::new();
    /// queue.enqueue(1);
    ///
    /// assert_eq!(queue.try_dequeue(), Some(1));
    /// assert_eq!(queue.try_dequeue(), None);
    /// ```
    pub fn try_dequeue(&self) -> Option<T> {
        self.inner.try_dequeue()
    }

    /// Advisory: this queue never takes a lock.
    pub fn is_lock_free(&self) -> bool {
        true
    }
}

impl<T> Default for BlockQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const POOL_SIZE: usize> Clone for BlockQueue<T, POOL_SIZE> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, const POOL_SIZE: usize> fmt::Debug for BlockQueue<T, POOL_SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("BlockQueue { .. }")
    }
}

impl<T, const POOL_SIZE: usize> Fifo for BlockQueue<T, POOL_SIZE> {
    type Item = T;

    fn enqueue(&self, value: T) {
        BlockQueue::enqueue(self, value)
    }

    fn try_dequeue(&self) -> Option<T> {
        BlockQueue::try_dequeue(self)
    }

    fn is_lock_free(&self) -> bool {
        BlockQueue::is_lock_free(self)
    }
}

/// The head or tail position: a virtual slot index plus the block that
/// index currently falls into.
///
/// The index is shifted left by [`SHIFT`]; the freed low bit carries
/// [`HAS_NEXT`] on the head cursor. Slot offset within the block is
/// `(index >> SHIFT) % LAP`, and the offset [`BLOCK_CAP`] is the switching
/// marker where the successor block gets installed.
struct Cursor<T> {
    index: AtomicUsize,
    block: AtomicPtr<CachePad<Block<T>>>,
}

/// How many low index bits are reserved for metadata.
const SHIFT: usize = 1;

/// Metadata bit of the head index: the head block already has a published
/// successor, so dequeues can skip the empty check.
const HAS_NEXT: usize = 1;

struct Inner<T, const POOL_SIZE: usize> {
    head: CachePad<Cursor<T>>,
    tail: CachePad<Cursor<T>>,
    pool: ObjectPool<CachePad<Block<T>>, POOL_SIZE>,
}

// The queue moves values of T across threads but never shares a &T.
unsafe impl<T: Send, const POOL_SIZE: usize> Send for Inner<T, POOL_SIZE> {}
unsafe impl<T: Send, const POOL_SIZE: usize> Sync for Inner<T, POOL_SIZE> {}

/// A speculatively allocated successor block.
///
/// A producer that targets the final slot of a block allocates the
/// successor *before* racing for the slot, so the window in which other
/// producers see the switching marker stays as short as possible. If the
/// producer never installs the block, the handle returns it to the pool.
struct SpareBlock<'a, T, const POOL_SIZE: usize> {
    ptr: *mut CachePad<Block<T>>,
    pool: &'a ObjectPool<CachePad<Block<T>>, POOL_SIZE>,
}

impl<'a, T, const POOL_SIZE: usize> SpareBlock<'a, T, POOL_SIZE> {
    fn alloc(pool: &'a ObjectPool<CachePad<Block<T>>, POOL_SIZE>) -> Self {
        #[cfg(not(loom))]
        let block = Block::UNINIT;
        #[cfg(loom)]
        let block = Block::new();

        Self {
            ptr: pool.alloc(CachePad::new(block)),
            pool,
        }
    }

    /// Hands the block over for installation; it no longer returns to the
    /// pool.
    fn into_raw(self) -> *mut CachePad<Block<T>> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }
}

impl<T, const POOL_SIZE: usize> Drop for SpareBlock<'_, T, POOL_SIZE> {
    fn drop(&mut self) {
        unsafe { self.pool.dealloc(self.ptr) };
    }
}

impl<T, const POOL_SIZE: usize> Inner<T, POOL_SIZE> {
    fn new() -> Self {
        let pool = ObjectPool::new();

        #[cfg(not(loom))]
        let block = Block::UNINIT;
        #[cfg(loom)]
        let block = Block::new();

        let first = pool.alloc(CachePad::new(block));

        Self {
            head: CachePad::new(Cursor {
                index: AtomicUsize::new(0),
                block: AtomicPtr::new(first),
            }),
            tail: CachePad::new(Cursor {
                index: AtomicUsize::new(0),
                block: AtomicPtr::new(first),
            }),
            pool,
        }
    }

    fn enqueue(&self, value: T) {
        let backoff = Backoff::new();
        let mut tail = self.tail.index.load(Ordering::Acquire);
        let mut block = self.tail.block.load(Ordering::Acquire);
        let mut spare: Option<SpareBlock<'_, T, POOL_SIZE>> = None;

        loop {
            let offset = (tail >> SHIFT) % LAP;

            // The switching marker: the producer that claimed the final
            // slot is installing the successor. Wait it out.
            if offset == BLOCK_CAP {
                backoff.snooze();
                tail = self.tail.index.load(Ordering::Acquire);
                block = self.tail.block.load(Ordering::Acquire);
                continue;
            }

            // Racing for the final slot: allocate the successor up front,
            // while we can still lose, instead of after winning.
            if offset + 1 == BLOCK_CAP && spare.is_none() {
                spare = Some(SpareBlock::alloc(&self.pool));
            }

            let new_tail = tail.wrapping_add(1 << SHIFT);

            match self.tail.index.compare_exchange_weak(
                tail,
                new_tail,
                Ordering::SeqCst,
                Ordering::Acquire,
            ) {
                Ok(_) => unsafe {
                    // The final slot is ours: publish the successor block
                    // before writing the value.
                    if offset + 1 == BLOCK_CAP {
                        let next = spare.take().unwrap().into_raw();
                        let next_index = new_tail.wrapping_add(1 << SHIFT);

                        self.tail.block.store(next, Ordering::Release);
                        self.tail.index.store(next_index, Ordering::Release);
                        (&*block).next.store(next, Ordering::Release);
                    }

                    let slot = (&*block).slots.get_unchecked(offset);
                    slot.value.with_mut(|p| p.write(MaybeUninit::new(value)));
                    let _ = slot.state.fetch_or(WRITE, Ordering::Release);

                    return;
                },
                Err(current) => {
                    tail = current;
                    block = self.tail.block.load(Ordering::Acquire);
                    backoff.spin();
                }
            }
        }
    }

    fn try_dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut head = self.head.index.load(Ordering::Acquire);
        let mut block = self.head.block.load(Ordering::Acquire);

        let offset = loop {
            let offset = (head >> SHIFT) % LAP;
            if offset != BLOCK_CAP {
                break offset;
            }

            // A consumer is mid-crossing into the next block.
            backoff.snooze();
            head = self.head.index.load(Ordering::Acquire);
            block = self.head.block.load(Ordering::Acquire);
        };

        let mut new_head = head.wrapping_add(1 << SHIFT);

        if new_head & HAS_NEXT == 0 {
            fence(Ordering::SeqCst);
            let tail = self.tail.index.load(Ordering::Relaxed);

            // The head caught up with the tail: nothing to take.
            if head >> SHIFT == tail >> SHIFT {
                return None;
            }

            // Head and tail sit in different blocks, so a successor is
            // already published; record that for later dequeues.
            if (head >> SHIFT) / LAP != (tail >> SHIFT) / LAP {
                new_head |= HAS_NEXT;
            }
        }

        if self
            .head
            .index
            .compare_exchange_weak(head, new_head, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            // Another consumer advanced the head; the retry policy belongs
            // to the caller.
            return None;
        }

        unsafe {
            // We committed to the final slot: move the head cursor into the
            // successor block before touching the value.
            if offset + 1 == BLOCK_CAP {
                let next = (&*block).wait_next();
                let mut next_index = (new_head & !HAS_NEXT).wrapping_add(1 << SHIFT);
                if !(&*next).next.load(Ordering::Relaxed).is_null() {
                    next_index |= HAS_NEXT;
                }

                self.head.block.store(next, Ordering::Release);
                self.head.index.store(next_index, Ordering::Release);
            }

            let slot = (&*block).slots.get_unchecked(offset);
            slot.wait_write();
            let value = slot.value.with(|p| (*p).assume_init_read());

            // Reclaim the block when this was its final slot, or finish a
            // reclamation that stalled on this slot while we were reading.
            if offset + 1 == BLOCK_CAP {
                Block::destroy(block, offset, &self.pool);
            } else if slot.state.fetch_or(READ, Ordering::AcqRel) & DESTROY != 0 {
                Block::destroy(block, offset, &self.pool);
            }

            Some(value)
        }
    }
}

impl<T, const POOL_SIZE: usize> Drop for Inner<T, POOL_SIZE> {
    fn drop(&mut self) {
        let mut head = self.head.index.load(Ordering::Relaxed);
        let tail = self.tail.index.load(Ordering::Relaxed);
        let mut block = self.head.block.load(Ordering::Relaxed);

        // Erase the metadata bits; only the positions matter now.
        head &= !((1 << SHIFT) - 1);
        let tail = tail & !((1 << SHIFT) - 1);

        // The caller guarantees quiescence, so everything between head and
        // tail is a written, undequeued value.
        unsafe {
            while head != tail {
                let offset = (head >> SHIFT) % LAP;

                if offset < BLOCK_CAP {
                    let slot = (&*block).slots.get_unchecked(offset);
                    slot.value.with_mut(|p| (*p).assume_init_drop());
                } else {
                    let next = (&*block).next.load(Ordering::Relaxed);
                    self.pool.dealloc(block);
                    block = next;
                }

                head = head.wrapping_add(1 << SHIFT);
            }

            // The block the cursors ended in.
            self.pool.dealloc(block);
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    // A weak CAS may fail spuriously, in which case `try_dequeue` reports
    // `None`; retry when an element is known to be there.
    fn dequeue(queue: &BlockQueue<usize>) -> usize {
        loop {
            if let Some(value) = queue.try_dequeue() {
                return value;
            }
        }
    }

    #[test]
    fn crossing_a_block_recycles_the_drained_one() {
        let queue: BlockQueue<usize> = BlockQueue::new();

        // One full block plus the first slot of its successor.
        for i in 0..LAP {
            queue.enqueue(i);
        }
        for i in 0..LAP {
            assert_eq!(dequeue(&queue), i);
        }
        assert!(queue.try_dequeue().is_none());

        // Draining the first block hands exactly one allocation back.
        assert_eq!(queue.inner.pool.cached(), 1);
    }

    #[test]
    fn steady_state_reuses_pooled_blocks() {
        let queue: BlockQueue<usize> = BlockQueue::new();

        for lap in 0..8 {
            for i in 0..LAP {
                queue.enqueue(lap * LAP + i);
            }
            for i in 0..LAP {
                assert_eq!(dequeue(&queue), lap * LAP + i);
            }
        }

        // Block turnover settles into the pool instead of the allocator.
        assert!(queue.inner.pool.cached() >= 1);
    }
}
