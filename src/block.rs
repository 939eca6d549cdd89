//! A fixed-capacity segment of the [`BlockQueue`].
//!
//! Blocks form a singly-linked chain. Each block holds [`BLOCK_CAP`] slots
//! and covers one [`LAP`] of cursor indices; the final index of a lap is
//! the switching marker where the successor block gets installed, so it
//! never stores a value. A block is linked exactly once, drained by
//! consumers, and reclaimed through [`Block::destroy`] once the last
//! reader has left it.
//!
//! [`BlockQueue`]: crate::block_queue::BlockQueue

use crate::backoff::Backoff;
use crate::cache_pad::CachePad;
use crate::pool::ObjectPool;
use crate::slot::{Slot, DESTROY, READ};
use crate::variant::sync::atomic::{AtomicPtr, Ordering};

/// Each block covers one lap of cursor indices.
#[cfg(not(loom))]
pub(crate) const LAP: usize = 64;

/// Shrunk under loom so the model checker can reach block installation and
/// reclamation in a workable number of interleavings.
#[cfg(loom)]
pub(crate) const LAP: usize = 4;

/// The number of values a block can hold; the remaining index of the lap
/// is the switching marker.
pub(crate) const BLOCK_CAP: usize = LAP - 1;

/// A fixed array of [`Slot`] linked forward in the queue's block chain.
pub(crate) struct Block<T> {
    /// The successor block, published exactly once.
    pub(crate) next: AtomicPtr<CachePad<Block<T>>>,

    /// The value cells of this segment.
    pub(crate) slots: [Slot<T>; BLOCK_CAP],
}

impl<T> Block<T> {
    /// An empty block; copied out of a constant to keep the producer's
    /// allocation path short.
    #[cfg(not(loom))]
    pub(crate) const UNINIT: Block<T> = Self {
        next: AtomicPtr::new(std::ptr::null_mut()),
        slots: [Slot::UNINIT; BLOCK_CAP],
    };

    #[cfg(loom)]
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicPtr::new(std::ptr::null_mut()),
            slots: Default::default(),
        }
    }

    /// Spins until the successor block is published.
    ///
    /// Bounded wait: only called once the tail cursor has moved past this
    /// block, so the installing producer is already mid-publication.
    pub(crate) fn wait_next(&self) -> *mut CachePad<Block<T>> {
        let backoff = Backoff::new();
        loop {
            let next = self.next.load(Ordering::Acquire);
            if !next.is_null() {
                return next;
            }
            backoff.snooze();
        }
    }

    /// Marks the slots below `count` with `DESTROY` and reclaims the block
    /// once none of them is still occupied by a reader.
    ///
    /// Walks downward from `count - 1`. A slot whose `READ` flag is still
    /// clear after `DESTROY` is set belongs to a consumer that has not
    /// left yet; that consumer will observe `DESTROY` on its way out and
    /// finish the reclamation itself. The slot at `count` needs no mark,
    /// its reader is the one that started the teardown.
    ///
    /// # Safety
    ///
    /// `block` must be a block the head cursor has fully moved past, with
    /// every slot below `count` claimed by exactly one reader.
    pub(crate) unsafe fn destroy<const N: usize>(
        block: *mut CachePad<Block<T>>,
        count: usize,
        pool: &ObjectPool<CachePad<Block<T>>, N>,
    ) {
        for i in (0..count).rev() {
            let slot = unsafe { (&*block).slots.get_unchecked(i) };

            if slot.state.load(Ordering::Acquire) & READ == 0
                && slot.state.fetch_or(DESTROY, Ordering::AcqRel) & READ == 0
            {
                // A reader still holds this slot and takes over from here.
                return;
            }
        }

        // Every reader has left, the block can be recycled.
        unsafe { pool.dealloc(block) };
    }
}
