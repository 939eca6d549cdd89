//! A single value cell of a [`Block`].
//!
//! The slot's state word is a set of independent bit flags recording its
//! progress through one use:
//!
//! ```txt
//! 0b000          -> initial, empty
//! WRITE   0b001  -> a producer stored its value
//! READ    0b010  -> a consumer moved the value out
//! DESTROY 0b100  -> the slot takes part in a pending block reclamation
//! ```
//!
//! `WRITE` is always set before `READ` can be observed. `DESTROY` is set
//! only by [`Block::destroy`] while the block is being torn down, and may
//! appear with or without `READ`: the flags stay independent so that a
//! reclaiming thread can mark a slot that a reader still occupies. No flag
//! is ever removed.
//!
//! [`Block`]: crate::block::Block
//! [`Block::destroy`]: crate::block::Block::destroy

use crate::backoff::Backoff;
use crate::variant::cell::UnsafeCell;
use crate::variant::sync::atomic::AtomicUsize;

use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

/// A value cell plus the state word tracking its use.
pub(crate) struct Slot<T> {
    /// The value moved in by a producer, live while `WRITE` is set and
    /// `READ` is not.
    pub(crate) value: UnsafeCell<MaybeUninit<T>>,

    /// Bit flags, see the module docs.
    pub(crate) state: AtomicUsize,
}

impl<T> Slot<T> {
    /// An empty slot. Blocks are carved out of a constant so that creating
    /// one is a memcpy rather than a per-slot initialization loop.
    #[cfg(not(loom))]
    pub(crate) const UNINIT: Slot<T> = Self {
        value: UnsafeCell::new(MaybeUninit::uninit()),
        state: AtomicUsize::new(0),
    };

    // Loom needs to track every atomic it models, so its `AtomicUsize::new`
    // is not const and the `UNINIT` constant cannot exist there.
    #[cfg(loom)]
    pub(crate) fn new() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            state: AtomicUsize::new(0),
        }
    }

    /// Spins until the producer that owns this slot has published its
    /// value.
    ///
    /// Bounded wait: the matching producer already won the tail race and is
    /// between its index CAS and the `WRITE` store.
    pub(crate) fn wait_write(&self) {
        let backoff = Backoff::new();
        while self.state.load(Ordering::Acquire) & WRITE == 0 {
            backoff.snooze();
        }
    }
}

#[cfg(loom)]
impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Set by the producer once the value is stored.
pub(crate) const WRITE: usize = 1;

/// Set by the consumer on its way out of the slot.
pub(crate) const READ: usize = 2;

/// Set during block reclamation, see [`Block::destroy`].
///
/// [`Block::destroy`]: crate::block::Block::destroy
pub(crate) const DESTROY: usize = 4;
