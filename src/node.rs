//! The per-element node shared by the linked-list queues.

use crate::variant::sync::atomic::{AtomicPtr, Ordering};

use std::ptr;

/// One element of a [`LinkQueue`] or [`MpscQueue`], linked towards the
/// tail.
///
/// The node that currently sits at the head acts as a dummy: its value has
/// either never existed (the bootstrap node) or was already moved out by
/// the dequeue that made it the head.
///
/// [`LinkQueue`]: crate::link_queue::LinkQueue
/// [`MpscQueue`]: crate::mpsc_queue::MpscQueue
pub(crate) struct Node<T> {
    /// The node enqueued after this one, published exactly once.
    pub(crate) next: AtomicPtr<Node<T>>,

    /// The payload; `None` once the node has become the dummy.
    pub(crate) value: Option<T>,
}

impl<T> Node<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            value: Some(value),
        }
    }

    /// The empty node that bootstraps a queue's head and tail.
    pub(crate) fn dummy() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            value: None,
        }
    }
}

/// Links `node` after the queue's current tail.
///
/// Returns `false` without linking when `tail` is already null, which the
/// queues use as their teardown signal; the caller keeps ownership of
/// `node` in that case.
///
/// The previous tail stays alive until its `next` is published here: the
/// head cursor never advances past a node whose `next` is null, so no
/// consumer can release it before the store below. A pointer-value ABA hit
/// on the tail CAS is harmless for the same reason, the protocol only ever
/// dereferences the previous tail through that publication edge.
///
/// # Safety
///
/// `node` must point to an initialized, unlinked node that only the caller
/// can reach.
pub(crate) unsafe fn append<T>(tail: &AtomicPtr<Node<T>>, node: *mut Node<T>) -> bool {
    let mut current = tail.load(Ordering::Acquire);

    loop {
        if current.is_null() {
            return false;
        }

        match tail.compare_exchange_weak(current, node, Ordering::AcqRel, Ordering::Acquire) {
            Ok(prev) => {
                unsafe { (*prev).next.store(node, Ordering::Release) };
                return true;
            }
            Err(observed) => current = observed,
        }
    }
}
