// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::ALREADY_READY;
use crate::loom::loom_const_fn;
use crate::loom::sync::atomic::{AtomicPtr, Ordering};
use crate::task::TaskRef;
use alloc::boxed::Box;
use core::{fmt, ptr};
use static_assertions::const_assert;

/// A lock-free list of tasks waiting for a [`Cont`] to become ready.
///
/// The list is a Treiber stack anchored on a single [`AtomicPtr`]. The lowest bit of the anchor
/// is the `CLOSED` flag: once it is set no further waiters can be linked and the chain captured by
/// the closing compare-exchange is the final set of waiters. Because opening and closing are
/// decided by the same atomic word, a registration racing with [`set_ready`] either lands in that
/// final chain or observes the flag, never both and never neither.
///
/// Waiters are notified in reverse registration order. Callers must not depend on this.
///
/// [`Cont`]: crate::Cont
/// [`set_ready`]: Self::set_ready
pub struct WaiterList {
    anchor: AtomicPtr<WaiterNode>,
}

/// A single registration of a task on a [`WaiterList`].
///
/// Nodes are owned by the caller until [`WaiterList::try_register`] accepts them, then by the list
/// until the list is closed, at which point the node is consumed by notifying its task.
pub struct WaiterNode {
    task: TaskRef,
    /// Only written by the registering thread before the node is published.
    next: *mut WaiterNode,
}

/// Low bit of the anchor, set once the list has been closed.
const CLOSED: usize = 0b1;

// the CLOSED bit must never collide with a real node address
const_assert!(align_of::<WaiterNode>() > CLOSED);

/// A snapshot of the anchor word: the chain head plus the `CLOSED` tag.
#[derive(Copy, Clone, PartialEq, Eq)]
struct Anchor(*mut WaiterNode);

// === impl Anchor ===

impl Anchor {
    fn is_closed(self) -> bool {
        self.0.addr() & CLOSED == CLOSED
    }

    fn head(self) -> *mut WaiterNode {
        self.0.map_addr(|addr| addr & !CLOSED)
    }

    fn pushed(self, node: *mut WaiterNode) -> Self {
        debug_assert!(!self.is_closed());
        Self(node)
    }

    fn closed(self) -> Self {
        Self(self.0.map_addr(|addr| addr | CLOSED))
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("head", &self.head())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// === impl WaiterList ===

impl WaiterList {
    loom_const_fn! {
        #[must_use]
        pub const fn new() -> Self {
            Self {
                anchor: AtomicPtr::new(ptr::null_mut()),
            }
        }
    }

    /// Returns `true` once [`set_ready`](Self::set_ready) has closed the list.
    ///
    /// This is an `Acquire` load, so observing `true` also makes every write the closing thread
    /// performed before closing visible.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.load(Ordering::Acquire).is_closed()
    }

    /// Attempt to link `node` into the list.
    ///
    /// Returns `Ok(())` if the node was linked; its task is then guaranteed to be notified exactly
    /// once when the list is closed. Returns the unused node as `Err` if the list was already
    /// closed, in which case the caller can treat the guarded value as available right away.
    ///
    /// # Errors
    ///
    /// Hands `node` back if the list is closed.
    pub fn try_register(&self, node: Box<WaiterNode>) -> Result<(), Box<WaiterNode>> {
        let node = Box::into_raw(node);
        let mut anchor = self.load(Ordering::Acquire);

        loop {
            if anchor.is_closed() {
                // Safety: the node was never published, so we still own it exclusively
                let node = unsafe { Box::from_raw(node) };
                tracing::trace!(list = ?self, task = ?node.task, "list closed, handing node back");
                return Err(node);
            }

            // Safety: the node is not reachable through the list until the exchange below
            // succeeds, so nobody else can observe this write
            unsafe {
                (*node).next = anchor.head();
            }

            match self.compare_exchange(anchor, anchor.pushed(node)) {
                Ok(_) => {
                    // the node may already have been notified and freed at this point, don't touch it
                    tracing::trace!(list = ?self, "registered waiter");
                    return Ok(());
                }
                // another waiter was pushed or the list was closed concurrently
                Err(actual) => anchor = actual,
            }
        }
    }

    /// Close the list and notify every waiter linked at the moment of closing.
    ///
    /// Each waiter's task has one input released (see [`TaskRef::release`]) which submits the task
    /// if that was its last outstanding input.
    ///
    /// # Panics
    ///
    /// Panics if the list was already closed. Closing twice is a caller bug and continuing would
    /// notify waiters a second time.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn set_ready(&self) {
        let mut anchor = self.load(Ordering::Acquire);

        let chain = loop {
            assert!(!anchor.is_closed(), "{ALREADY_READY}");

            match self.compare_exchange(anchor, anchor.closed()) {
                Ok(_) => break anchor.head(),
                // a waiter registered since we loaded the anchor, retry with the longer chain
                Err(actual) => anchor = actual,
            }
        };

        // Safety: the successful exchange above closed the list, so `chain` is the complete and
        // final chain and no other thread will ever reach it through the anchor again
        let mut waiters = NotifyRemaining(unsafe { Chain::from_head(chain) });

        let mut notified = 0_usize;
        for node in waiters.0.by_ref() {
            node.notify();
            notified += 1;
        }

        tracing::trace!(notified, "broadcast complete");
    }

    /// A view of this list that can register waiters but not close it.
    #[inline]
    pub fn readiness(&self) -> Readiness<'_> {
        Readiness(self)
    }

    #[inline]
    fn load(&self, order: Ordering) -> Anchor {
        Anchor(self.anchor.load(order))
    }

    /// Exchange the anchor, publishing our writes on success and acquiring the waiters' writes
    /// (or the closing thread's writes) either way.
    #[inline]
    fn compare_exchange(&self, current: Anchor, new: Anchor) -> Result<Anchor, Anchor> {
        self.anchor
            .compare_exchange_weak(current.0, new.0, Ordering::AcqRel, Ordering::Acquire)
            .map(Anchor)
            .map_err(Anchor)
    }
}

impl Default for WaiterList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaiterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let anchor = self.load(Ordering::Acquire);
        f.debug_struct("WaiterList")
            .field("ready", &anchor.is_closed())
            .field("has_waiters", &(!anchor.is_closed() && !anchor.head().is_null()))
            .finish_non_exhaustive()
    }
}

impl Drop for WaiterList {
    fn drop(&mut self) {
        let anchor = self.load(Ordering::Acquire);
        if anchor.is_closed() || anchor.head().is_null() {
            return;
        }

        // Safety: we have exclusive access, so the chain can't change underneath us
        let orphaned = unsafe { Chain::from_head(anchor.head()) }.count();
        tracing::warn!(
            orphaned,
            "waiter list dropped before it was set ready, waiting tasks will never be submitted"
        );
    }
}

/// A read-only view of a [`WaiterList`], as consumed by [`join`] and [`JoinGate`].
///
/// It can check readiness and register waiters, but only the owner of the list can close it. In
/// particular a [`Cont`] can only be made ready by setting its value:
///
/// ```compile_fail
/// let width = cont::Cont::<u32>::new();
/// width.readiness().set_ready();
/// ```
///
/// [`join`]: crate::join
/// [`JoinGate`]: crate::JoinGate
/// [`Cont`]: crate::Cont
#[derive(Copy, Clone, Debug)]
pub struct Readiness<'a>(&'a WaiterList);

// === impl Readiness ===

impl Readiness<'_> {
    /// See [`WaiterList::is_ready`].
    #[inline]
    pub fn is_ready(self) -> bool {
        self.0.is_ready()
    }

    /// See [`WaiterList::try_register`].
    ///
    /// # Errors
    ///
    /// Hands `node` back if the list is closed.
    #[inline]
    pub fn try_register(self, node: Box<WaiterNode>) -> Result<(), Box<WaiterNode>> {
        self.0.try_register(node)
    }
}

impl<'a> From<&'a WaiterList> for Readiness<'a> {
    fn from(list: &'a WaiterList) -> Self {
        list.readiness()
    }
}

/// Owning iterator over a chain detached from its list. Nodes not yet yielded are freed on drop.
struct Chain(*mut WaiterNode);

impl Chain {
    /// # Safety
    ///
    /// `head` must be null or the head of a chain of nodes produced by `Box::into_raw` that the
    /// caller has exclusive ownership of.
    unsafe fn from_head(head: *mut WaiterNode) -> Self {
        Self(head)
    }
}

impl Iterator for Chain {
    type Item = Box<WaiterNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_null() {
            return None;
        }

        // Safety: ensured by the caller of `Chain::from_head`, and every yielded node is unlinked
        // before it is handed out
        let node = unsafe { Box::from_raw(self.0) };
        self.0 = node.next;
        Some(node)
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.by_ref().for_each(drop);
    }
}

/// Notifies whatever is left of the chain if a task's `submit` unwinds out of the broadcast.
struct NotifyRemaining(Chain);

impl Drop for NotifyRemaining {
    fn drop(&mut self) {
        for node in self.0.by_ref() {
            node.notify();
        }
    }
}

// === impl WaiterNode ===

impl WaiterNode {
    pub fn new(task: TaskRef) -> Box<Self> {
        Box::new(Self {
            task,
            next: ptr::null_mut(),
        })
    }

    fn notify(self: Box<Self>) -> bool {
        tracing::trace!(task = ?self.task, "notifying waiter");
        self.task.release(1)
    }
}

impl fmt::Debug for WaiterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaiterNode")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

// Safety: `next` is only accessed by whoever currently owns the node, ownership is handed between
// threads through the anchor's `AcqRel` exchanges
unsafe impl Send for WaiterNode {}
// Safety: a shared `&WaiterNode` only exposes the `TaskRef`, which is `Sync`
unsafe impl Sync for WaiterNode {}
