// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::loom_const_fn;
use crate::loom::sync::atomic::{AtomicIsize, Ordering};
use alloc::sync::Arc;
use core::fmt;

/// The capability a scheduler's task has to expose so it can be gated on [`Cont`]s.
///
/// A task carries a *pending count* of inputs it is still waiting for. Whoever observes that count
/// dropping to exactly zero is responsible for handing the task to the scheduler through
/// [`submit`](Self::submit). This crate never allocates, runs or frees tasks itself.
///
/// [`Cont`]: crate::Cont
pub trait PendingTask: Send + Sync {
    /// Atomically add `delta` to the pending count and return the *resulting* count.
    fn adjust_pending(&self, delta: isize) -> isize;

    /// Enqueue the task for execution.
    ///
    /// Called at most once per zero crossing of the pending count. Must not block.
    ///
    /// If this panics during a broadcast, the remaining waiters of that broadcast are still
    /// notified while unwinding. A second panic among them aborts the process.
    fn submit(self: Arc<Self>);
}

/// A type-erased, reference-counted handle to a [`PendingTask`].
#[derive(Clone)]
pub struct TaskRef(Arc<dyn PendingTask>);

// === impl TaskRef ===

impl TaskRef {
    pub fn new<T: PendingTask + 'static>(task: Arc<T>) -> Self {
        Self(task)
    }

    /// See [`PendingTask::adjust_pending`].
    #[inline]
    pub fn adjust_pending(&self, delta: isize) -> isize {
        self.0.adjust_pending(delta)
    }

    /// Mark `satisfied` inputs of this task as ready, submitting the task if that was the last
    /// outstanding input.
    ///
    /// Returns `true` if *this* call submitted the task.
    ///
    /// # Panics
    ///
    /// Panics if `satisfied` does not fit in an `isize`.
    pub fn release(&self, satisfied: usize) -> bool {
        let delta = isize::try_from(satisfied).expect("input count overflowed `isize`");
        let remaining = self.0.adjust_pending(-delta);
        debug_assert!(remaining >= 0, "pending count of {self:?} went negative");

        tracing::trace!(task = ?self, satisfied, remaining, "released inputs");

        if remaining == 0 {
            tracing::trace!(task = ?self, "last input ready, submitting");
            Arc::clone(&self.0).submit();
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskRef")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// An atomic pending count that [`PendingTask`] implementations can embed.
///
/// The count is adjusted with `AcqRel` ordering so the caller that sees it reach zero also sees
/// every write the other adjusters made before their adjustment, in particular the values of the
/// conts that became ready.
pub struct PendingCount(AtomicIsize);

// === impl PendingCount ===

impl PendingCount {
    loom_const_fn! {
        #[must_use]
        pub const fn new(initial: isize) -> Self {
            Self(AtomicIsize::new(initial))
        }
    }

    /// Add `delta` and return the new count.
    #[inline]
    pub fn adjust(&self, delta: isize) -> isize {
        let prev = self.0.fetch_add(delta, Ordering::AcqRel);
        debug_assert!(
            prev.checked_add(delta).is_some_and(|n| n >= 0),
            "pending count adjusted by {delta} from {prev}"
        );
        prev.wrapping_add(delta)
    }

    #[inline]
    pub fn get(&self) -> isize {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for PendingCount {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for PendingCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PendingCount").field(&self.get()).finish()
    }
}
