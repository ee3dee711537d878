// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::task::TaskRef;
use crate::waiter::{Readiness, WaiterNode};
use alloc::vec::Vec;

/// What [`join`] did with the task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum Admission {
    /// Every input was already ready and the task was submitted before `join` returned.
    Submitted,
    /// At least one input was still pending. The task is submitted by whichever thread completes
    /// its last pending input, which may already have happened by the time `join` returns.
    Deferred,
}

/// Submit `task` once every one of `inputs` is ready.
///
/// The task's pending count is raised by `inputs.len()`, and the task is registered as a waiter on
/// every input. Inputs that turn out to be ready already are released in a single bulk adjustment
/// *after* all registrations were attempted. Releasing them one by one would let an early ready
/// input drop the count to zero while later inputs haven't even been registered yet.
///
/// Exactly one party observes the count reaching zero: either this call or the notification of
/// one of the inputs. That party submits the task, so the task is submitted exactly once.
///
/// With no inputs the task is submitted right away.
#[tracing::instrument(level = "trace", skip(inputs), fields(inputs = inputs.len()))]
pub fn join(task: &TaskRef, inputs: &[Readiness<'_>]) -> Admission {
    #[expect(
        clippy::cast_possible_wrap,
        reason = "slices never hold more than isize::MAX elements"
    )]
    task.adjust_pending(inputs.len() as isize);

    let mut already_ready = 0;
    for input in inputs {
        if input.try_register(WaiterNode::new(task.clone())).is_err() {
            already_ready += 1;
        }
    }

    tracing::trace!(already_ready, "registered on all inputs");

    // Skipping the release when nothing was ready matters: every linked node may have been
    // notified already, and a zero-delta adjustment would then observe zero a second time.
    if (already_ready > 0 || inputs.is_empty()) && task.release(already_ready) {
        Admission::Submitted
    } else {
        Admission::Deferred
    }
}

/// Builder for gating one task on a fixed set of [`Cont`]s, possibly of different value types.
///
/// ```
/// # use std::sync::Arc;
/// # use cont::{Admission, Cont, JoinGate, PendingCount, PendingTask, TaskRef};
/// # struct Nop(PendingCount);
/// # impl PendingTask for Nop {
/// #     fn adjust_pending(&self, delta: isize) -> isize { self.0.adjust(delta) }
/// #     fn submit(self: Arc<Self>) {}
/// # }
/// let width = Cont::new();
/// let label = Cont::new();
/// width.set(80_u32);
///
/// let admission = JoinGate::new(TaskRef::new(Arc::new(Nop(PendingCount::new(0)))))
///     .with(&width)
///     .with(&label)
///     .admit();
/// assert_eq!(admission, Admission::Deferred);
///
/// label.set("hello");
/// ```
///
/// [`Cont`]: crate::Cont
#[derive(Debug)]
#[must_use = "a join gate does nothing until `admit` is called"]
pub struct JoinGate<'a> {
    task: TaskRef,
    inputs: Vec<Readiness<'a>>,
}

// === impl JoinGate ===

impl<'a> JoinGate<'a> {
    pub fn new(task: TaskRef) -> Self {
        Self {
            task,
            inputs: Vec::new(),
        }
    }

    /// Add an input the task has to wait for.
    pub fn with(mut self, input: impl Into<Readiness<'a>>) -> Self {
        self.inputs.push(input.into());
        self
    }

    /// Register the task on all inputs, see [`join`].
    pub fn admit(self) -> Admission {
        join(&self.task, &self.inputs)
    }
}
