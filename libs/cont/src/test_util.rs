// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::sync::atomic::{AtomicUsize, Ordering};
use crate::task::{PendingCount, PendingTask};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

type OnSubmit = Box<dyn Fn() + Send + Sync>;

/// A task that doesn't run anything, it just counts how often it was submitted.
pub(crate) struct TestTask {
    pending: PendingCount,
    submissions: AtomicUsize,
    on_submit: Option<OnSubmit>,
}

impl TestTask {
    pub(crate) fn new(pending: isize) -> Arc<Self> {
        Arc::new(Self {
            pending: PendingCount::new(pending),
            submissions: AtomicUsize::new(0),
            on_submit: None,
        })
    }

    /// Like [`TestTask::new`] but runs `f` on the submitting thread every time the task is
    /// submitted.
    pub(crate) fn with_on_submit(pending: isize, f: impl Fn() + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            pending: PendingCount::new(pending),
            submissions: AtomicUsize::new(0),
            on_submit: Some(Box::new(f)),
        })
    }

    pub(crate) fn submissions(&self) -> usize {
        self.submissions.load(Ordering::Acquire)
    }

    pub(crate) fn pending(&self) -> isize {
        self.pending.get()
    }
}

impl PendingTask for TestTask {
    fn adjust_pending(&self, delta: isize) -> isize {
        self.pending.adjust(delta)
    }

    fn submit(self: Arc<Self>) {
        let prev = self.submissions.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(task = ?self, submissions = prev + 1, "submitted");

        if let Some(on_submit) = &self.on_submit {
            on_submit();
        }
    }
}

impl fmt::Debug for TestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTask")
            .field("pending", &self.pending)
            .field("submissions", &self.submissions())
            .finish_non_exhaustive()
    }
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG` for the duration of the returned guard.
pub(crate) fn trace_init() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .set_default()
}
