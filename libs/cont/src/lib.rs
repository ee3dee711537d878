// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Single-assignment values ("conts") that hand tasks to a scheduler once their inputs are ready.
//!
//! A [`Cont`] is written exactly once by its producer and broadcasts readiness to every task
//! that registered a [`WaiterNode`] on it before that point. [`join`] builds on this to defer
//! submitting a task until *all* of its input conts are ready, submitting it exactly once.
//!
//! Nothing in here blocks or takes a lock: the waiter list is a lock-free stack anchored on a
//! single tagged pointer, and the scheduler is only ever touched through the narrow
//! [`PendingTask`] capability.
//!
//! ```
//! # use std::sync::Arc;
//! # use std::sync::atomic::{AtomicBool, Ordering};
//! use cont::{Admission, Cont, PendingCount, PendingTask, TaskRef, join};
//!
//! struct Print {
//!     pending: PendingCount,
//!     ran: AtomicBool,
//! }
//!
//! impl PendingTask for Print {
//!     fn adjust_pending(&self, delta: isize) -> isize {
//!         self.pending.adjust(delta)
//!     }
//!
//!     fn submit(self: Arc<Self>) {
//!         self.ran.store(true, Ordering::Release);
//!     }
//! }
//!
//! let input = Cont::new();
//! let task = Arc::new(Print { pending: PendingCount::new(0), ran: AtomicBool::new(false) });
//!
//! assert_eq!(join(&TaskRef::new(task.clone()), &[input.readiness()]), Admission::Deferred);
//! assert!(!task.ran.load(Ordering::Acquire));
//!
//! input.set(1337);
//! assert!(task.ran.load(Ordering::Acquire));
//! assert_eq!(input.get(), &1337);
//! ```

#![cfg_attr(not(test), no_std)]
extern crate alloc;

mod cont;
mod error;
mod join;
mod loom;
mod task;
#[cfg(test)]
mod test_util;
mod waiter;

pub use cont::Cont;
pub use error::NotReady;
pub use join::{Admission, JoinGate, join};
pub use task::{PendingCount, PendingTask, TaskRef};
pub use waiter::{Readiness, WaiterList, WaiterNode};
