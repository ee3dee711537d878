// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{ALREADY_EMPLACED, ALREADY_READY, NOT_EMPLACED, NotReady, READ_BEFORE_READY};
use crate::loom::cell::UnsafeCell;
use crate::loom::loom_const_fn;
use crate::loom::sync::atomic::{AtomicU8, Ordering};
use crate::waiter::{Readiness, WaiterList, WaiterNode};
use alloc::boxed::Box;
use core::fmt;

/// A single-assignment value that notifies waiting tasks once it is set.
///
/// The producer writes the value exactly once through [`set`] (or [`emplace`] followed by
/// [`set_ready`]); any number of consumers can register themselves to be notified through
/// [`try_register`] or [`join`], or check readiness synchronously with [`is_ready`] and
/// [`try_get`].
///
/// A `Cont` must outlive every registration made on it: dropping it while tasks are still
/// waiting means those tasks are never submitted.
///
/// [`set`]: Self::set
/// [`emplace`]: Self::emplace
/// [`set_ready`]: Self::set_ready
/// [`try_register`]: Self::try_register
/// [`join`]: crate::join
/// [`is_ready`]: Self::is_ready
/// [`try_get`]: Self::try_get
pub struct Cont<T> {
    waiters: WaiterList,
    /// Producer side progress, see [`Slot`]. Only ever moves forward.
    slot: AtomicU8,
    value: UnsafeCell<Option<T>>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
enum Slot {
    /// No value yet.
    Empty = 0,
    /// A producer is writing the value and has exclusive access to it.
    Writing = 1,
    /// The value is written but not yet published.
    Filled = 2,
    /// The value is published and immutable. The waiter list is (about to be) closed.
    Published = 3,
}

// === impl Slot ===

impl Slot {
    fn from_u8(bits: u8) -> Self {
        match bits {
            0 => Self::Empty,
            1 => Self::Writing,
            2 => Self::Filled,
            3 => Self::Published,
            _ => unreachable!("invalid cont slot state {bits:#b}"),
        }
    }
}

// === impl Cont ===

impl<T> Cont<T> {
    loom_const_fn! {
        #[must_use]
        pub const fn new() -> Self {
            Self {
                waiters: WaiterList::new(),
                slot: AtomicU8::new(Slot::Empty as u8),
                value: UnsafeCell::new(None),
            }
        }
    }

    /// Store `value` without publishing it yet.
    ///
    /// Consumers can't observe the value until [`set_ready`](Self::set_ready) is called.
    ///
    /// # Panics
    ///
    /// Panics if a value was already emplaced or the cont is already ready.
    pub fn emplace(&self, value: T) {
        if let Err(actual) = self.transition(Slot::Empty, Slot::Writing) {
            match actual {
                Slot::Published => panic!("{ALREADY_READY}"),
                _ => panic!("{ALREADY_EMPLACED}"),
            }
        }

        // Safety: the `Writing` state grants us exclusive access to the slot. Readers only look at
        // it once the slot is `Published`, which requires us to finish first.
        self.value.with_mut(|slot| unsafe { *slot = Some(value) });

        self.slot.store(Slot::Filled as u8, Ordering::Release);
    }

    /// Publish the emplaced value and submit every task whose last outstanding input this was.
    ///
    /// # Panics
    ///
    /// Panics if no value was emplaced or the cont is already ready.
    pub fn set_ready(&self) {
        if let Err(actual) = self.transition(Slot::Filled, Slot::Published) {
            match actual {
                Slot::Published => panic!("{ALREADY_READY}"),
                _ => panic!("{NOT_EMPLACED}"),
            }
        }

        self.waiters.set_ready();
    }

    /// Set the value and notify all waiters. This is [`emplace`](Self::emplace) followed by
    /// [`set_ready`](Self::set_ready).
    ///
    /// # Panics
    ///
    /// Panics if the cont was already set.
    pub fn set(&self, value: T) {
        self.emplace(value);
        self.set_ready();
    }

    /// Returns `true` once the value is published.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.waiters.is_ready()
    }

    /// Returns the value if the cont is ready.
    pub fn try_get(&self) -> Option<&T> {
        if Slot::from_u8(self.slot.load(Ordering::Acquire)) != Slot::Published {
            return None;
        }

        // Safety: a `Published` slot is never written again, and the acquire load above
        // synchronizes with the release store that finished writing it
        self.value.with(|slot| unsafe { (*slot).as_ref() })
    }

    /// Returns the value of a ready cont.
    ///
    /// # Panics
    ///
    /// Panics if the cont is not ready yet. Callers must have established readiness first, either
    /// through [`is_ready`](Self::is_ready) or by being notified.
    pub fn get(&self) -> &T {
        match self.try_get() {
            Some(value) => value,
            None => panic!("{READ_BEFORE_READY}"),
        }
    }

    /// Register `node` to be notified once this cont is ready.
    ///
    /// See [`WaiterList::try_register`].
    ///
    /// # Errors
    ///
    /// Hands `node` back if the cont is already ready, the value can be read right away.
    #[inline]
    pub fn try_register(&self, node: Box<WaiterNode>) -> Result<(), Box<WaiterNode>> {
        self.waiters.try_register(node)
    }

    /// A view that registers tasks on this cont without being able to complete it, used to gate
    /// tasks on conts of different types.
    #[inline]
    pub fn readiness(&self) -> Readiness<'_> {
        self.waiters.readiness()
    }

    /// Consume the cont, returning its value.
    ///
    /// # Errors
    ///
    /// Returns [`NotReady`] if the cont was never set ready.
    pub fn into_inner(self) -> Result<T, NotReady> {
        let Self { slot, value, .. } = self;

        match (Slot::from_u8(slot.load(Ordering::Acquire)), value.into_inner()) {
            (Slot::Published, Some(value)) => Ok(value),
            _ => Err(NotReady(())),
        }
    }

    #[inline]
    fn transition(&self, from: Slot, to: Slot) -> Result<(), Slot> {
        self.slot
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Slot::from_u8)
    }
}

impl<T> Default for Cont<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> From<&'a Cont<T>> for Readiness<'a> {
    fn from(cont: &'a Cont<T>) -> Self {
        cont.readiness()
    }
}

impl<T: fmt::Debug> fmt::Debug for Cont<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cont")
            .field("value", &self.try_get())
            .field("waiters", &self.waiters)
            .finish_non_exhaustive()
    }
}

// Safety: shared access to the value is only handed out once it is published and immutable, and
// the single write before that is serialized through `slot`
unsafe impl<T: Send + Sync> Sync for Cont<T> {}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::loom::thread;
    use crate::task::TaskRef;
    use crate::test_util::{TestTask, trace_init};
    use alloc::string::{String, ToString};
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use core::time::Duration;
    use rand::Rng;

    #[test]
    fn set_then_get() {
        let _trace = trace_init();

        let cont = Cont::new();
        assert!(!cont.is_ready());
        assert_eq!(cont.try_get(), None);

        cont.set(1337);

        assert!(cont.is_ready());
        assert_eq!(cont.try_get(), Some(&1337));
        assert_eq!(cont.get(), &1337);
    }

    #[test]
    fn emplace_is_invisible_until_set_ready() {
        let _trace = trace_init();

        let cont = Cont::new();
        let task = TestTask::new(1);
        cont.try_register(WaiterNode::new(TaskRef::new(task.clone())))
            .unwrap();

        cont.emplace("hello".to_string());
        assert!(!cont.is_ready());
        assert_eq!(cont.try_get(), None);
        assert_eq!(task.submissions(), 0);

        cont.set_ready();
        assert_eq!(cont.get(), "hello");
        assert_eq!(task.submissions(), 1);
    }

    #[test]
    fn usable_in_statics() {
        static ANSWER: Cont<u32> = Cont::new();
        static WAITERS: WaiterList = WaiterList::new();
        static PENDING: crate::task::PendingCount = crate::task::PendingCount::new(1);

        assert!(!WAITERS.is_ready());
        assert_eq!(ANSWER.try_get(), None);
        ANSWER.set(42);
        assert_eq!(ANSWER.get(), &42);
        assert_eq!(PENDING.adjust(-1), 0);
    }

    // Readiness handed out for gating only turns true through the producer, so a gated task can
    // always read the value.
    #[test]
    fn readiness_follows_published_value() {
        let _trace = trace_init();

        let cont = Arc::new(Cont::new());
        let task = TestTask::with_on_submit(0, {
            let cont = cont.clone();
            move || assert_eq!(cont.try_get(), Some(&5))
        });

        let readiness = Readiness::from(&*cont);
        assert_eq!(
            crate::join(&TaskRef::new(task.clone()), &[readiness]),
            crate::Admission::Deferred
        );

        cont.emplace(5);
        assert!(!readiness.is_ready());
        assert_eq!(task.submissions(), 0);

        cont.set_ready();
        assert!(readiness.is_ready());
        assert_eq!(task.submissions(), 1);
        assert_eq!(cont.get(), &5);
    }

    #[test]
    #[should_panic(expected = "cont was already set ready")]
    fn set_twice_panics() {
        let cont = Cont::new();
        cont.set(1);
        cont.set(2);
    }

    #[test]
    #[should_panic(expected = "cont already holds a value")]
    fn emplace_twice_panics() {
        let cont = Cont::new();
        cont.emplace(1);
        cont.emplace(2);
    }

    #[test]
    #[should_panic(expected = "cont set ready without a value")]
    fn set_ready_without_value_panics() {
        let cont = Cont::<u32>::new();
        cont.set_ready();
    }

    #[test]
    #[should_panic(expected = "cont read before it was set ready")]
    fn get_before_ready_panics() {
        let cont = Cont::<u32>::new();
        cont.emplace(7);
        let _ = cont.get();
    }

    #[test]
    fn double_set_keeps_first_value() {
        let cont = Cont::new();
        cont.set(1);

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cont.set(2)));
        assert!(res.is_err());
        assert_eq!(cont.get(), &1);
    }

    #[test]
    fn into_inner() {
        let cont = Cont::new();
        cont.set(String::from("value"));
        assert_eq!(cont.into_inner().unwrap(), "value");

        let cont = Cont::new();
        cont.emplace(1);
        assert_eq!(cont.into_inner(), Err(NotReady(())));
    }

    #[test]
    fn late_registration_reads_synchronously() {
        let cont = Cont::new();
        cont.set(42);

        let task = TestTask::new(1);
        let node = WaiterNode::new(TaskRef::new(task.clone()));
        assert!(cont.try_register(node).is_err());
        assert_eq!(cont.try_get(), Some(&42));
        assert_eq!(task.submissions(), 0);
    }

    #[test]
    fn readers_see_whole_value() {
        let _trace = trace_init();

        let cont = Arc::new(Cont::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cont = cont.clone();
                thread::spawn(move || {
                    loop {
                        if let Some(value) = cont.try_get() {
                            assert_eq!(value, &[0xAB_u8; 256][..]);
                            return;
                        }
                        core::hint::spin_loop();
                    }
                })
            })
            .collect();

        cont.set(vec![0xAB_u8; 256]);

        for reader in readers {
            reader.join().unwrap();
        }
    }

    // Producer completes `1337` after a random delay while the consumer keeps registering until it
    // gets turned away. Every registration must end up either notified with the value or rejected
    // with the value already readable.
    #[test]
    fn registration_races_completion() {
        let _trace = trace_init();

        const TRIALS: usize = 500;

        for _ in 0..TRIALS {
            let cont = Arc::new(Cont::new());
            let delay = Duration::from_micros(rand::rng().random_range(0..200));

            let producer = thread::spawn({
                let cont = cont.clone();
                move || {
                    thread::sleep(delay);
                    cont.set(1337_u32);
                }
            });

            let consumer = thread::spawn({
                let cont = cont.clone();
                move || {
                    let mut linked = Vec::new();

                    loop {
                        let task = TestTask::with_on_submit(1, {
                            let cont = cont.clone();
                            move || assert_eq!(cont.try_get(), Some(&1337))
                        });

                        match cont.try_register(WaiterNode::new(TaskRef::new(task.clone()))) {
                            Ok(()) => linked.push(task),
                            Err(_) => {
                                assert_eq!(cont.try_get(), Some(&1337));
                                assert_eq!(task.submissions(), 0);
                                return linked;
                            }
                        }
                    }
                }
            });

            producer.join().unwrap();
            for task in consumer.join().unwrap() {
                assert_eq!(task.submissions(), 1);
            }
        }
    }
}
