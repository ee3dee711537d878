// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

/// Panic message for the contract violations below. Kept in one place so tests can match on it.
pub(crate) const ALREADY_READY: &str = "cont was already set ready";
pub(crate) const ALREADY_EMPLACED: &str = "cont already holds a value";
pub(crate) const NOT_EMPLACED: &str = "cont set ready without a value";
pub(crate) const READ_BEFORE_READY: &str = "cont read before it was set ready";

/// The value of a [`Cont`](crate::Cont) was requested before the cont became ready.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NotReady(pub(crate) ());

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("cont is not ready")
    }
}

impl core::error::Error for NotReady {}
