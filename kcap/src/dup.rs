// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

/// This trait is a _fallible_ version of `Clone`.
///
/// Whether a [`CapSet`] can be duplicated depends on the set: an empty set cannot.
/// So `CapSet` implements `Dup` and not `Clone`, and a type should not implement both.
///
/// [`CapSet`]: crate::CapSet
pub trait Dup: Sized {
    fn dup(&self) -> Result<Self>;
}
