// SPDX-License-Identifier: MPL-2.0

//! The privilege-writer lock.
//!
//! Every path that changes the capability state of the process (committing a set,
//! dropping bounding bits, changing the ambient set or the keep-caps flag) holds this lock
//! for its whole syscall sequence. Two writers never interleave, even when they operate on
//! unrelated sets or use different syscallers. Readers do not take it.

use std::sync::{Mutex, MutexGuard, PoisonError};

static PRIVILEGE_WRITER: Mutex<()> = Mutex::new(());

/// Acquires the privilege-writer lock.
pub(crate) fn privilege_writer() -> MutexGuard<'static, ()> {
    // The lock guards no data, so a panic while holding it leaves nothing inconsistent.
    PRIVILEGE_WRITER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}
