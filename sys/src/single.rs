// SPDX-License-Identifier: MPL-2.0

use libc::c_long;
use log::trace;
use nix::errno::Errno;

use crate::syscaller::{SysResult, Syscaller};

/// Issues every syscall on the calling OS thread only.
///
/// Writes made through `SingleThread` change the capabilities of one thread and leave
/// the others where they were. Use it only from a thread that has been deliberately
/// isolated, and only when the new state will reach the rest of the process some other
/// way. A typical case is a thread that is about to become the only thread of a fresh
/// process image.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleThread;

/// Invokes `syscall(2)` and converts the C convention into a `SysResult`.
///
/// # Safety
///
/// The arguments must be valid for the syscall `nr`.
pub(crate) unsafe fn raw_syscall(nr: c_long, args: [usize; 6]) -> SysResult {
    // SAFETY: upheld by the caller.
    let ret = unsafe { libc::syscall(nr, args[0], args[1], args[2], args[3], args[4], args[5]) };
    Errno::result(ret).map(|ret| ret as usize)
}

impl Syscaller for SingleThread {
    fn name(&self) -> &'static str {
        "single-thread"
    }

    unsafe fn r3(&self, nr: c_long, a1: usize, a2: usize, a3: usize) -> SysResult {
        // SAFETY: upheld by the caller.
        unsafe { self.r6(nr, [a1, a2, a3, 0, 0, 0]) }
    }

    unsafe fn w3(&self, nr: c_long, a1: usize, a2: usize, a3: usize) -> SysResult {
        // SAFETY: upheld by the caller.
        unsafe { self.w6(nr, [a1, a2, a3, 0, 0, 0]) }
    }

    unsafe fn r6(&self, nr: c_long, args: [usize; 6]) -> SysResult {
        trace!("[{}] read syscall {} {:x?}", self.name(), nr, args);
        // SAFETY: upheld by the caller.
        unsafe { raw_syscall(nr, args) }
    }

    unsafe fn w6(&self, nr: c_long, args: [usize; 6]) -> SysResult {
        trace!("[{}] write syscall {} {:x?}", self.name(), nr, args);
        // SAFETY: upheld by the caller.
        unsafe { raw_syscall(nr, args) }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{prctl::PrctlOp, syscaller::prctl};

    #[test]
    fn bounding_query_of_bit_zero() {
        // CAP_CHOWN exists on every kernel with a bounding set.
        let present = prctl(&SingleThread, PrctlOp::CapBsetRead(0)).unwrap();
        assert!(present <= 1);
    }

    #[test]
    fn bounding_query_out_of_range() {
        assert_eq!(
            prctl(&SingleThread, PrctlOp::CapBsetRead(5000)),
            Err(Errno::EINVAL)
        );
    }
}
