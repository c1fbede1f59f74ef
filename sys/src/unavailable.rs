// SPDX-License-Identifier: MPL-2.0

use libc::c_long;
use log::{trace, warn};
use nix::errno::Errno;

use crate::{
    single::raw_syscall,
    syscaller::{SysResult, Syscaller},
};

/// Stands in for [`Broadcast`](crate::Broadcast) when no broadcast handler could be
/// installed.
///
/// Reads are issued on the calling thread as usual. Every write fails with the error that
/// kept the handler out, and no thread of the process changes privilege.
#[derive(Debug, Clone, Copy)]
pub struct Unavailable {
    errno: Errno,
}

impl Unavailable {
    pub const fn new(errno: Errno) -> Self {
        Self { errno }
    }

    /// Returns the error every write fails with.
    pub fn errno(&self) -> Errno {
        self.errno
    }
}

impl Syscaller for Unavailable {
    fn name(&self) -> &'static str {
        "unavailable"
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
        warn!(
            "[{}] write syscall {} {:x?} refused: {}",
            self.name(),
            nr,
            args,
            self.errno
        );
        Err(self.errno)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{prctl::PrctlOp, single::SingleThread, syscaller::prctl};

    #[test]
    fn writes_fail_and_reads_pass() {
        let unavailable = Unavailable::new(Errno::EBUSY);
        let before = prctl(&SingleThread, PrctlOp::GetKeepCaps).unwrap();

        assert_eq!(
            prctl(&unavailable, PrctlOp::SetKeepCaps(before == 0)),
            Err(Errno::EBUSY)
        );
        assert_eq!(prctl(&unavailable, PrctlOp::GetKeepCaps), Ok(before));
    }
}
