// SPDX-License-Identifier: MPL-2.0

//! The syscall dispatch seam and the safe entry points built on it.

use core::ptr;

use libc::c_long;
use nix::errno::Errno;

use crate::{
    abi::{CapData, CapHeader, words_for_version},
    prctl::{Lowered, PrctlOp},
};

/// The result of a raw syscall: the non-negative return value or the kernel's errno.
pub type SysResult = core::result::Result<usize, Errno>;

/// A strategy for issuing capability syscalls.
///
/// Capabilities are per-OS-thread kernel state. Reading them is always a plain syscall
/// on the calling thread, but writing them must keep every thread of the process in the
/// same privilege state. Each implementation decides how a write reaches the other threads:
/// [`crate::Broadcast`] replays it on all of them, [`crate::SingleThread`] leaves that to the
/// caller.
///
/// # Safety
///
/// All four methods forward raw arguments to the kernel. Callers must pass arguments that
/// are valid for the syscall `nr`, in particular addresses that point to live memory of the
/// size the kernel will access. The safe functions of this crate ([`capget`], [`capset`]
/// and [`prctl`]) uphold this for every capability syscall.
pub trait Syscaller: Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Issues a three-argument syscall that only reads kernel state.
    ///
    /// # Safety
    ///
    /// See the trait documentation.
    unsafe fn r3(&self, nr: c_long, a1: usize, a2: usize, a3: usize) -> SysResult;

    /// Issues a three-argument syscall that modifies kernel state.
    ///
    /// # Safety
    ///
    /// See the trait documentation.
    unsafe fn w3(&self, nr: c_long, a1: usize, a2: usize, a3: usize) -> SysResult;

    /// Issues a six-argument syscall that only reads kernel state.
    ///
    /// # Safety
    ///
    /// See the trait documentation.
    unsafe fn r6(&self, nr: c_long, args: [usize; 6]) -> SysResult;

    /// Issues a six-argument syscall that modifies kernel state.
    ///
    /// # Safety
    ///
    /// See the trait documentation.
    unsafe fn w6(&self, nr: c_long, args: [usize; 6]) -> SysResult;
}

/// Checks that `len` words is enough room for what the kernel transfers under `version`.
///
/// An unknown version is let through: the kernel rejects it before touching the data.
fn check_room(version: u32, len: usize) -> Result<(), Errno> {
    match words_for_version(version) {
        Some(words) if len < words => Err(Errno::EINVAL),
        _ => Ok(()),
    }
}

/// Reads the capability vectors of `header.pid` into `data`.
///
/// With `data` set to `None`, this is a version probe: the kernel overwrites
/// `header.version` with the version it prefers and fails only if the one passed
/// in was not acceptable.
pub fn capget<S: Syscaller + ?Sized>(
    sc: &S,
    header: &mut CapHeader,
    data: Option<&mut [CapData]>,
) -> Result<(), Errno> {
    let data_ptr = match data {
        Some(data) => {
            check_room(header.version, data.len())?;
            data.as_mut_ptr()
        }
        None => ptr::null_mut(),
    };
    let header_ptr: *mut CapHeader = header;

    // SAFETY: `header_ptr` comes from a live `&mut CapHeader`, and `data_ptr` is either null or
    // points to at least as many `CapData` as the kernel writes for `header.version`.
    unsafe { sc.r3(libc::SYS_capget, header_ptr as usize, data_ptr as usize, 0) }?;
    Ok(())
}

/// Writes the capability vectors in `data` to the calling process.
pub fn capset<S: Syscaller + ?Sized>(
    sc: &S,
    header: &CapHeader,
    data: &[CapData],
) -> Result<(), Errno> {
    check_room(header.version, data.len())?;

    // The kernel may write its preferred version back into a header it rejects.
    let mut header = *header;
    let header_ptr: *mut CapHeader = &mut header;

    // SAFETY: `header_ptr` points to a local header that outlives the call, and `data` holds at
    // least as many `CapData` as the kernel reads for `header.version`.
    unsafe { sc.w3(libc::SYS_capset, header_ptr as usize, data.as_ptr() as usize, 0) }?;
    Ok(())
}

/// Issues a capability-related `prctl`, routed as a read or a write.
pub fn prctl<S: Syscaller + ?Sized>(sc: &S, op: PrctlOp) -> SysResult {
    // SAFETY: no `PrctlOp` passes an address to the kernel.
    unsafe {
        match (op.lower(), op.is_write()) {
            (Lowered::Three([a1, a2, a3]), false) => sc.r3(libc::SYS_prctl, a1, a2, a3),
            (Lowered::Three([a1, a2, a3]), true) => sc.w3(libc::SYS_prctl, a1, a2, a3),
            (Lowered::Six(args), false) => sc.r6(libc::SYS_prctl, args),
            (Lowered::Six(args), true) => sc.w6(libc::SYS_prctl, args),
        }
    }
}
