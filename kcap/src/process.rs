// SPDX-License-Identifier: MPL-2.0

//! Reading and committing the capabilities of a process.

use kcap_sys::{
    abi::{CapData, CapHeader},
    capget, capset, prctl,
};

use crate::{
    abi::{KernelAbi, kernel_abi},
    gate::privilege_writer,
    prelude::*,
    set::CapSet,
    syscaller::syscaller,
};

/// Reads the capabilities of the process `pid`. Zero means the calling process.
pub fn get_pid(pid: i32) -> Result<CapSet> {
    get_pid_with(syscaller(), pid)
}

pub fn get_pid_with<S: Syscaller + ?Sized>(sc: &S, pid: i32) -> Result<CapSet> {
    read_set(sc, kernel_abi(), pid)
}

/// Reads the capabilities of the calling process.
///
/// # Panics
///
/// Panics if the kernel refuses, which it never does for the calling process on a
/// working system. Use [`get_pid`] with zero to handle the error instead.
pub fn get_proc() -> CapSet {
    match get_pid(0) {
        Ok(set) => set,
        Err(err) => panic!("cannot read the capabilities of this process: {}", err),
    }
}

fn read_set<S: Syscaller + ?Sized>(sc: &S, abi: &KernelAbi, pid: i32) -> Result<CapSet> {
    let mut header = CapHeader::new(abi.magic, pid);
    let mut data = vec![CapData::default(); abi.words];
    capget(sc, &mut header, Some(&mut data))?;

    let set = CapSet::for_abi(abi);
    set.load(&data);
    Ok(set)
}

impl CapSet {
    /// Makes this set the capabilities of the calling process.
    ///
    /// The kernel checks that the new state is reachable from the current one and
    /// rejects the whole set otherwise. The set itself is left untouched either way.
    pub fn set_proc(&self) -> Result<()> {
        self.set_proc_with(syscaller())
    }

    /// Like [`CapSet::set_proc`], but issues the write through `sc`.
    pub fn set_proc_with<S: Syscaller + ?Sized>(&self, sc: &S) -> Result<()> {
        self.commit(sc, kernel_abi())
    }

    fn commit<S: Syscaller + ?Sized>(&self, sc: &S, abi: &KernelAbi) -> Result<()> {
        let data = self.snapshot();
        if data.is_empty() {
            return_errno_with_message!(ErrorKind::BadSet, "cannot commit an empty set");
        }
        if data.len() != abi.words {
            return_errno_with_message!(ErrorKind::BadSet, "the set does not fit the kernel");
        }

        let header = CapHeader::new(abi.magic, 0);
        let _guard = privilege_writer();
        debug!("[{}] committing {:?}", sc.name(), self);
        capset(sc, &header, &data)?;
        Ok(())
    }
}

/// Returns whether the process keeps its permitted capabilities when all of its
/// UIDs change away from zero.
pub fn keep_caps() -> Result<bool> {
    keep_caps_with(syscaller())
}

pub fn keep_caps_with<S: Syscaller + ?Sized>(sc: &S) -> Result<bool> {
    Ok(prctl(sc, PrctlOp::GetKeepCaps)? != 0)
}

/// Sets the keep-caps flag. The kernel clears it again on `execve`.
pub fn set_keep_caps(keep: bool) -> Result<()> {
    set_keep_caps_with(syscaller(), keep)
}

pub fn set_keep_caps_with<S: Syscaller + ?Sized>(sc: &S, keep: bool) -> Result<()> {
    let _guard = privilege_writer();
    prctl(sc, PrctlOp::SetKeepCaps(keep))?;
    Ok(())
}
