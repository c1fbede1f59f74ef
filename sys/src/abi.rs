// SPDX-License-Identifier: MPL-2.0

//! The binary layout of the capability syscalls.
//!
//! Reference: <https://elixir.bootlin.com/linux/v6.18.6/source/include/uapi/linux/capability.h#L40>.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// First iteration of process capabilities (32 bits).
pub const LINUX_CAPABILITY_VERSION_1: u32 = 0x19980330;
/// First iteration of process and file capabilities (64 bits). Deprecated.
pub const LINUX_CAPABILITY_VERSION_2: u32 = 0x20071026;
/// The most recently supported process and file capabilities (64 bits).
pub const LINUX_CAPABILITY_VERSION_3: u32 = 0x20080522;

/// The newest version this crate knows how to speak.
pub const LINUX_CAPABILITY_VERSION_LATEST: u32 = LINUX_CAPABILITY_VERSION_3;

/// Number of bits held by one `CapData` vector.
pub const BITS_PER_WORD: u32 = u32::BITS;

/// `struct __user_cap_header_struct` in Linux.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct CapHeader {
    pub version: u32,
    pub pid: i32,
}

impl CapHeader {
    pub const fn new(version: u32, pid: i32) -> Self {
        Self { version, pid }
    }
}

/// `struct __user_cap_data_struct` in Linux.
///
/// One `CapData` holds 32 bits of each of the three vectors. The kernel expects
/// as many of them as the header version asks for, laid out contiguously.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct CapData {
    pub effective: u32,
    pub permitted: u32,
    pub inheritable: u32,
}

impl CapData {
    pub const fn is_empty(&self) -> bool {
        self.effective == 0 && self.permitted == 0 && self.inheritable == 0
    }
}

/// Returns the number of `CapData` words that the kernel reads or writes
/// for the given header version, or `None` if the version is unknown.
pub const fn words_for_version(version: u32) -> Option<usize> {
    match version {
        LINUX_CAPABILITY_VERSION_1 => Some(1),
        LINUX_CAPABILITY_VERSION_2 | LINUX_CAPABILITY_VERSION_3 => Some(2),
        _ => None,
    }
}
