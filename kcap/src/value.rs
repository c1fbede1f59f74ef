// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use int_to_c_enum::TryFromInt;

use crate::abi::kernel_abi;

/// The number of capabilities with a name when this crate was built.
///
/// The last one is `CAP_CHECKPOINT_RESTORE` (40). This is only used when the running
/// kernel cannot tell how many capabilities it knows.
pub const NAMED_COUNT: u32 = 41;

/// One capability bit, such as `CAP_NET_RAW` (13).
///
/// A `Value` is not checked against the running kernel when it is created. The kernel
/// is the authority on which values exist, and rejects the ones it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Value(u32);

impl Value {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for Value {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the three capability vectors held by a [`CapSet`](crate::CapSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromInt)]
#[repr(u8)]
pub enum Flag {
    /// The capabilities the kernel checks right now.
    Effective = 0,
    /// The ceiling that `Effective` may be raised to.
    Permitted = 1,
    /// The capabilities that may be kept across `execve`.
    Inheritable = 2,
}

impl Flag {
    pub const ALL: [Flag; 3] = [Flag::Effective, Flag::Permitted, Flag::Inheritable];
}

/// Returns the number of capabilities the running kernel recognizes.
///
/// Valid values are `0..max_bits()`.
pub fn max_bits() -> u32 {
    kernel_abi().max_bits
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_round_trip_through_their_index() {
        for flag in Flag::ALL {
            assert_eq!(Flag::try_from(flag as u8).unwrap(), flag);
        }
        assert!(Flag::try_from(3).is_err());
    }

    #[test]
    fn kernel_knows_at_least_the_early_capabilities() {
        // CAP_SETFCAP (31) has existed since Linux 2.6.24.
        assert!(max_bits() >= 32);
    }
}
