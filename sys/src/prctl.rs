// SPDX-License-Identifier: MPL-2.0

//! The `prctl` sub-operations that touch capability state.
//!
//! Reference: <https://elixir.bootlin.com/linux/v6.18.6/source/include/uapi/linux/prctl.h>.

pub const PR_GET_KEEPCAPS: i32 = 7;
pub const PR_SET_KEEPCAPS: i32 = 8;
pub const PR_CAPBSET_READ: i32 = 23;
pub const PR_CAPBSET_DROP: i32 = 24;
pub const PR_CAP_AMBIENT: i32 = 47;

pub const PR_CAP_AMBIENT_IS_SET: usize = 1;
pub const PR_CAP_AMBIENT_RAISE: usize = 2;
pub const PR_CAP_AMBIENT_LOWER: usize = 3;
pub const PR_CAP_AMBIENT_CLEAR_ALL: usize = 4;

/// A capability-related `prctl` request.
///
/// None of these requests pass an address to the kernel, which is what
/// allows [`crate::prctl`] to be a safe function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrctlOp {
    /// Is the bit present in the bounding set?
    CapBsetRead(u32),
    /// Removes the bit from the bounding set.
    CapBsetDrop(u32),
    /// Is the bit raised in the ambient set?
    AmbientIsSet(u32),
    AmbientRaise(u32),
    AmbientLower(u32),
    AmbientClearAll,
    GetKeepCaps,
    SetKeepCaps(bool),
}

/// How a `PrctlOp` is lowered onto the raw syscall interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lowered {
    /// `prctl(option, arg2, arg3)`.
    Three([usize; 3]),
    /// `prctl(option, arg2, arg3, arg4, arg5)`, padded with a trailing zero.
    Six([usize; 6]),
}

impl PrctlOp {
    /// Returns whether the request modifies kernel state.
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::CapBsetDrop(_)
                | Self::AmbientRaise(_)
                | Self::AmbientLower(_)
                | Self::AmbientClearAll
                | Self::SetKeepCaps(_)
        )
    }

    pub(crate) const fn lower(&self) -> Lowered {
        // The ambient API insists that unused arguments are zero, so it needs the wide form.
        match *self {
            Self::CapBsetRead(value) => {
                Lowered::Three([PR_CAPBSET_READ as usize, value as usize, 0])
            }
            Self::CapBsetDrop(value) => {
                Lowered::Three([PR_CAPBSET_DROP as usize, value as usize, 0])
            }
            Self::AmbientIsSet(value) => Lowered::Six([
                PR_CAP_AMBIENT as usize,
                PR_CAP_AMBIENT_IS_SET,
                value as usize,
                0,
                0,
                0,
            ]),
            Self::AmbientRaise(value) => Lowered::Six([
                PR_CAP_AMBIENT as usize,
                PR_CAP_AMBIENT_RAISE,
                value as usize,
                0,
                0,
                0,
            ]),
            Self::AmbientLower(value) => Lowered::Six([
                PR_CAP_AMBIENT as usize,
                PR_CAP_AMBIENT_LOWER,
                value as usize,
                0,
                0,
                0,
            ]),
            Self::AmbientClearAll => Lowered::Six([
                PR_CAP_AMBIENT as usize,
                PR_CAP_AMBIENT_CLEAR_ALL,
                0,
                0,
                0,
                0,
            ]),
            Self::GetKeepCaps => Lowered::Three([PR_GET_KEEPCAPS as usize, 0, 0]),
            Self::SetKeepCaps(keep) => Lowered::Three([PR_SET_KEEPCAPS as usize, keep as usize, 0]),
        }
    }
}
