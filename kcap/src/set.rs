// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use bitflags::bitflags;
use kcap_sys::abi::{BITS_PER_WORD, CapData};
use spin::RwLock;

use crate::{
    abi::{KernelAbi, kernel_abi},
    dup::Dup,
    prelude::*,
};

/// The Effective, Permitted and Inheritable vectors of one process.
///
/// A `CapSet` is a plain in-memory value. Changing it issues no syscall; the change reaches
/// the kernel only through [`CapSet::set_proc`]. The set is internally synchronized, so every
/// method takes `&self` and a set may be shared between threads.
///
/// Bit accessors panic on a value outside `0..max_bits()` and on the empty set returned by
/// `CapSet::default()`, which has no words at all.
pub struct CapSet {
    inner: RwLock<Inner>,
    max_bits: u32,
}

struct Inner {
    /// One element per ABI word, each holding 32 bits of all three vectors.
    flat: Vec<CapData>,
    /// The UID of the root of the owning user namespace.
    ns_root: u32,
}

bitflags! {
    /// The vectors in which two sets differ.
    pub struct Diff: u8 {
        const EFFECTIVE = 1 << Flag::Effective as u8;
        const PERMITTED = 1 << Flag::Permitted as u8;
        const INHERITABLE = 1 << Flag::Inheritable as u8;
    }
}

impl Diff {
    pub const fn of(flag: Flag) -> Self {
        Self::from_bits_truncate(1 << flag as u8)
    }

    /// Iterates over the vectors that differ.
    pub fn flags(self) -> impl Iterator<Item = Flag> {
        (0..Flag::ALL.len() as u8)
            .filter(move |index| self.bits() & (1 << index) != 0)
            .filter_map(|index| Flag::try_from(index).ok())
    }
}

fn word(data: &CapData, flag: Flag) -> u32 {
    match flag {
        Flag::Effective => data.effective,
        Flag::Permitted => data.permitted,
        Flag::Inheritable => data.inheritable,
    }
}

fn word_mut(data: &mut CapData, flag: Flag) -> &mut u32 {
    match flag {
        Flag::Effective => &mut data.effective,
        Flag::Permitted => &mut data.permitted,
        Flag::Inheritable => &mut data.inheritable,
    }
}

/// Joins the words of one vector into a single integer.
fn vector(flat: &[CapData], flag: Flag) -> u64 {
    flat.iter().take(2).enumerate().fold(0, |acc, (i, data)| {
        acc | (u64::from(word(data, flag)) << (i as u32 * BITS_PER_WORD))
    })
}

impl CapSet {
    /// Creates a set with every bit clear, sized for the running kernel.
    pub fn new() -> Self {
        Self::for_abi(kernel_abi())
    }

    pub(crate) fn for_abi(abi: &KernelAbi) -> Self {
        Self {
            inner: RwLock::new(Inner {
                flat: vec![CapData::default(); abi.words],
                ns_root: 0,
            }),
            max_bits: abi.max_bits,
        }
    }

    /// Returns the number of ABI words in the set. Zero for the empty set.
    pub fn words(&self) -> usize {
        self.inner.read().flat.len()
    }

    /// Locates the word and the mask of `value`.
    fn bit_of(&self, flat: &[CapData], value: Value) -> (usize, u32) {
        assert!(!flat.is_empty(), "capability set has no words");
        let raw = value.as_u32();
        assert!(
            raw < self.max_bits,
            "capability {} is out of range (0..{})",
            raw,
            self.max_bits
        );
        ((raw / BITS_PER_WORD) as usize, 1 << (raw % BITS_PER_WORD))
    }

    /// Returns whether `value` is raised in the `flag` vector.
    pub fn get_flag(&self, flag: Flag, value: Value) -> bool {
        let inner = self.inner.read();
        let (offset, mask) = self.bit_of(&inner.flat, value);
        word(&inner.flat[offset], flag) & mask != 0
    }

    /// Raises or lowers each of `values` in the `flag` vector.
    ///
    /// Other threads see either none or all of the changes. Every value is checked before
    /// the first one is applied, so a panic leaves the set as it was.
    pub fn set_flag(&self, flag: Flag, enable: bool, values: &[Value]) {
        let mut inner = self.inner.write();
        let bits: Vec<(usize, u32)> = values
            .iter()
            .map(|&value| self.bit_of(&inner.flat, value))
            .collect();
        for (offset, mask) in bits {
            let word = word_mut(&mut inner.flat[offset], flag);
            if enable {
                *word |= mask;
            } else {
                *word &= !mask;
            }
        }
    }

    /// Lowers every bit of every vector.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        assert!(!inner.flat.is_empty(), "capability set has no words");
        inner.flat.fill(CapData::default());
    }

    /// Lowers every bit of the `flag` vector.
    pub fn clear_flag(&self, flag: Flag) {
        let mut inner = self.inner.write();
        assert!(!inner.flat.is_empty(), "capability set has no words");
        for data in inner.flat.iter_mut() {
            *word_mut(data, flag) = 0;
        }
    }

    /// Copies the `from` vector onto the `to` vector.
    pub fn fill(&self, to: Flag, from: Flag) {
        let mut inner = self.inner.write();
        assert!(!inner.flat.is_empty(), "capability set has no words");
        for data in inner.flat.iter_mut() {
            *word_mut(data, to) = word(data, from);
        }
    }

    /// Returns the vectors in which `self` and `other` differ.
    pub fn compare(&self, other: &CapSet) -> Result<Diff> {
        let ours = self.snapshot();
        let theirs = other.snapshot();
        if ours.is_empty() || theirs.is_empty() {
            return_errno_with_message!(ErrorKind::BadSet, "cannot compare an empty set");
        }
        if ours.len() != theirs.len() {
            return_errno_with_message!(ErrorKind::BadSet, "sets have different sizes");
        }

        let mut diff = Diff::empty();
        for flag in Flag::ALL {
            if ours
                .iter()
                .zip(&theirs)
                .any(|(a, b)| word(a, flag) != word(b, flag))
            {
                diff |= Diff::of(flag);
            }
        }
        Ok(diff)
    }

    /// Returns the UID of the root of the user namespace the set belongs to.
    pub fn ns_owner(&self) -> u32 {
        self.inner.read().ns_root
    }

    pub fn set_ns_owner(&self, uid: u32) {
        self.inner.write().ns_root = uid;
    }

    /// Copies the words out so no lock is held while the kernel is called.
    pub(crate) fn snapshot(&self) -> Vec<CapData> {
        self.inner.read().flat.clone()
    }

    pub(crate) fn load(&self, data: &[CapData]) {
        let mut inner = self.inner.write();
        inner.flat.clear();
        inner.flat.extend_from_slice(data);
    }
}

impl Default for CapSet {
    /// Returns the empty set, which has no words and is rejected by every checked operation.
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                flat: Vec::new(),
                ns_root: 0,
            }),
            max_bits: 0,
        }
    }
}

impl Dup for CapSet {
    fn dup(&self) -> Result<Self> {
        let inner = self.inner.read();
        if inner.flat.is_empty() {
            return_errno_with_message!(ErrorKind::BadSet, "cannot duplicate an empty set");
        }
        Ok(Self {
            inner: RwLock::new(Inner {
                flat: inner.flat.clone(),
                ns_root: inner.ns_root,
            }),
            max_bits: self.max_bits,
        })
    }
}

impl fmt::Debug for CapSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let hex = |flag| format!("{:#x}", vector(&inner.flat, flag));
        f.debug_struct("CapSet")
            .field("effective", &format_args!("{}", hex(Flag::Effective)))
            .field("permitted", &format_args!("{}", hex(Flag::Permitted)))
            .field("inheritable", &format_args!("{}", hex(Flag::Inheritable)))
            .field("words", &inner.flat.len())
            .field("ns_root", &inner.ns_root)
            .finish()
    }
}
