// SPDX-License-Identifier: MPL-2.0

//! Detection of the capability ABI of the running kernel.

use kcap_sys::{
    abi::{BITS_PER_WORD, CapHeader, LINUX_CAPABILITY_VERSION_LATEST, words_for_version},
    capget, prctl,
};
use spin::Once;

use crate::{prelude::*, syscaller::syscaller, value::NAMED_COUNT};

/// The capability ABI spoken by the running kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelAbi {
    /// The header version used for `capget` and `capset`.
    pub magic: u32,
    /// The number of `CapData` words per set.
    pub words: usize,
    /// The number of capabilities the kernel recognizes.
    pub max_bits: u32,
}

static ABI: Once<KernelAbi> = Once::new();

/// Returns the ABI of the running kernel, detecting it on first use.
pub fn kernel_abi() -> &'static KernelAbi {
    ABI.call_once(|| {
        let abi = detect(syscaller());
        info!(
            "kernel capability ABI: magic {:#x}, {} word(s), {} capabilities",
            abi.magic, abi.words, abi.max_bits
        );
        abi
    })
}

/// Probes the kernel behind `sc` for its capability ABI.
///
/// Only read syscalls are issued.
pub fn detect<S: Syscaller + ?Sized>(sc: &S) -> KernelAbi {
    // Asking with the newest version makes the kernel write back the one it prefers.
    let mut header = CapHeader::new(LINUX_CAPABILITY_VERSION_LATEST, 0);
    if let Err(errno) = capget(sc, &mut header, None) {
        trace!("capability version probe failed: {}", errno);
    }

    let (magic, words) = match words_for_version(header.version) {
        Some(words) => (header.version, words),
        None => {
            warn!(
                "unknown capability version {:#x}, assuming {:#x}",
                header.version, LINUX_CAPABILITY_VERSION_LATEST
            );
            let words = words_for_version(LINUX_CAPABILITY_VERSION_LATEST).unwrap_or(2);
            (LINUX_CAPABILITY_VERSION_LATEST, words)
        }
    };

    KernelAbi {
        magic,
        words,
        max_bits: probe_max_bits(sc, words),
    }
}

/// Finds the first value that the bounding set refuses to answer for.
///
/// The kernel rejects values it does not know with `EINVAL`, so the answers form a run of
/// successes followed by a run of failures, which is what makes a binary search possible.
fn probe_max_bits<S: Syscaller + ?Sized>(sc: &S, words: usize) -> u32 {
    let (mut lo, mut hi) = (0, words as u32 * BITS_PER_WORD);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if prctl(sc, PrctlOp::CapBsetRead(mid)).is_err() {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    if lo == 0 {
        warn!("bounding set is not available, assuming {} capabilities", NAMED_COUNT);
        return NAMED_COUNT;
    }
    lo
}

#[cfg(test)]
mod test {
    use kcap_sys::{
        abi::{LINUX_CAPABILITY_VERSION_1, LINUX_CAPABILITY_VERSION_3},
        fake::{FakeKernel, FakeState},
    };

    use super::*;

    #[test]
    fn detects_current_kernels() {
        let kernel = FakeKernel::new(FakeState {
            max_bits: 38,
            ..FakeState::default()
        });
        assert_eq!(
            detect(&kernel),
            KernelAbi {
                magic: LINUX_CAPABILITY_VERSION_3,
                words: 2,
                max_bits: 38,
            }
        );
        assert!(kernel.writes().is_empty());
    }

    #[test]
    fn detects_single_word_kernels() {
        let kernel = FakeKernel::new(FakeState {
            preferred_version: LINUX_CAPABILITY_VERSION_1,
            known_versions: vec![LINUX_CAPABILITY_VERSION_1],
            max_bits: 31,
            ..FakeState::default()
        });
        assert_eq!(
            detect(&kernel),
            KernelAbi {
                magic: LINUX_CAPABILITY_VERSION_1,
                words: 1,
                max_bits: 31,
            }
        );
    }

    #[test]
    fn unknown_magic_falls_back_to_newest() {
        let kernel = FakeKernel::new(FakeState {
            preferred_version: 0x2099_0101,
            known_versions: vec![0x2099_0101],
            ..FakeState::default()
        });
        let abi = detect(&kernel);
        assert_eq!(abi.magic, LINUX_CAPABILITY_VERSION_3);
        assert_eq!(abi.words, 2);
        assert_eq!(abi.max_bits, 41);
    }

    #[test]
    fn missing_bounding_set_uses_named_count() {
        let kernel = FakeKernel::new(FakeState {
            bounding_supported: false,
            ..FakeState::default()
        });
        assert_eq!(detect(&kernel).max_bits, NAMED_COUNT);
    }

    #[test]
    fn max_bits_is_capped_by_the_words() {
        let kernel = FakeKernel::new(FakeState {
            max_bits: 80,
            ..FakeState::default()
        });
        assert_eq!(detect(&kernel).max_bits, 64);
    }

    #[test]
    fn cached_abi_matches_a_fresh_probe() {
        assert_eq!(*kernel_abi(), detect(&kcap_sys::SingleThread));
    }
}
