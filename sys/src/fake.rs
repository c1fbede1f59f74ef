// SPDX-License-Identifier: MPL-2.0

//! An in-memory kernel for tests.
//!
//! [`FakeKernel`] emulates the capability state of a single process and follows the
//! permission rules of `kernel/capability.c` and `security/commoncap.c` closely enough for
//! callers to test their logic without privileges and without touching the real process.

use core::{
    slice,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use std::thread;

use libc::c_long;
use nix::errno::Errno;
use spin::{Mutex, MutexGuard};

use crate::{
    abi::{
        BITS_PER_WORD, CapData, CapHeader, LINUX_CAPABILITY_VERSION_1, LINUX_CAPABILITY_VERSION_2,
        LINUX_CAPABILITY_VERSION_3, words_for_version,
    },
    prctl::{
        PR_CAP_AMBIENT, PR_CAP_AMBIENT_CLEAR_ALL, PR_CAP_AMBIENT_IS_SET, PR_CAP_AMBIENT_LOWER,
        PR_CAP_AMBIENT_RAISE, PR_CAPBSET_DROP, PR_CAPBSET_READ, PR_GET_KEEPCAPS, PR_SET_KEEPCAPS,
        PrctlOp,
    },
    syscaller::{SysResult, Syscaller},
};

/// The process ID that the fake kernel considers to be "the calling process".
pub const FAKE_PID: i32 = 4242;

/// `CAP_SETPCAP`, which gates dropping bounding-set bits.
const CAP_SETPCAP: u32 = 8;

/// The capability state held by a [`FakeKernel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeState {
    /// The version written back to callers that ask for an unknown one.
    pub preferred_version: u32,
    /// The versions the kernel accepts.
    pub known_versions: Vec<u32>,
    /// The number of capability bits the kernel recognizes.
    pub max_bits: u32,
    pub effective: u64,
    pub permitted: u64,
    pub inheritable: u64,
    pub bounding: u64,
    pub ambient: u64,
    pub keep_caps: bool,
    pub bounding_supported: bool,
    pub ambient_supported: bool,
    /// Makes `PR_CAP_AMBIENT_CLEAR_ALL` fail with `EPERM`.
    pub ambient_clear_locked: bool,
}

impl FakeState {
    fn valid_mask(&self) -> u64 {
        if self.max_bits >= u64::BITS {
            u64::MAX
        } else {
            (1u64 << self.max_bits) - 1
        }
    }

    fn check_value(&self, value: usize) -> Result<u64, Errno> {
        if value >= self.max_bits as usize || value >= u64::BITS as usize {
            return Err(Errno::EINVAL);
        }
        Ok(1u64 << value)
    }
}

impl Default for FakeState {
    fn default() -> Self {
        let mut state = Self {
            preferred_version: LINUX_CAPABILITY_VERSION_3,
            known_versions: vec![
                LINUX_CAPABILITY_VERSION_1,
                LINUX_CAPABILITY_VERSION_2,
                LINUX_CAPABILITY_VERSION_3,
            ],
            max_bits: 41,
            effective: 0,
            permitted: 0,
            inheritable: 0,
            bounding: 0,
            ambient: 0,
            keep_caps: false,
            bounding_supported: true,
            ambient_supported: true,
            ambient_clear_locked: false,
        };
        state.bounding = state.valid_mask();
        state
    }
}

/// A write request observed by a [`FakeKernel`], whether or not it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Capset { version: u32, data: Vec<CapData> },
    Prctl(PrctlOp),
}

/// A `Syscaller` backed by an in-memory capability state.
#[derive(Debug, Default)]
pub struct FakeKernel {
    state: Mutex<FakeState>,
    writes: Mutex<Vec<FakeCall>>,
    /// How long each write stays in flight before it is applied.
    write_delay: Duration,
    in_flight: AtomicUsize,
    peak_writers: AtomicUsize,
}

/// Marks one write as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FakeKernel {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Makes every write wait for `delay` before it is applied, which widens the window in
    /// which overlapping writers can be observed.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Returns the largest number of writes that were ever in flight at once.
    pub fn peak_writers(&self) -> usize {
        self.peak_writers.load(Ordering::Acquire)
    }

    fn begin_write(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_writers.fetch_max(now, Ordering::AcqRel);
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        InFlight(&self.in_flight)
    }

    /// Creates a kernel whose process holds `bits` in all three vectors.
    pub fn with_caps(bits: u64) -> Self {
        Self::new(FakeState {
            effective: bits,
            permitted: bits,
            inheritable: bits,
            ..FakeState::default()
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock()
    }

    /// Returns the write requests seen so far, in order.
    pub fn writes(&self) -> Vec<FakeCall> {
        self.writes.lock().clone()
    }

    /// # Safety
    ///
    /// `header` and `data` must be valid as documented by `capget(2)`.
    unsafe fn capget(&self, header: usize, data: usize) -> SysResult {
        // SAFETY: upheld by the caller.
        let header = unsafe { &mut *(header as *mut CapHeader) };
        let state = self.state.lock();

        let Some(words) = state
            .known_versions
            .contains(&header.version)
            .then(|| words_for_version(header.version))
            .flatten()
        else {
            header.version = state.preferred_version;
            return if data == 0 { Ok(0) } else { Err(Errno::EINVAL) };
        };
        if data == 0 {
            return Ok(0);
        }
        if header.pid < 0 {
            return Err(Errno::EINVAL);
        }
        if header.pid != 0 && header.pid != FAKE_PID {
            return Err(Errno::ESRCH);
        }

        // SAFETY: upheld by the caller.
        let data = unsafe { slice::from_raw_parts_mut(data as *mut CapData, words) };
        for (i, word) in data.iter_mut().enumerate() {
            let shift = i as u32 * BITS_PER_WORD;
            *word = CapData {
                effective: (state.effective >> shift) as u32,
                permitted: (state.permitted >> shift) as u32,
                inheritable: (state.inheritable >> shift) as u32,
            };
        }
        Ok(0)
    }

    /// # Safety
    ///
    /// `header` and `data` must be valid as documented by `capset(2)`.
    unsafe fn capset(&self, header: usize, data: usize) -> SysResult {
        // SAFETY: upheld by the caller.
        let header = unsafe { &mut *(header as *mut CapHeader) };
        let mut state = self.state.lock();

        let words = state
            .known_versions
            .contains(&header.version)
            .then(|| words_for_version(header.version))
            .flatten();
        let data = match words {
            // SAFETY: upheld by the caller.
            Some(words) => unsafe { slice::from_raw_parts(data as *const CapData, words) },
            None => {
                self.writes.lock().push(FakeCall::Capset {
                    version: header.version,
                    data: Vec::new(),
                });
                header.version = state.preferred_version;
                return Err(Errno::EINVAL);
            }
        };
        self.writes.lock().push(FakeCall::Capset {
            version: header.version,
            data: data.to_vec(),
        });

        if header.pid != 0 && header.pid != FAKE_PID {
            return Err(Errno::EPERM);
        }

        let join = |pick: fn(&CapData) -> u32| {
            data.iter().enumerate().fold(0u64, |acc, (i, word)| {
                acc | (u64::from(pick(word)) << (i as u32 * BITS_PER_WORD))
            })
        };
        let mask = state.valid_mask();
        let effective = join(|word| word.effective) & mask;
        let permitted = join(|word| word.permitted) & mask;
        let inheritable = join(|word| word.inheritable) & mask;

        let setpcap = state.effective & (1 << CAP_SETPCAP) != 0;
        let inheritable_ceiling = if setpcap {
            state.inheritable | state.bounding
        } else {
            state.inheritable | state.permitted
        };
        if inheritable & !inheritable_ceiling != 0
            || inheritable & !(state.inheritable | state.bounding) != 0
            || permitted & !state.permitted != 0
            || effective & !permitted != 0
        {
            return Err(Errno::EPERM);
        }

        state.effective = effective;
        state.permitted = permitted;
        state.inheritable = inheritable;
        state.ambient &= permitted & inheritable;
        Ok(0)
    }

    fn prctl(&self, args: [usize; 6], is_write: bool) -> SysResult {
        let op = decode_prctl(args)?;
        if is_write {
            self.writes.lock().push(FakeCall::Prctl(op));
        }
        let mut state = self.state.lock();

        match op {
            PrctlOp::CapBsetRead(value) => {
                if !state.bounding_supported {
                    return Err(Errno::EINVAL);
                }
                let bit = state.check_value(value as usize)?;
                Ok((state.bounding & bit != 0) as usize)
            }
            PrctlOp::CapBsetDrop(value) => {
                if !state.bounding_supported {
                    return Err(Errno::EINVAL);
                }
                if state.effective & (1 << CAP_SETPCAP) == 0 {
                    return Err(Errno::EPERM);
                }
                let bit = state.check_value(value as usize)?;
                state.bounding &= !bit;
                Ok(0)
            }
            PrctlOp::AmbientIsSet(value) => {
                if !state.ambient_supported {
                    return Err(Errno::EINVAL);
                }
                let bit = state.check_value(value as usize)?;
                Ok((state.ambient & bit != 0) as usize)
            }
            PrctlOp::AmbientRaise(value) => {
                if !state.ambient_supported {
                    return Err(Errno::EINVAL);
                }
                let bit = state.check_value(value as usize)?;
                if state.permitted & state.inheritable & bit == 0 {
                    return Err(Errno::EPERM);
                }
                state.ambient |= bit;
                Ok(0)
            }
            PrctlOp::AmbientLower(value) => {
                if !state.ambient_supported {
                    return Err(Errno::EINVAL);
                }
                let bit = state.check_value(value as usize)?;
                state.ambient &= !bit;
                Ok(0)
            }
            PrctlOp::AmbientClearAll => {
                if !state.ambient_supported {
                    return Err(Errno::EINVAL);
                }
                if state.ambient_clear_locked {
                    return Err(Errno::EPERM);
                }
                state.ambient = 0;
                Ok(0)
            }
            PrctlOp::GetKeepCaps => Ok(state.keep_caps as usize),
            PrctlOp::SetKeepCaps(keep) => {
                state.keep_caps = keep;
                Ok(0)
            }
        }
    }

    /// # Safety
    ///
    /// The arguments must be valid for the syscall `nr`.
    unsafe fn dispatch(&self, nr: c_long, args: [usize; 6], is_write: bool) -> SysResult {
        match (nr, is_write) {
            // SAFETY: upheld by the caller.
            (libc::SYS_capget, false) => unsafe { self.capget(args[0], args[1]) },
            // SAFETY: upheld by the caller.
            (libc::SYS_capset, true) => unsafe { self.capset(args[0], args[1]) },
            (libc::SYS_prctl, _) => self.prctl(args, is_write),
            _ => Err(Errno::ENOSYS),
        }
    }
}

/// Turns raw `prctl` arguments back into the request they encode.
fn decode_prctl(args: [usize; 6]) -> Result<PrctlOp, Errno> {
    let value = || u32::try_from(args[2]).map_err(|_| Errno::EINVAL);
    let bit = || u32::try_from(args[1]).map_err(|_| Errno::EINVAL);

    let op = match i32::try_from(args[0]).map_err(|_| Errno::EINVAL)? {
        PR_CAPBSET_READ => PrctlOp::CapBsetRead(bit()?),
        PR_CAPBSET_DROP => PrctlOp::CapBsetDrop(bit()?),
        PR_GET_KEEPCAPS => PrctlOp::GetKeepCaps,
        PR_SET_KEEPCAPS => match args[1] {
            0 => PrctlOp::SetKeepCaps(false),
            1 => PrctlOp::SetKeepCaps(true),
            _ => return Err(Errno::EINVAL),
        },
        PR_CAP_AMBIENT => {
            if args[3] != 0 || args[4] != 0 {
                return Err(Errno::EINVAL);
            }
            match args[1] {
                PR_CAP_AMBIENT_IS_SET => PrctlOp::AmbientIsSet(value()?),
                PR_CAP_AMBIENT_RAISE => PrctlOp::AmbientRaise(value()?),
                PR_CAP_AMBIENT_LOWER => PrctlOp::AmbientLower(value()?),
                PR_CAP_AMBIENT_CLEAR_ALL if args[2] == 0 => PrctlOp::AmbientClearAll,
                _ => return Err(Errno::EINVAL),
            }
        }
        _ => return Err(Errno::EINVAL),
    };
    Ok(op)
}

impl Syscaller for FakeKernel {
    fn name(&self) -> &'static str {
        "fake"
    }

    unsafe fn r3(&self, nr: c_long, a1: usize, a2: usize, a3: usize) -> SysResult {
        // SAFETY: upheld by the caller.
        unsafe { self.dispatch(nr, [a1, a2, a3, 0, 0, 0], false) }
    }

    unsafe fn w3(&self, nr: c_long, a1: usize, a2: usize, a3: usize) -> SysResult {
        let _write = self.begin_write();
        // SAFETY: upheld by the caller.
        unsafe { self.dispatch(nr, [a1, a2, a3, 0, 0, 0], true) }
    }

    unsafe fn r6(&self, nr: c_long, args: [usize; 6]) -> SysResult {
        // SAFETY: upheld by the caller.
        unsafe { self.dispatch(nr, args, false) }
    }

    unsafe fn w6(&self, nr: c_long, args: [usize; 6]) -> SysResult {
        let _write = self.begin_write();
        // SAFETY: upheld by the caller.
        unsafe { self.dispatch(nr, args, true) }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Barrier;

    use super::*;
    use crate::syscaller::{capget, capset, prctl};

    #[test]
    fn negotiates_preferred_version() {
        let kernel = FakeKernel::new(FakeState {
            preferred_version: LINUX_CAPABILITY_VERSION_1,
            known_versions: vec![LINUX_CAPABILITY_VERSION_1],
            ..FakeState::default()
        });
        let mut header = CapHeader::new(LINUX_CAPABILITY_VERSION_3, 0);
        capget(&kernel, &mut header, None).unwrap();
        assert_eq!(header.version, LINUX_CAPABILITY_VERSION_1);
    }

    #[test]
    fn capset_cannot_raise_permitted() {
        let kernel = FakeKernel::default();
        let header = CapHeader::new(LINUX_CAPABILITY_VERSION_3, 0);
        let data = [
            CapData {
                effective: 1,
                permitted: 1,
                inheritable: 0,
            },
            CapData::default(),
        ];
        assert_eq!(capset(&kernel, &header, &data), Err(Errno::EPERM));
        assert_eq!(kernel.state().permitted, 0);
        assert_eq!(kernel.writes().len(), 1);
    }

    #[test]
    fn capset_lowers_ambient() {
        let kernel = FakeKernel::with_caps(0b110);
        kernel.state().ambient = 0b110;

        let header = CapHeader::new(LINUX_CAPABILITY_VERSION_3, 0);
        let data = [
            CapData {
                effective: 0b010,
                permitted: 0b010,
                inheritable: 0b110,
            },
            CapData::default(),
        ];
        capset(&kernel, &header, &data).unwrap();
        assert_eq!(kernel.state().ambient, 0b010);
    }

    #[test]
    fn bounding_drop_needs_setpcap() {
        let kernel = FakeKernel::default();
        assert_eq!(prctl(&kernel, PrctlOp::CapBsetDrop(3)), Err(Errno::EPERM));

        let kernel = FakeKernel::with_caps(1 << CAP_SETPCAP);
        prctl(&kernel, PrctlOp::CapBsetDrop(3)).unwrap();
        assert_eq!(prctl(&kernel, PrctlOp::CapBsetRead(3)), Ok(0));
        assert_eq!(prctl(&kernel, PrctlOp::CapBsetRead(4)), Ok(1));
        assert_eq!(prctl(&kernel, PrctlOp::CapBsetRead(41)), Err(Errno::EINVAL));
    }

    #[test]
    fn ambient_needs_permitted_and_inheritable() {
        let kernel = FakeKernel::new(FakeState {
            permitted: 0b01,
            inheritable: 0b11,
            ..FakeState::default()
        });
        prctl(&kernel, PrctlOp::AmbientRaise(0)).unwrap();
        assert_eq!(prctl(&kernel, PrctlOp::AmbientRaise(1)), Err(Errno::EPERM));
        assert_eq!(prctl(&kernel, PrctlOp::AmbientIsSet(0)), Ok(1));
        assert_eq!(kernel.writes().len(), 2);
    }

    #[test]
    fn values_past_the_word_are_unknown() {
        let kernel = FakeKernel::new(FakeState {
            max_bits: 80,
            ..FakeState::default()
        });
        assert_eq!(prctl(&kernel, PrctlOp::CapBsetRead(63)), Ok(1));
        assert_eq!(prctl(&kernel, PrctlOp::CapBsetRead(64)), Err(Errno::EINVAL));
        assert_eq!(
            prctl(&kernel, PrctlOp::AmbientIsSet(70)),
            Err(Errno::EINVAL)
        );
    }

    #[test]
    fn counts_overlapping_writes() {
        let delay = Duration::from_millis(20);
        let kernel = FakeKernel::default().with_write_delay(delay);
        let start = Barrier::new(2);
        thread::scope(|s| {
            for keep in [true, false] {
                let (kernel, start) = (&kernel, &start);
                s.spawn(move || {
                    start.wait();
                    prctl(kernel, PrctlOp::SetKeepCaps(keep)).unwrap();
                });
            }
        });
        assert_eq!(kernel.peak_writers(), 2);

        prctl(&kernel, PrctlOp::GetKeepCaps).unwrap();
        assert_eq!(kernel.writes().len(), 2);
    }
}
