// SPDX-License-Identifier: MPL-2.0

//! Replaying a write syscall on every OS thread of the process.
//!
//! Linux keeps capabilities per thread, but a POSIX process has one privilege state.
//! A write is first issued on the calling thread. Only if the kernel accepts it there is
//! the request published in [`MAILBOX`] and every other thread interrupted with a
//! real-time signal, whose handler issues the very same syscall. The caller waits until
//! every thread it signalled has run the request, then looks for threads that were
//! spawned in the meantime, until a scan of `/proc/self/task` turns up nobody new.

use core::{
    mem, ptr,
    sync::atomic::{AtomicBool, AtomicI32, AtomicIsize, AtomicUsize, Ordering},
};
use std::{collections::BTreeSet, fs, io, thread};

use libc::{c_int, c_long, c_void, pid_t, siginfo_t};
use log::{debug, trace, warn};
use nix::errno::Errno;
use spin::{Mutex, Once};

use crate::{
    single::raw_syscall,
    syscaller::{SysResult, Syscaller},
};

/// The number of threads that are signalled in one round.
const MAX_THREADS_PER_ROUND: usize = 256;

/// A request shared between the broadcasting thread and the signal handlers.
///
/// Everything in here is an atomic so that the handler stays async-signal-safe.
struct Mailbox {
    nr: AtomicIsize,
    args: [AtomicUsize; 6],
    /// Thread IDs that still have to run the request; zero marks a free or finished slot.
    slots: [AtomicI32; MAX_THREADS_PER_ROUND],
    /// The errno of the first thread whose syscall failed, or zero.
    failure: AtomicI32,
    active: AtomicBool,
}

static MAILBOX: Mailbox = Mailbox {
    nr: AtomicIsize::new(0),
    args: [const { AtomicUsize::new(0) }; 6],
    slots: [const { AtomicI32::new(0) }; MAX_THREADS_PER_ROUND],
    failure: AtomicI32::new(0),
    active: AtomicBool::new(false),
};

/// Serializes broadcasts, since there is only one mailbox.
static BROADCAST_LOCK: Mutex<()> = Mutex::new(());

/// Holds the broadcaster once a handler is in place. Failed installs leave it empty.
static INSTALLED: Once<Broadcast> = Once::new();

/// Counts requests replayed by the signal handler on other threads.
static REPLAYS: AtomicUsize = AtomicUsize::new(0);

/// Issues writes on all OS threads of the process as one logical operation.
///
/// Reads are plain syscalls on the calling thread, because every thread holds the
/// same state once all writes are broadcast.
///
/// A thread that blocks the broadcast signal will never acknowledge a request, and the
/// writer waits for it indefinitely.
#[derive(Debug)]
pub struct Broadcast {
    signo: c_int,
}

impl Broadcast {
    /// Installs the broadcast signal handler for `signo` and returns the process-wide
    /// broadcaster.
    ///
    /// Once a handler is in place, later calls return the same broadcaster whatever signal
    /// they ask for. A failed call installs nothing, so it can be retried with another signal.
    ///
    /// # Errors
    ///
    /// Fails with `EINVAL` if `signo` is not a real-time signal, with `EBUSY` if the
    /// signal already has a handler, or with the error of `sigaction`.
    pub fn install(signo: c_int) -> Result<&'static Broadcast, Errno> {
        let broadcast = INSTALLED.try_call_once(|| {
            install_handler(signo)?;
            debug!("broadcast handler installed on signal {}", signo);
            Ok::<_, Errno>(Broadcast { signo })
        })?;
        if broadcast.signo != signo {
            warn!(
                "broadcast already uses signal {}, ignoring request for {}",
                broadcast.signo, signo
            );
        }
        Ok(broadcast)
    }

    /// Installs the handler on the highest real-time signal that has no handler yet.
    ///
    /// # Errors
    ///
    /// Fails with `EBUSY` if every real-time signal is taken, or with the last error
    /// of `sigaction`.
    pub fn install_any() -> Result<&'static Broadcast, Errno> {
        if let Some(broadcast) = INSTALLED.get() {
            return Ok(broadcast);
        }
        let mut last = Errno::EBUSY;
        for signo in (libc::SIGRTMIN()..=libc::SIGRTMAX()).rev() {
            match Self::install(signo) {
                Ok(broadcast) => return Ok(broadcast),
                Err(errno) => {
                    trace!("signal {} cannot carry broadcasts: {}", signo, errno);
                    last = errno;
                }
            }
        }
        Err(last)
    }

    /// Returns how many requests other threads have replayed in their signal handler.
    pub fn replays() -> usize {
        REPLAYS.load(Ordering::Acquire)
    }

    /// Returns the signal used to reach other threads.
    pub fn signal(&self) -> c_int {
        self.signo
    }

    /// # Safety
    ///
    /// The arguments must be valid for the syscall `nr` on every thread of the process
    /// until this function returns.
    unsafe fn write(&self, nr: c_long, args: [usize; 6]) -> SysResult {
        let _guard = BROADCAST_LOCK.lock();

        let me = nix::unistd::gettid().as_raw();
        let pid = nix::unistd::getpid().as_raw();

        // Learn about the other threads before anything is applied, so a missing procfs
        // fails the call instead of leaving the process half-written.
        let mut others = list_threads().map_err(io_errno)?;

        // SAFETY: upheld by the caller.
        let ret = unsafe { raw_syscall(nr, args) }?;

        MAILBOX.nr.store(nr as isize, Ordering::Relaxed);
        for (slot, arg) in MAILBOX.args.iter().zip(args) {
            slot.store(arg, Ordering::Relaxed);
        }
        MAILBOX.failure.store(0, Ordering::Relaxed);
        MAILBOX.active.store(true, Ordering::Release);

        let mut visited = BTreeSet::from([me]);
        let mut signalled = 0;
        loop {
            let pending: Vec<pid_t> = others
                .into_iter()
                .filter(|tid| visited.insert(*tid))
                .collect();
            if pending.is_empty() {
                break;
            }
            for round in pending.chunks(MAX_THREADS_PER_ROUND) {
                self.run_round(pid, round);
                signalled += round.len();
            }
            others = match list_threads() {
                Ok(others) => others,
                Err(err) => {
                    MAILBOX.active.store(false, Ordering::Release);
                    panic!("lost track of threads during a capability broadcast: {}", err);
                }
            };
        }

        MAILBOX.active.store(false, Ordering::Release);

        let failure = MAILBOX.failure.load(Ordering::Acquire);
        if failure != 0 {
            panic!(
                "capability state diverged: syscall {} passed on thread {} but failed with {}",
                nr,
                me,
                Errno::from_i32(failure)
            );
        }

        debug!(
            "[{}] syscall {} applied to {} other thread(s)",
            self.name(),
            nr,
            signalled
        );
        Ok(ret)
    }

    /// Signals every thread in `round` and waits until each has run the request or exited.
    fn run_round(&self, pid: pid_t, round: &[pid_t]) {
        for (slot, tid) in MAILBOX.slots.iter().zip(round) {
            slot.store(*tid, Ordering::Release);
        }

        for (slot, tid) in MAILBOX.slots.iter().zip(round) {
            if let Err(err) = tgkill(pid, *tid, self.signo) {
                // The thread exited since it was listed.
                trace!("thread {} not signalled: {}", tid, err);
                slot.store(0, Ordering::Release);
            }
        }

        loop {
            let mut outstanding = 0;
            for slot in MAILBOX.slots.iter().take(round.len()) {
                let tid = slot.load(Ordering::Acquire);
                if tid == 0 {
                    continue;
                }
                // A thread that exits with the signal still pending never runs the handler.
                if tgkill(pid, tid, 0) == Err(Errno::ESRCH) {
                    let _ = slot.compare_exchange(tid, 0, Ordering::AcqRel, Ordering::Relaxed);
                    continue;
                }
                outstanding += 1;
            }
            if outstanding == 0 {
                break;
            }
            thread::yield_now();
        }
    }
}

impl Syscaller for Broadcast {
    fn name(&self) -> &'static str {
        "broadcast"
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
        unsafe { self.write(nr, args) }
    }
}

extern "C" fn on_broadcast(_signo: c_int, _info: *mut siginfo_t, _ucontext: *mut c_void) {
    if !MAILBOX.active.load(Ordering::Acquire) {
        return;
    }

    // SAFETY: `__errno_location` returns the errno slot of the calling thread,
    // which the interrupted code expects to find unchanged.
    let errno = unsafe { libc::__errno_location() };
    let saved = unsafe { *errno };

    // SAFETY: `gettid` takes no arguments.
    let me = unsafe { libc::syscall(libc::SYS_gettid) } as pid_t;
    if let Some(slot) = MAILBOX
        .slots
        .iter()
        .find(|slot| slot.load(Ordering::Acquire) == me)
    {
        let nr = MAILBOX.nr.load(Ordering::Relaxed) as c_long;
        let args = core::array::from_fn(|i| MAILBOX.args[i].load(Ordering::Relaxed));

        // SAFETY: the broadcasting thread issued the same request successfully on itself,
        // and keeps every argument alive until this slot is cleared.
        if let Err(err) = unsafe { raw_syscall(nr, args) } {
            let _ = MAILBOX.failure.compare_exchange(
                0,
                err as i32,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
        REPLAYS.fetch_add(1, Ordering::AcqRel);
        slot.store(0, Ordering::Release);
    }

    // SAFETY: see above.
    unsafe { *errno = saved };
}

fn install_handler(signo: c_int) -> Result<(), Errno> {
    if !(libc::SIGRTMIN()..=libc::SIGRTMAX()).contains(&signo) {
        return Err(Errno::EINVAL);
    }

    // SAFETY: an all-zero `sigaction` is a valid value to be filled in by the kernel.
    let mut old: libc::sigaction = unsafe { mem::zeroed() };
    // SAFETY: `old` is a valid place for the kernel to store the current action.
    Errno::result(unsafe { libc::sigaction(signo, ptr::null(), &mut old) })?;
    if old.sa_sigaction != libc::SIG_DFL && old.sa_sigaction != libc::SIG_IGN {
        return Err(Errno::EBUSY);
    }

    let handler: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) = on_broadcast;
    // SAFETY: see above.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler as libc::sighandler_t;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
    // SAFETY: `sa_mask` is a valid signal set owned by `action`.
    Errno::result(unsafe { libc::sigemptyset(&mut action.sa_mask) })?;
    // SAFETY: `action` is fully initialized and `on_broadcast` only uses
    // async-signal-safe operations.
    Errno::result(unsafe { libc::sigaction(signo, &action, ptr::null_mut()) })?;
    Ok(())
}

fn tgkill(pid: pid_t, tid: pid_t, signo: c_int) -> Result<(), Errno> {
    // SAFETY: `tgkill` takes no addresses.
    let ret = unsafe { libc::syscall(libc::SYS_tgkill, pid, tid, signo) };
    Errno::result(ret).map(drop)
}

/// Lists the thread IDs of the calling process that can still run a signal handler.
fn list_threads() -> io::Result<Vec<pid_t>> {
    let mut tids = Vec::new();
    for entry in fs::read_dir("/proc/self/task")? {
        let Some(tid) = entry?.file_name().to_str().and_then(|name| name.parse().ok()) else {
            continue;
        };
        if !is_exited(tid) {
            tids.push(tid);
        }
    }
    Ok(tids)
}

/// Returns whether the thread is a zombie (e.g., a thread group leader that called
/// `pthread_exit`) or already gone.
fn is_exited(tid: pid_t) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/self/task/{}/stat", tid)) else {
        return true;
    };
    // The state follows the command name, which is parenthesized and may contain anything.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state == 'Z' || state == 'X')
}

fn io_errno(err: io::Error) -> Errno {
    Errno::from_i32(err.raw_os_error().unwrap_or(libc::EIO))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lists_the_calling_thread() {
        let me = nix::unistd::gettid().as_raw();
        assert!(list_threads().unwrap().contains(&me));
        assert!(!is_exited(me));
    }

    #[test]
    fn unknown_thread_counts_as_exited() {
        assert!(is_exited(-1));
    }

    #[test]
    fn refuses_ordinary_signals() {
        assert_eq!(install_handler(libc::SIGUSR1), Err(Errno::EINVAL));
    }

    extern "C" fn foreign_handler(_signo: c_int) {}

    #[test]
    fn busy_signal_is_not_remembered() {
        let signo = libc::SIGRTMIN();
        let handler: extern "C" fn(c_int) = foreign_handler;
        // SAFETY: `foreign_handler` does nothing.
        unsafe { libc::signal(signo, handler as libc::sighandler_t) };

        assert_eq!(Broadcast::install(signo).unwrap_err(), Errno::EBUSY);
        assert!(INSTALLED.get().is_none());

        // SAFETY: restores the default action.
        unsafe { libc::signal(signo, libc::SIG_DFL) };
    }
}
