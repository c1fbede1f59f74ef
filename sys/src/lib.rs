// SPDX-License-Identifier: MPL-2.0

//! Raw Linux capability syscalls.
//!
//! This crate holds every line of `unsafe` code needed to read and write the capabilities
//! of a Linux process. It exposes the binary layout of `capget(2)`/`capset(2)` in [`abi`],
//! the capability-related `prctl(2)` requests in [`prctl`], and the [`Syscaller`] seam that
//! decides how a write reaches all threads of the process.
//!
//! Three syscallers are provided. [`Broadcast`] replays a write on every OS thread so that
//! the whole process changes privilege as one, and [`SingleThread`] only affects the
//! calling thread. [`Unavailable`] refuses every write and takes the place of `Broadcast`
//! when its signal handler cannot be installed. With the `fake-kernel` feature,
//! [`fake::FakeKernel`] emulates a process in memory for tests.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod abi;
mod broadcast;
#[cfg(any(test, feature = "fake-kernel"))]
pub mod fake;
pub mod prctl;
mod single;
mod syscaller;
mod unavailable;

pub use nix::errno::Errno;

pub use self::{
    broadcast::Broadcast,
    prctl::PrctlOp,
    single::SingleThread,
    syscaller::{SysResult, Syscaller, capget, capset, prctl},
    unavailable::Unavailable,
};
