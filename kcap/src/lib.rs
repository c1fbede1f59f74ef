// SPDX-License-Identifier: MPL-2.0

//! Linux process capabilities.
//!
//! A process holds three capability vectors, Effective, Permitted and Inheritable,
//! which this crate reads and writes as a [`CapSet`]. The bounding set and the ambient
//! set have their own interfaces in [`bound`] and [`ambient`].
//!
//! ```no_run
//! use kcap::{Flag, Value, get_proc};
//!
//! // Give up CAP_NET_RAW for good.
//! let set = get_proc();
//! set.set_flag(Flag::Effective, false, &[Value::new(13)]);
//! set.set_flag(Flag::Permitted, false, &[Value::new(13)]);
//! set.set_proc().unwrap();
//! ```
//!
//! # Threads
//!
//! Linux keeps capabilities per OS thread. By default, every write made by this crate is
//! replayed on all threads of the process, so that the process changes privilege as one.
//! See [`config`] for how to choose the strategy, and the `_with` variants of each write
//! for passing a [`Syscaller`] explicitly.
//!
//! All writes are serialized through one process-wide lock. Reads are not.

#![deny(unsafe_code)]

pub mod abi;
pub mod ambient;
pub mod bound;
pub mod config;
mod dup;
mod error;
mod gate;
mod prelude;
mod process;
mod set;
mod syscaller;
mod value;

pub use kcap_sys::{Errno, SingleThread, Syscaller};

pub use self::{
    abi::{KernelAbi, kernel_abi},
    ambient::{query_ambient, reset_ambient, set_ambient},
    bound::{drop_bound, query_bound},
    dup::Dup,
    error::{Error, ErrorKind},
    prelude::Result,
    process::{
        get_pid, get_pid_with, get_proc, keep_caps, keep_caps_with, set_keep_caps,
        set_keep_caps_with,
    },
    set::{CapSet, Diff},
    syscaller::syscaller,
    value::{Flag, NAMED_COUNT, Value, max_bits},
};
