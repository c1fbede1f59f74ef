// SPDX-License-Identifier: MPL-2.0

//! Every real-time signal is taken, so no write can reach all threads.

use std::{sync::mpsc, thread};

use kcap::{Errno, ErrorKind, SingleThread, keep_caps, keep_caps_with, set_keep_caps, syscaller};
use libc::c_int;

extern "C" fn foreign_handler(_signo: c_int) {}

#[test]
fn writes_fail_on_every_thread() {
    let _ = env_logger::builder().is_test(true).try_init();

    let handler: extern "C" fn(c_int) = foreign_handler;
    for signo in libc::SIGRTMIN()..=libc::SIGRTMAX() {
        // SAFETY: `foreign_handler` does nothing.
        unsafe { libc::signal(signo, handler as libc::sighandler_t) };
    }

    let (ask_tx, ask_rx) = mpsc::channel::<()>();
    let (report_tx, report_rx) = mpsc::channel::<bool>();
    let worker = thread::spawn(move || {
        while ask_rx.recv().is_ok() {
            let keep = keep_caps_with(&SingleThread).unwrap();
            report_tx.send(keep).unwrap();
        }
    });

    let err = set_keep_caps(true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Kernel(Errno::EBUSY));
    assert_eq!(syscaller().name(), "unavailable");

    assert!(!keep_caps().unwrap());
    ask_tx.send(()).unwrap();
    assert!(!report_rx.recv().unwrap());

    drop(ask_tx);
    worker.join().unwrap();
}
