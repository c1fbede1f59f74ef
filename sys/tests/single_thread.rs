// SPDX-License-Identifier: MPL-2.0

//! A single-thread write changes the calling thread and nothing else.

use std::{sync::mpsc, thread};

use kcap_sys::{PrctlOp, SingleThread, prctl};

fn keep_caps() -> bool {
    prctl(&SingleThread, PrctlOp::GetKeepCaps).unwrap() == 1
}

#[test]
fn write_stays_on_the_calling_thread() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (ask_tx, ask_rx) = mpsc::channel::<()>();
    let (report_tx, report_rx) = mpsc::channel::<bool>();
    let worker = thread::spawn(move || {
        while ask_rx.recv().is_ok() {
            report_tx.send(keep_caps()).unwrap();
        }
    });

    assert!(!keep_caps());
    prctl(&SingleThread, PrctlOp::SetKeepCaps(true)).unwrap();
    assert!(keep_caps());

    ask_tx.send(()).unwrap();
    assert!(!report_rx.recv().unwrap());

    prctl(&SingleThread, PrctlOp::SetKeepCaps(false)).unwrap();
    drop(ask_tx);
    worker.join().unwrap();
}
