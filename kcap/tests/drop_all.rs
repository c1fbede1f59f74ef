// SPDX-License-Identifier: MPL-2.0

//! Committing an empty set gives up every capability for the rest of the process.

use std::{sync::mpsc, thread};

use kcap::{CapSet, Flag, SingleThread, Value, get_proc, max_bits};

#[test]
fn empty_set_clears_every_thread() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (probe_tx, probe_rx) = mpsc::channel::<()>();
    let (report_tx, report_rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        while probe_rx.recv().is_ok() {
            report_tx.send(kcap::get_pid_with(&SingleThread, 0).unwrap()).unwrap();
        }
    });

    CapSet::new().set_proc().unwrap();

    let mine = get_proc();
    probe_tx.send(()).unwrap();
    let theirs = report_rx.recv().unwrap();
    for set in [&mine, &theirs] {
        for flag in Flag::ALL {
            for raw in 0..max_bits() {
                assert!(!set.get_flag(flag, Value::new(raw)));
            }
        }
    }

    drop(probe_tx);
    worker.join().unwrap();
}
