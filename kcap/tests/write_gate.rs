// SPDX-License-Identifier: MPL-2.0

//! Writers on different threads never reach the kernel at the same time.

use std::{thread, time::Duration};

use kcap::{
    Value,
    ambient::{reset_ambient_with, set_ambient_with},
    bound::drop_bound_with,
    get_pid_with,
};
use kcap_sys::fake::FakeKernel;

const CAP_SETPCAP: u64 = 1 << 8;

#[test]
fn writers_are_serialized() {
    let _ = env_logger::builder().is_test(true).try_init();

    let kernel = FakeKernel::with_caps(CAP_SETPCAP | 0xff)
        .with_write_delay(Duration::from_millis(1));

    thread::scope(|s| {
        for worker in 0..4u32 {
            let kernel = &kernel;
            s.spawn(move || {
                for _ in 0..5 {
                    let _ = set_ambient_with(kernel, true, &[Value::new(worker)]);
                    let _ = drop_bound_with(kernel, &[Value::new(20 + worker)]);
                    let _ = reset_ambient_with(kernel);
                    if let Ok(set) = get_pid_with(kernel, 0) {
                        let _ = set.set_proc_with(kernel);
                    }
                }
            });
        }
    });

    assert!(kernel.writes().len() >= 4 * 5 * 2);
    assert_eq!(kernel.peak_writers(), 1);
}
