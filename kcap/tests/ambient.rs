// SPDX-License-Identifier: MPL-2.0

//! The ambient set is shared by the whole process, so these steps run as one test.

use kcap::{Errno, ErrorKind, Flag, Value, get_proc, query_ambient, reset_ambient, set_ambient};

const CAP_NET_BIND_SERVICE: Value = Value::new(10);

#[test]
fn raise_lower_and_reset() {
    let _ = env_logger::builder().is_test(true).try_init();

    let set = get_proc();
    let reachable = set.get_flag(Flag::Permitted, CAP_NET_BIND_SERVICE)
        && set.get_flag(Flag::Inheritable, CAP_NET_BIND_SERVICE);
    let before = query_ambient(Value::new(0)).unwrap();

    match set_ambient(true, &[CAP_NET_BIND_SERVICE]) {
        Ok(()) => {
            assert!(query_ambient(CAP_NET_BIND_SERVICE).unwrap());
            set_ambient(false, &[CAP_NET_BIND_SERVICE]).unwrap();
            assert!(!query_ambient(CAP_NET_BIND_SERVICE).unwrap());
        }
        Err(err) => {
            assert!(!reachable);
            assert_eq!(err.kind(), ErrorKind::Kernel(Errno::EPERM));
            assert_eq!(err.value(), Some(CAP_NET_BIND_SERVICE));
        }
    }
    assert_eq!(query_ambient(Value::new(0)).unwrap(), before);

    reset_ambient().unwrap();
    for raw in 0..kcap::max_bits() {
        assert!(!query_ambient(Value::new(raw)).unwrap());
    }
}
