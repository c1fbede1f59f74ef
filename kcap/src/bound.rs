// SPDX-License-Identifier: MPL-2.0

//! The bounding set.
//!
//! The bounding set limits the capabilities that a process and its descendants can ever
//! gain through `execve`. A capability can be dropped from it but never put back.

use kcap_sys::prctl;

use crate::{gate::privilege_writer, prelude::*, syscaller::syscaller};

/// Returns whether `value` is in the bounding set of the calling process.
///
/// Fails if the kernel does not know `value` or has no bounding set.
pub fn query_bound(value: Value) -> Result<bool> {
    query_bound_with(syscaller(), value)
}

pub fn query_bound_with<S: Syscaller + ?Sized>(sc: &S, value: Value) -> Result<bool> {
    let present = prctl(sc, PrctlOp::CapBsetRead(value.as_u32()))
        .map_err(|errno| Error::from(errno).at_value(value))?;
    Ok(present != 0)
}

/// Drops `values` from the bounding set, in order.
///
/// This needs `CAP_SETPCAP` in the Effective vector. The first value that cannot be
/// dropped ends the call, and the error names it through [`Error::value`]. The values
/// before it stay dropped and the ones after it are not touched.
pub fn drop_bound(values: &[Value]) -> Result<()> {
    drop_bound_with(syscaller(), values)
}

pub fn drop_bound_with<S: Syscaller + ?Sized>(sc: &S, values: &[Value]) -> Result<()> {
    let _guard = privilege_writer();
    for &value in values {
        prctl(sc, PrctlOp::CapBsetDrop(value.as_u32()))
            .map_err(|errno| Error::from(errno).at_value(value))?;
        debug!("[{}] dropped {} from the bounding set", sc.name(), value);
    }
    Ok(())
}
