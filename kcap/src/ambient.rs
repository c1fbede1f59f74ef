// SPDX-License-Identifier: MPL-2.0

//! The ambient set.
//!
//! Ambient capabilities survive `execve` of a program without file capabilities. The
//! kernel keeps them a subset of Permitted and Inheritable, and lowers them by itself when
//! either of those shrinks.

use kcap_sys::prctl;

use crate::{gate::privilege_writer, prelude::*, syscaller::syscaller};

/// Returns whether `value` is raised in the ambient set of the calling process.
pub fn query_ambient(value: Value) -> Result<bool> {
    query_ambient_with(syscaller(), value)
}

pub fn query_ambient_with<S: Syscaller + ?Sized>(sc: &S, value: Value) -> Result<bool> {
    let raised = prctl(sc, PrctlOp::AmbientIsSet(value.as_u32()))
        .map_err(|errno| Error::from(errno).at_value(value))?;
    Ok(raised != 0)
}

/// Raises or lowers each of `values` in the ambient set, in order.
///
/// The first value the kernel refuses ends the call and is named by [`Error::value`].
/// Raising a value requires it to be both Permitted and Inheritable.
pub fn set_ambient(enable: bool, values: &[Value]) -> Result<()> {
    set_ambient_with(syscaller(), enable, values)
}

pub fn set_ambient_with<S: Syscaller + ?Sized>(
    sc: &S,
    enable: bool,
    values: &[Value],
) -> Result<()> {
    let _guard = privilege_writer();
    for &value in values {
        let op = if enable {
            PrctlOp::AmbientRaise(value.as_u32())
        } else {
            PrctlOp::AmbientLower(value.as_u32())
        };
        prctl(sc, op).map_err(|errno| Error::from(errno).at_value(value))?;
    }
    debug!(
        "[{}] ambient {:?} {}",
        sc.name(),
        values,
        if enable { "raised" } else { "lowered" }
    );
    Ok(())
}

/// Lowers every ambient capability.
///
/// The clear is only issued if some value is found raised. A probe that fails on the
/// very first value is taken to mean the ambient set is absent, and the call succeeds.
/// This keeps processes working where clearing is locked down although nothing is raised.
pub fn reset_ambient() -> Result<()> {
    reset_ambient_with(syscaller())
}

pub fn reset_ambient_with<S: Syscaller + ?Sized>(sc: &S) -> Result<()> {
    let _guard = privilege_writer();

    let mut raw = 0;
    loop {
        match prctl(sc, PrctlOp::AmbientIsSet(raw)) {
            Ok(0) => raw += 1,
            Ok(_) => break,
            Err(errno) if raw == 0 => {
                warn!("ambient set cannot be read ({}), nothing to reset", errno);
                return Ok(());
            }
            Err(_) => {
                trace!("no ambient capability below {} is raised", raw);
                return Ok(());
            }
        }
    }

    prctl(sc, PrctlOp::AmbientClearAll)?;
    debug!("[{}] ambient set cleared", sc.name());
    Ok(())
}
