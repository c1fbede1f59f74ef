// SPDX-License-Identifier: MPL-2.0

pub(crate) use kcap_sys::{PrctlOp, Syscaller};
pub(crate) use log::{debug, info, trace, warn};

pub(crate) use crate::{
    error::{Error, ErrorKind},
    return_errno_with_message,
    value::{Flag, Value},
};

pub type Result<T> = core::result::Result<T, Error>;
