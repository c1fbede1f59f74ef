// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use kcap_sys::Errno;

use crate::value::Value;

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The set is empty or does not fit the kernel ABI. Never reaches the kernel.
    BadSet,
    /// The kernel rejected a request.
    Kernel(Errno),
}

impl From<Errno> for ErrorKind {
    fn from(errno: Errno) -> Self {
        ErrorKind::Kernel(errno)
    }
}

/// Error used in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    value: Option<Value>,
    msg: Option<&'static str>,
}

impl Error {
    pub const fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            value: None,
            msg: None,
        }
    }

    pub const fn with_message(kind: ErrorKind, msg: &'static str) -> Self {
        Error {
            kind,
            value: None,
            msg: Some(msg),
        }
    }

    /// Records the value that a bulk operation stopped at.
    pub const fn at_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the kernel's error number, if the kernel was involved.
    pub const fn errno(&self) -> Option<Errno> {
        match self.kind {
            ErrorKind::Kernel(errno) => Some(errno),
            ErrorKind::BadSet => None,
        }
    }

    pub const fn value(&self) -> Option<Value> {
        self.value
    }

    pub const fn msg(&self) -> Option<&'static str> {
        self.msg
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(ErrorKind::Kernel(errno))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::BadSet => write!(f, "bad capability set")?,
            ErrorKind::Kernel(errno) => write!(f, "{}", errno)?,
        }
        if let Some(value) = self.value {
            write!(f, " (at capability {})", value)?;
        }
        if let Some(msg) = self.msg {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[macro_export]
macro_rules! return_errno_with_message {
    ($kind: expr, $message: expr) => {
        return Err($crate::Error::with_message($crate::ErrorKind::from($kind), $message))
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::Result;

    fn fails_with_message() -> Result<()> {
        return_errno_with_message!(ErrorKind::BadSet, "no words");
    }

    #[test]
    fn errno_becomes_a_kernel_error() {
        let err = Error::from(Errno::ESRCH);
        assert_eq!(err.kind(), ErrorKind::Kernel(Errno::ESRCH));
        assert_eq!(err.errno(), Some(Errno::ESRCH));
        assert_eq!(err.msg(), None);
    }

    #[test]
    fn macro_builds_errors() {
        let err = fails_with_message().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSet);
        assert_eq!(err.errno(), None);
        assert_eq!(err.msg(), Some("no words"));
    }

    #[test]
    fn display_names_the_failing_value() {
        let err = Error::from(Errno::EINVAL).at_value(Value::new(5000));
        assert_eq!(err.value(), Some(Value::new(5000)));
        assert!(err.to_string().ends_with("(at capability 5000)"));
        assert_eq!(
            Error::with_message(ErrorKind::BadSet, "empty").to_string(),
            "bad capability set: empty"
        );
    }
}
