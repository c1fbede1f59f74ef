// SPDX-License-Identifier: MPL-2.0

//! Process-wide configuration, read from the environment.
//!
//! | Variable                | Values                    | Default                      |
//! |-------------------------|---------------------------|------------------------------|
//! | `KCAP_SYSCALLER`        | `broadcast`, `single`     | `broadcast`                  |
//! | `KCAP_BROADCAST_SIGNAL` | a real-time signal number | the highest free RT signal   |
//!
//! A value that cannot be parsed is reported and replaced by its default.

use core::ffi::c_int;

use crate::prelude::*;

pub const ENV_SYSCALLER: &str = "KCAP_SYSCALLER";
pub const ENV_BROADCAST_SIGNAL: &str = "KCAP_BROADCAST_SIGNAL";

/// How capability writes reach the threads of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyscallerKind {
    /// Every write is replayed on all OS threads.
    #[default]
    Broadcast,
    /// Writes only affect the calling OS thread.
    Single,
}

impl SyscallerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "broadcast" => Some(Self::Broadcast),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub syscaller: SyscallerKind,
    /// The signal that carries broadcasts. `None` picks the highest free real-time signal.
    pub broadcast_signal: Option<c_int>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from a key lookup, such as the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_SYSCALLER) {
            match SyscallerKind::from_name(raw.trim()) {
                Some(kind) => config.syscaller = kind,
                None => warn!(
                    "{}: unknown syscaller {:?}, using {:?}",
                    ENV_SYSCALLER, raw, config.syscaller
                ),
            }
        }

        if let Some(raw) = lookup(ENV_BROADCAST_SIGNAL) {
            match raw.trim().parse::<c_int>() {
                Ok(signo) => config.broadcast_signal = Some(signo),
                Err(err) => warn!(
                    "{}: bad signal number {:?} ({}), using the first free one",
                    ENV_BROADCAST_SIGNAL, raw, err
                ),
            }
        }

        debug!("capability config: {:?}", config);
        config
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;

    fn config_of(vars: &[(&str, &str)]) -> Config {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_of(&[]);
        assert_eq!(config.syscaller, SyscallerKind::Broadcast);
        assert_eq!(config.broadcast_signal, None);
    }

    #[test]
    fn reads_both_variables() {
        let config = config_of(&[(ENV_SYSCALLER, "single"), (ENV_BROADCAST_SIGNAL, " 40 ")]);
        assert_eq!(config.syscaller, SyscallerKind::Single);
        assert_eq!(config.broadcast_signal, Some(40));
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = config_of(&[(ENV_SYSCALLER, "psx"), (ENV_BROADCAST_SIGNAL, "rtmax")]);
        assert_eq!(config, Config::default());
    }
}
