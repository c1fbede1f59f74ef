// SPDX-License-Identifier: MPL-2.0

use kcap_sys::{Broadcast, SingleThread, Unavailable};
use spin::Once;

use crate::{
    config::{Config, SyscallerKind},
    prelude::*,
};

static SYSCALLER: Once<&'static dyn Syscaller> = Once::new();
static UNAVAILABLE: Once<Unavailable> = Once::new();

/// Returns the process-wide syscaller, selecting it from [`Config::from_env`] on first use.
///
/// The single-thread syscaller is only chosen when it is configured. If broadcasting was
/// asked for and no handler can be installed, every write fails instead.
pub fn syscaller() -> &'static dyn Syscaller {
    *SYSCALLER.call_once(|| select(&Config::from_env()))
}

fn select(config: &Config) -> &'static dyn Syscaller {
    let sc: &'static dyn Syscaller = match config.syscaller {
        SyscallerKind::Single => &SingleThread,
        SyscallerKind::Broadcast => {
            let installed = match config.broadcast_signal {
                Some(signo) => Broadcast::install(signo),
                None => Broadcast::install_any(),
            };
            match installed {
                Ok(broadcast) => broadcast,
                Err(errno) => {
                    warn!(
                        "cannot install the broadcast handler on {:?} ({}), writes will fail",
                        config.broadcast_signal, errno
                    );
                    UNAVAILABLE.call_once(|| Unavailable::new(errno))
                }
            }
        }
    };
    info!("capability syscaller: {}", sc.name());
    sc
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_is_honoured() {
        let config = Config {
            syscaller: SyscallerKind::Single,
            ..Config::default()
        };
        assert_eq!(select(&config).name(), "single-thread");
    }

    #[test]
    fn bad_signal_never_means_single_thread() {
        let config = Config {
            syscaller: SyscallerKind::Broadcast,
            broadcast_signal: Some(0),
        };
        assert_ne!(select(&config).name(), "single-thread");
    }
}
