//! Top-of-argv device resolution (spec §6), grounded on the device-shortcut
//! / `connect` handling at the start of `main()` in `mpr.py`. Everything
//! after the resolved device is passed to [`crate::runner::CommandRunner`]
//! unchanged.

use crate::config::Config;
use crate::error::MprError;
use crate::shortcuts::{find_serial_device, DEVICE_SHORTCUTS};

pub const DEFAULT_BAUD: u32 = 115200;

pub struct Invocation {
    pub device: String,
    pub baud: u32,
    pub rest: Vec<String>,
}

pub fn parse(mut args: Vec<String>, config: &Config) -> Result<Invocation, MprError> {
    let is_known_shortcut = |a: &str| {
        DEVICE_SHORTCUTS.iter().any(|(k, _)| *k == a) || config.device_shortcuts.contains_key(a)
    };

    let device = if args.first().is_some_and(|a| is_known_shortcut(a)) {
        let shortcut = args.remove(0);
        find_serial_device(Some(&shortcut), &config.device_shortcuts)?
    } else if args.first().map(String::as_str) == Some("connect") {
        args.remove(0);
        if args.is_empty() {
            return Err(MprError::usage("'connect' needs a device argument"));
        }
        let dev = args.remove(0);
        find_serial_device(Some(&dev), &config.device_shortcuts)?
    } else {
        find_serial_device(None, &config.device_shortcuts)?
    };

    Ok(Invocation {
        device,
        baud: DEFAULT_BAUD,
        rest: args,
    })
}
