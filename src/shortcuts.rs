//! Device shortcut resolution (spec §6), grounded on `device_shortcuts`
//! and `find_serial_device` in `mpr.py`. User overrides from
//! `.mprrc`/`.mprconfig` ([`crate::config::Config`]) take precedence over
//! these built-ins.

use std::collections::HashMap;

use crate::error::MprError;

pub const DEVICE_SHORTCUTS: &[(&str, &str)] = &[
    ("a0", "/dev/ttyACM0"),
    ("a1", "/dev/ttyACM1"),
    ("a2", "/dev/ttyACM2"),
    ("u0", "/dev/ttyUSB0"),
    ("u1", "/dev/ttyUSB1"),
    ("u2", "/dev/ttyUSB2"),
    ("u3", "/dev/ttyUSB3"),
    ("c3", "COM3"),
    ("c4", "COM4"),
    ("c5", "COM5"),
    ("c6", "COM6"),
];

fn resolve_shortcut<'a>(name: &'a str, overrides: &'a HashMap<String, String>) -> &'a str {
    if let Some(dev) = overrides.get(name) {
        return dev;
    }
    DEVICE_SHORTCUTS
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| *v)
        .unwrap_or(name)
}

/// Resolves `requested` (a shortcut, an explicit device path, or `None` for
/// auto-detect) against the ports the OS currently reports, the way
/// `find_serial_device` validates against `serial.tools.list_ports`.
pub fn find_serial_device(
    requested: Option<&str>,
    overrides: &HashMap<String, String>,
) -> Result<String, MprError> {
    let ports = serialport::available_ports()
        .map_err(|e| MprError::protocol(format!("could not list serial ports: {e}")))?;
    let port_names: Vec<&str> = ports.iter().map(|p| p.port_name.as_str()).collect();

    match requested {
        None => overrides
            .values()
            .map(String::as_str)
            .chain(DEVICE_SHORTCUTS.iter().map(|(_, dev)| *dev))
            .find(|dev| port_names.contains(dev))
            .map(str::to_string)
            .ok_or_else(|| MprError::usage("no device found")),
        Some(name) => {
            let dev = resolve_shortcut(name, overrides);
            if port_names.contains(&dev) {
                Ok(dev.to_string())
            } else {
                Err(MprError::usage(format!("{dev} could not be accessed")))
            }
        }
    }
}
