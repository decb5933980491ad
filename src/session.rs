//! The stateful relationship with one connected device (spec §3,
//! "Session"), grounded on `PyboardExtended`'s lifecycle in `main()`:
//! created on connect, destroyed on close, at most one per process.

use tracing::info;

use crate::config::Config;
use crate::error::MprError;
use crate::interceptor::Interceptor;
use crate::runner::CommandRunner;
use crate::serial::{PhysicalSerialLink, SerialLink};

pub struct Session {
    link: Box<dyn SerialLink>,
    device: String,
}

impl Session {
    /// Opens `device` and wraps it in an [`Interceptor`] so a later `mount`
    /// command can start serving RPC frames without re-establishing the
    /// link. The RPC server's root is a placeholder until `mount` repoints
    /// it via `SerialLink::set_mount_root`.
    pub fn connect(device: &str, baud: u32) -> Result<Self, MprError> {
        let physical = PhysicalSerialLink::open(device, baud)?;
        let interceptor = Interceptor::new(physical, std::env::temp_dir());
        info!(device, baud, "connected");
        Ok(Self {
            link: Box::new(interceptor),
            device: device.to_string(),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn run(&mut self, args: Vec<String>, config: &Config) -> Result<(), MprError> {
        CommandRunner::new(self.link.as_mut())
            .with_alias_overrides(config.aliases.clone())
            .run_all(args)
    }

    pub fn close(mut self) -> Result<(), MprError> {
        self.link.close()
    }
}
