//! Host-side driver for a serial-connected MicroPython device: a raw-mode
//! execution protocol, an in-band filesystem RPC multiplexed on the same
//! link, and an interactive REPL with hotkeys.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod fs_commands;
pub mod interceptor;
pub mod mount;
pub mod raw_repl;
pub mod repl;
pub mod rpc;
pub mod runner;
pub mod serial;
pub mod session;
pub mod shortcuts;

pub use error::{MprError, Result};
