//! In-band filesystem RPC: wire codec (spec §4.C) and host-side dispatch
//! (spec §4.D).

pub mod codec;
pub mod server;

pub use codec::{Cmd, Reply, Request, Stat};
pub use server::RpcServer;
