//! Async request/response pump and the JSON-lines host protocol.
//!
//! This crate provides the transport half of an out-of-process registry runtime:
//! * `MainLoop`: a tokio-driven pump correlating responses with requests by id
//! * `PeerSocket`: cloneable handle used to issue requests into the pump
//! * `Protocol`: trait binding the pump to a concrete wire format
//! * `host`: the newline-delimited JSON format spoken with interpreter hosts

#![warn(missing_docs)]

pub mod error;
pub mod host;
pub mod mainloop;
pub mod protocol;
pub mod socket;

pub use error::{Error, Result};
pub use host::{FaultKind, HostOp, HostProtocol, HostRequest, HostResponse, RemoteFault};
pub use mainloop::MainLoop;
pub use protocol::{CounterIdGen, Protocol};
pub use socket::PeerSocket;
