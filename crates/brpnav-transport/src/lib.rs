//! Byte-stream transport for OpenIGTLink navigation sessions.
//!
//! Provides a unified stream type over the two transports a robot controller
//! is reachable through:
//! - TCP (the OpenIGTLink default, port 18944)
//! - Unix domain sockets (local simulators and tests)
//!
//! This is the lowest layer of brpnav. Everything else builds on top of
//! the [`IgtStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Endpoint, DEFAULT_IGTL_PORT};
pub use error::{Result, TransportError};
pub use stream::IgtStream;
pub use tcp::TcpTransport;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
