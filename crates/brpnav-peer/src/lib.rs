//! Connections to navigation peers.
//!
//! A [`Connection`] owns one socket and speaks whole OpenIGTLink messages
//! over it: typed sends, and receives split into header and body so that
//! the caller can dispatch on the declared message type. Every receive is
//! bounded by a deadline; expiry is reported as
//! [`ConnectionError::Timeout`] and leaves the stream framed.

pub mod connection;
pub mod connector;
pub mod error;
pub mod listener;

pub use connection::{
    Connection, ConnectionConfig, MessageStats, Query, DEFAULT_RECEIVE_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT,
};
pub use connector::{connect, connect_with_config};
pub use error::{ConnectionError, Result};
pub use listener::RobotListener;
