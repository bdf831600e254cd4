//! OpenIGTLink v1 message framing for robot navigation sessions.
//!
//! Every message on the wire is a fixed 58-byte header followed by a body:
//! - protocol version, type name and device name
//! - timestamp
//! - body size and a CRC-64 of the body
//!
//! Readers split header and body so that a caller can decide, from the
//! header alone, how (or whether) to decode the body. The stream stays
//! framed either way.

pub mod body;
pub mod codec;
pub mod crc;
pub mod error;
pub mod reader;
pub mod types;
pub mod writer;

pub use body::{Body, Matrix4x4, StatusBody, StringBody, IDENTITY};
pub use codec::{
    encode_message, FrameConfig, Message, MessageHeader, DEFAULT_MAX_BODY, DEVICE_NAME_LEN,
    HEADER_SIZE, IGTL_VERSION, MAX_ACCEPTED_VERSION, TYPE_NAME_LEN,
};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use types::{MessageType, StatusCode};
pub use writer::MessageWriter;
