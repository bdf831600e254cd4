use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};

use crate::body::{put_fixed_name, read_fixed_name, Body};
use crate::crc::crc64;
use crate::error::{FrameError, Result};
use crate::types::MessageType;

/// Header: version (2) + type (12) + device (20) + timestamp (8) + body size (8) + CRC (8).
pub const HEADER_SIZE: usize = 58;

/// Protocol version written into every header.
pub const IGTL_VERSION: u16 = 1;

/// Highest header version accepted on receive. Version 2 peers that send
/// bodies without an extended header frame them exactly like version 1.
pub const MAX_ACCEPTED_VERSION: u16 = 2;

/// Width of the type name field.
pub const TYPE_NAME_LEN: usize = 12;

/// Width of the device name field.
pub const DEVICE_NAME_LEN: usize = 20;

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

/// A decoded message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub message_type: MessageType,
    /// Device name; the protocol uses it as the message name (`ACK_0001`, ...).
    pub device_name: String,
    /// Seconds since the epoch in the upper 32 bits, fraction in the lower.
    pub timestamp: u64,
    pub body_size: u64,
    pub crc: u64,
}

impl MessageHeader {
    /// Encode this header into `dst`.
    ///
    /// Wire format (big-endian):
    /// ```text
    /// ┌─────────┬───────────┬─────────────┬───────────┬───────────┬─────────┐
    /// │ Version │ Type      │ Device name │ Timestamp │ Body size │ CRC-64  │
    /// │ (2B)    │ (12B NUL) │ (20B NUL)   │ (8B)      │ (8B)      │ (8B)    │
    /// └─────────┴───────────┴─────────────┴───────────┴───────────┴─────────┘
    /// ```
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(HEADER_SIZE);
        dst.put_u16(self.version);
        put_fixed_name(dst, "type name", self.message_type.as_str(), TYPE_NAME_LEN)?;
        put_fixed_name(dst, "device name", &self.device_name, DEVICE_NAME_LEN)?;
        dst.put_u64(self.timestamp);
        dst.put_u64(self.body_size);
        dst.put_u64(self.crc);
        Ok(())
    }

    /// Decode a header from the front of `src`.
    ///
    /// Returns `Ok(None)` if fewer than [`HEADER_SIZE`] bytes are buffered.
    /// On success, consumes the header bytes.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = src.split_to(HEADER_SIZE);
        let version = header.get_u16();
        if !(IGTL_VERSION..=MAX_ACCEPTED_VERSION).contains(&version) {
            return Err(FrameError::UnsupportedVersion(version));
        }

        let type_name = read_fixed_name(&header[..TYPE_NAME_LEN]);
        header.advance(TYPE_NAME_LEN);
        if type_name.is_empty() {
            return Err(FrameError::InvalidHeader("empty type name".to_string()));
        }
        let device_name = read_fixed_name(&header[..DEVICE_NAME_LEN]);
        header.advance(DEVICE_NAME_LEN);

        Ok(Some(Self {
            version,
            message_type: MessageType::from_wire(&type_name),
            device_name,
            timestamp: header.get_u64(),
            body_size: header.get_u64(),
            crc: header.get_u64(),
        }))
    }

    /// Seconds part of the timestamp.
    pub fn timestamp_seconds(&self) -> u32 {
        (self.timestamp >> 32) as u32
    }
}

/// A header together with its decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Body,
}

/// Encode a complete message (header followed by body) into `dst`.
pub fn encode_message(
    device_name: &str,
    body: &Body,
    timestamp: u64,
    dst: &mut BytesMut,
) -> Result<()> {
    let mut payload = BytesMut::new();
    body.encode(&mut payload)?;

    let header = MessageHeader {
        version: IGTL_VERSION,
        message_type: body.message_type(),
        device_name: device_name.to_string(),
        timestamp,
        body_size: payload.len() as u64,
        crc: crc64(&payload),
    };
    header.encode(dst)?;
    dst.put_slice(&payload);
    Ok(())
}

/// Current wall-clock time in header timestamp format.
pub fn timestamp_now() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let seconds = elapsed.as_secs() & 0xFFFF_FFFF;
    let fraction = (u64::from(elapsed.subsec_nanos()) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_body_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::StringBody;

    #[test]
    fn header_is_58_bytes_big_endian() {
        let mut wire = BytesMut::new();
        encode_message(
            "ACK_0001",
            &Body::String(StringBody::new("START_UP")),
            0x0000_0001_8000_0000,
            &mut wire,
        )
        .unwrap();

        assert_eq!(wire.len(), HEADER_SIZE + 4 + 8);
        assert_eq!(&wire[0..2], &[0x00, 0x01]);
        assert_eq!(&wire[2..8], b"STRING");
        assert!(wire[8..14].iter().all(|&b| b == 0));
        assert_eq!(&wire[14..22], b"ACK_0001");
        assert_eq!(&wire[34..42], &[0, 0, 0, 1, 0x80, 0, 0, 0]);
        assert_eq!(&wire[42..50], &12u64.to_be_bytes());
        assert_eq!(&wire[50..58], &crc64(&wire[58..]).to_be_bytes());
    }

    #[test]
    fn decode_header_fields() {
        let mut wire = BytesMut::new();
        encode_message("CURRENT_POSITION", &Body::Transform(crate::IDENTITY), 7, &mut wire)
            .unwrap();

        let header = MessageHeader::decode(&mut wire).unwrap().unwrap();
        assert_eq!(header.message_type, MessageType::Transform);
        assert_eq!(header.device_name, "CURRENT_POSITION");
        assert_eq!(header.timestamp, 7);
        assert_eq!(header.body_size, 48);
        assert_eq!(wire.len(), 48, "only the header should be consumed");
    }

    #[test]
    fn decode_needs_full_header() {
        let mut wire = BytesMut::from(&[0u8; HEADER_SIZE - 1][..]);
        assert!(MessageHeader::decode(&mut wire).unwrap().is_none());
        assert_eq!(wire.len(), HEADER_SIZE - 1);
    }

    #[test]
    fn decode_accepts_version_2() {
        let mut wire = BytesMut::new();
        encode_message("ACK_0001", &Body::String(StringBody::new("START_UP")), 0, &mut wire)
            .unwrap();
        wire[1] = 2;
        let header = MessageHeader::decode(&mut wire).unwrap().unwrap();
        assert_eq!(header.version, 2);
        assert_eq!(header.message_type, MessageType::String);
        assert_eq!(
            Body::decode(&header.message_type, wire.split().freeze()).unwrap(),
            Body::String(StringBody::new("START_UP"))
        );
    }

    #[test]
    fn decode_rejects_other_versions() {
        for version in [0u8, 3] {
            let mut wire = BytesMut::new();
            encode_message("X", &Body::GetStatus, 0, &mut wire).unwrap();
            wire[1] = version;
            let err = MessageHeader::decode(&mut wire).unwrap_err();
            assert!(matches!(err, FrameError::UnsupportedVersion(v) if v == u16::from(version)));
        }
    }

    #[test]
    fn decode_rejects_empty_type_name() {
        let mut wire = BytesMut::new();
        encode_message("X", &Body::GetStatus, 0, &mut wire).unwrap();
        wire[2..14].fill(0);
        let err = MessageHeader::decode(&mut wire).unwrap_err();
        assert!(matches!(err, FrameError::InvalidHeader(_)));
    }

    #[test]
    fn device_name_limit() {
        let mut wire = BytesMut::new();
        let err = encode_message(&"D".repeat(21), &Body::GetStatus, 0, &mut wire).unwrap_err();
        assert!(matches!(
            err,
            FrameError::NameTooLong {
                field: "device name",
                len: 21,
                max: DEVICE_NAME_LEN
            }
        ));

        encode_message(&"D".repeat(20), &Body::GetStatus, 0, &mut wire).unwrap();
        let header = MessageHeader::decode(&mut wire).unwrap().unwrap();
        assert_eq!(header.device_name.len(), 20);
    }

    #[test]
    fn timestamp_now_has_seconds() {
        let header = MessageHeader {
            version: IGTL_VERSION,
            message_type: MessageType::GetStatus,
            device_name: String::new(),
            timestamp: timestamp_now(),
            body_size: 0,
            crc: 0,
        };
        assert!(header.timestamp_seconds() > 1_600_000_000);
    }
}
