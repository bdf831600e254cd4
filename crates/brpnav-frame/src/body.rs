use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::types::{MessageType, StatusCode};

/// 4x4 homogeneous transform, row-major (`m[row][col]`), translation in
/// millimeters in the last column.
pub type Matrix4x4 = [[f32; 4]; 4];

/// The identity transform.
pub const IDENTITY: Matrix4x4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// IANA MIBenum for US-ASCII.
pub const ENCODING_US_ASCII: u16 = 3;
/// IANA MIBenum for UTF-8.
pub const ENCODING_UTF8: u16 = 106;

const STATUS_ERROR_NAME_LEN: usize = 20;
const STATUS_FIXED_LEN: usize = 2 + 8 + STATUS_ERROR_NAME_LEN;
const TRANSFORM_LEN: usize = 12 * 4;

/// STRING message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringBody {
    pub encoding: u16,
    pub text: String,
}

impl StringBody {
    /// Build a body, choosing US-ASCII when the text allows it.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let encoding = if text.is_ascii() {
            ENCODING_US_ASCII
        } else {
            ENCODING_UTF8
        };
        Self { encoding, text }
    }
}

/// STATUS message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBody {
    pub code: u16,
    pub subcode: i64,
    /// Empty on the wire when absent.
    pub error_name: Option<String>,
    /// Empty on the wire when absent.
    pub status_string: Option<String>,
}

impl StatusBody {
    /// Status with the given code and no annotations.
    pub fn new(code: StatusCode) -> Self {
        Self {
            code: code.as_u16(),
            subcode: 0,
            error_name: None,
            status_string: None,
        }
    }

    /// Attach an error name (at most 20 bytes on the wire).
    pub fn with_error_name(mut self, error_name: impl Into<String>) -> Self {
        self.error_name = Some(error_name.into());
        self
    }

    /// Attach a free-form status string.
    pub fn with_status_string(mut self, status_string: impl Into<String>) -> Self {
        self.status_string = Some(status_string.into());
        self
    }

    pub fn with_subcode(mut self, subcode: i64) -> Self {
        self.subcode = subcode;
        self
    }

    /// The code as a known [`StatusCode`], if it is one.
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.code)
    }
}

/// Decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    String(StringBody),
    Status(StatusBody),
    Transform(Matrix4x4),
    GetStatus,
    GetTransform,
    /// Body of a message type this codec does not interpret.
    Other {
        message_type: String,
        payload: Bytes,
    },
}

impl Body {
    /// The message type this body is sent as.
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::String(_) => MessageType::String,
            Body::Status(_) => MessageType::Status,
            Body::Transform(_) => MessageType::Transform,
            Body::GetStatus => MessageType::GetStatus,
            Body::GetTransform => MessageType::GetTransform,
            Body::Other { message_type, .. } => MessageType::from_wire(message_type),
        }
    }

    /// Append the wire encoding of this body to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Body::String(body) => {
                let bytes = body.text.as_bytes();
                let len = u16::try_from(bytes.len()).map_err(|_| {
                    FrameError::malformed(
                        "STRING",
                        format!("text is {} bytes, max {}", bytes.len(), u16::MAX),
                    )
                })?;
                dst.reserve(4 + bytes.len());
                dst.put_u16(body.encoding);
                dst.put_u16(len);
                dst.put_slice(bytes);
            }
            Body::Status(body) => {
                let error_name = body.error_name.as_deref().unwrap_or("");
                let status_string = body.status_string.as_deref().unwrap_or("");
                if status_string.as_bytes().contains(&0) {
                    return Err(FrameError::malformed(
                        "STATUS",
                        "status string contains NUL",
                    ));
                }
                dst.reserve(STATUS_FIXED_LEN + status_string.len() + 1);
                dst.put_u16(body.code);
                dst.put_i64(body.subcode);
                put_fixed_name(dst, "status error name", error_name, STATUS_ERROR_NAME_LEN)?;
                dst.put_slice(status_string.as_bytes());
                dst.put_u8(0);
            }
            Body::Transform(matrix) => {
                dst.reserve(TRANSFORM_LEN);
                // Rotation columns, then translation.
                for col in 0..4 {
                    for row in matrix.iter().take(3) {
                        dst.put_f32(row[col]);
                    }
                }
            }
            Body::GetStatus | Body::GetTransform => {}
            Body::Other { payload, .. } => dst.put_slice(payload),
        }
        Ok(())
    }

    /// Decode a body of the given declared type.
    pub fn decode(message_type: &MessageType, payload: Bytes) -> Result<Self> {
        match message_type {
            MessageType::String => decode_string(payload).map(Body::String),
            MessageType::Status => decode_status(payload).map(Body::Status),
            MessageType::Transform => decode_transform(payload).map(Body::Transform),
            MessageType::GetStatus => Ok(Body::GetStatus),
            MessageType::GetTransform => Ok(Body::GetTransform),
            MessageType::Other(name) => Ok(Body::Other {
                message_type: name.clone(),
                payload,
            }),
        }
    }
}

fn decode_string(mut src: Bytes) -> Result<StringBody> {
    if src.len() < 4 {
        return Err(FrameError::malformed("STRING", "shorter than 4 bytes"));
    }
    let encoding = src.get_u16();
    let len = usize::from(src.get_u16());
    if src.len() < len {
        return Err(FrameError::malformed(
            "STRING",
            format!("declares {len} bytes of text, {} present", src.len()),
        ));
    }
    let text = std::str::from_utf8(&src[..len])
        .map_err(|err| FrameError::malformed("STRING", err.to_string()))?
        .to_string();
    Ok(StringBody { encoding, text })
}

fn decode_status(mut src: Bytes) -> Result<StatusBody> {
    if src.len() < STATUS_FIXED_LEN {
        return Err(FrameError::malformed(
            "STATUS",
            format!("shorter than {STATUS_FIXED_LEN} bytes"),
        ));
    }
    let code = src.get_u16();
    let subcode = src.get_i64();
    let error_name = read_fixed_name(&src[..STATUS_ERROR_NAME_LEN]);
    src.advance(STATUS_ERROR_NAME_LEN);
    let status_string = read_fixed_name(&src);
    Ok(StatusBody {
        code,
        subcode,
        error_name: non_empty(error_name),
        status_string: non_empty(status_string),
    })
}

fn decode_transform(mut src: Bytes) -> Result<Matrix4x4> {
    if src.len() < TRANSFORM_LEN {
        return Err(FrameError::malformed(
            "TRANSFORM",
            format!("shorter than {TRANSFORM_LEN} bytes"),
        ));
    }
    let mut matrix = IDENTITY;
    for col in 0..4 {
        for row in matrix.iter_mut().take(3) {
            row[col] = src.get_f32();
        }
    }
    Ok(matrix)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Write `value` NUL-padded into a fixed-width field.
pub(crate) fn put_fixed_name(
    dst: &mut BytesMut,
    field: &'static str,
    value: &str,
    width: usize,
) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(FrameError::NameTooLong {
            field,
            len: bytes.len(),
            max: width,
        });
    }
    dst.put_slice(bytes);
    dst.put_bytes(0, width - bytes.len());
    Ok(())
}

/// Read a NUL-terminated (or field-filling) name.
pub(crate) fn read_fixed_name(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}
