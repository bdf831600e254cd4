/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header could not be parsed.
    #[error("invalid message header: {0}")]
    InvalidHeader(String),

    /// The header declares a protocol version this codec does not speak.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    /// A fixed-width name field overflowed.
    #[error("{field} too long ({len} bytes, max {max})")]
    NameTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// The body exceeds the configured maximum size.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: u64, max: usize },

    /// The body CRC does not match the header.
    #[error("body checksum mismatch (header {expected:#018x}, computed {actual:#018x})")]
    ChecksumMismatch { expected: u64, actual: u64 },

    /// The body does not decode as the declared message type.
    #[error("malformed {message_type} body: {reason}")]
    MalformedBody {
        message_type: String,
        reason: String,
    },

    /// A body was requested that does not belong to the last header read.
    #[error("no body pending for {0}")]
    NoPendingBody(String),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

impl FrameError {
    pub(crate) fn malformed(message_type: impl Into<String>, reason: impl Into<String>) -> Self {
        FrameError::MalformedBody {
            message_type: message_type.into(),
            reason: reason.into(),
        }
    }

    /// True when the error is a read/write deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

impl From<brpnav_transport::TransportError> for FrameError {
    fn from(err: brpnav_transport::TransportError) -> Self {
        match err.io_source() {
            Some(io) => FrameError::Io(std::io::Error::new(io.kind(), err.to_string())),
            None => FrameError::Io(std::io::Error::other(err.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
