use std::time::Duration;

/// Errors that can occur on a navigation connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] brpnav_transport::TransportError),

    /// Message framing error.
    #[error("frame error: {0}")]
    Frame(#[from] brpnav_frame::FrameError),

    /// No message arrived before the receive deadline.
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection.
    #[error("peer disconnected: {0}")]
    Disconnected(String),
}

impl ConnectionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
