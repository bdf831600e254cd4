use std::fmt;
use std::io;

use brpnav_conformance::{ConfigError, FailureKind};
use brpnav_frame::FrameError;
use brpnav_peer::ConnectionError;
use brpnav_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
/// The robot controller deviated from the workflow.
pub const CONFORMANCE_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Exit status for a failed conformance run.
pub fn failure_code(kind: FailureKind) -> i32 {
    match kind {
        FailureKind::Validation => CONFORMANCE_FAILED,
        FailureKind::Timeout => TIMEOUT,
        FailureKind::Transport => TRANSPORT_ERROR,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotFound
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidEndpoint { .. } | TransportError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        FrameError::NoPendingBody(_) | FrameError::NameTooLong { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn connection_error(context: &str, err: ConnectionError) -> CliError {
    match err {
        ConnectionError::Transport(err) => transport_error(context, err),
        ConnectionError::Frame(err) => frame_error(context, err),
        ConnectionError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ConnectionError::Disconnected(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { ref source, .. } if source.kind() == io::ErrorKind::NotFound => {
            CliError::new(USAGE, err.to_string())
        }
        ConfigError::Io { .. } => CliError::new(FAILURE, err.to_string()),
        ConfigError::Parse { .. } | ConfigError::Invalid(_) => {
            CliError::new(DATA_INVALID, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn failure_kinds_have_distinct_codes() {
        assert_eq!(failure_code(FailureKind::Validation), CONFORMANCE_FAILED);
        assert_eq!(failure_code(FailureKind::Timeout), TIMEOUT);
        assert_eq!(failure_code(FailureKind::Transport), TRANSPORT_ERROR);
    }

    #[test]
    fn connection_errors_map_to_codes() {
        let timeout = connection_error("receive", ConnectionError::Timeout(Duration::from_secs(2)));
        assert_eq!(timeout.code, TIMEOUT);
        assert!(timeout.message.starts_with("receive: "));

        let refused = connection_error(
            "connect",
            ConnectionError::Transport(TransportError::Io(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            ))),
        );
        assert_eq!(refused.code, TRANSPORT_ERROR);

        let checksum = connection_error(
            "receive",
            ConnectionError::Frame(FrameError::ChecksumMismatch {
                expected: 1,
                actual: 2,
            }),
        );
        assert_eq!(checksum.code, DATA_INVALID);
    }

    #[test]
    fn invalid_config_is_data_invalid() {
        let err = config_error(ConfigError::Invalid("reach_tolerance".to_string()));
        assert_eq!(err.code, DATA_INVALID);
    }
}
