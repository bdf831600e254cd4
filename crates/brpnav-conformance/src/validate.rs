//! Message validators.
//!
//! Each validator checks a received header against an [`Expected`]
//! descriptor, consumes the body from the connection whatever the outcome,
//! and then compares the payload. The first failing condition is returned
//! as a [`Mismatch`].

use std::fmt;

use brpnav_frame::types::describe_code;
use brpnav_frame::{Body, Matrix4x4, MessageHeader, MessageType, StatusBody, StatusCode, StringBody};
use brpnav_peer::{Connection, ConnectionError};
use tracing::debug;

use crate::matrix::{compare, format_matrix, max_difference, MatrixCheck, MatrixDefect};

/// Why a received message did not meet its expectation.
#[derive(Debug, thiserror::Error)]
pub enum Mismatch {
    #[error("expected {expected} message, received {actual}")]
    WrongType {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("expected name {}'{expected}', received '{actual}'", prefix_label(.prefix))]
    WrongName {
        expected: String,
        actual: String,
        prefix: bool,
    },

    #[error("expected text '{expected}', received '{actual}'")]
    WrongText { expected: String, actual: String },

    #[error("expected status {}, received {}", code_label(.expected), code_label(.actual))]
    WrongCode { expected: u16, actual: u16 },

    #[error("expected error name '{expected}', received {actual:?}")]
    WrongErrorName {
        expected: String,
        actual: Option<String>,
    },

    #[error("matrix differs by {max_difference:.3e} (tolerance {tolerance:.3e})")]
    MatrixMismatch { max_difference: f64, tolerance: f64 },

    #[error("ill-formed matrix: {0}")]
    IllFormedMatrix(#[from] MatrixDefect),

    #[error("position is {distance:.3} mm from target (tolerance {tolerance:.3} mm)")]
    OutOfReach { distance: f64, tolerance: f64 },

    #[error("rotation differs from target by {max_difference:.3e} (tolerance {tolerance:.3e})")]
    WrongOrientation { max_difference: f64, tolerance: f64 },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

fn prefix_label(prefix: &bool) -> &'static str {
    if *prefix {
        "prefix "
    } else {
        ""
    }
}

fn code_label(code: &u16) -> String {
    describe_code(*code)
}

impl Mismatch {
    /// True when the failure was a receive deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Mismatch::Connection(err) if err.is_timeout())
    }
}

/// Expected message type and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    pub message_type: MessageType,
    pub name: String,
    /// Compare only the leading `name.len()` bytes of the received name.
    pub prefix: bool,
}

impl Expected {
    pub fn new(message_type: MessageType, name: impl Into<String>) -> Self {
        Self {
            message_type,
            name: name.into(),
            prefix: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(MessageType::String, name)
    }

    pub fn status(name: impl Into<String>) -> Self {
        Self::new(MessageType::Status, name)
    }

    pub fn transform(name: impl Into<String>) -> Self {
        Self::new(MessageType::Transform, name)
    }

    /// Accept any received name starting with this descriptor's name.
    pub fn with_prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn name_matches(&self, received: &str) -> bool {
        if self.prefix {
            received.starts_with(&self.name)
        } else {
            received == self.name
        }
    }

    fn check_type(&self, header: &MessageHeader) -> Result<(), Mismatch> {
        if header.message_type == self.message_type {
            Ok(())
        } else {
            Err(Mismatch::WrongType {
                expected: self.message_type.clone(),
                actual: header.message_type.clone(),
            })
        }
    }

    fn check_name(&self, header: &MessageHeader) -> Result<(), Mismatch> {
        if self.name_matches(&header.device_name) {
            Ok(())
        } else {
            Err(Mismatch::WrongName {
                expected: self.name.clone(),
                actual: header.device_name.clone(),
                prefix: self.prefix,
            })
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wildcard = if self.prefix { "*" } else { "" };
        write!(f, "{}({}{wildcard})", self.message_type, self.name)
    }
}

/// Status fields that gate acceptance. Subcode never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusExpectation {
    pub code: StatusCode,
    pub error_name: Option<String>,
}

impl StatusExpectation {
    pub fn ok() -> Self {
        Self::code(StatusCode::Ok)
    }

    pub fn code(code: StatusCode) -> Self {
        Self {
            code,
            error_name: None,
        }
    }

    pub fn with_error_name(mut self, error_name: impl Into<String>) -> Self {
        self.error_name = Some(error_name.into());
        self
    }
}

/// Check a decoded STRING message.
pub fn check_string(
    header: &MessageHeader,
    body: Body,
    expected: &Expected,
    text: &str,
) -> Result<StringBody, Mismatch> {
    expected.check_type(header)?;
    expected.check_name(header)?;
    let Body::String(string) = body else {
        return Err(body_type_mismatch(&MessageType::String, &body));
    };
    if string.text != text {
        return Err(Mismatch::WrongText {
            expected: text.to_string(),
            actual: string.text,
        });
    }
    Ok(string)
}

/// Check a decoded STATUS message.
pub fn check_status(
    header: &MessageHeader,
    body: Body,
    expected: &Expected,
    status: &StatusExpectation,
) -> Result<StatusBody, Mismatch> {
    expected.check_type(header)?;
    expected.check_name(header)?;
    let Body::Status(received) = body else {
        return Err(body_type_mismatch(&MessageType::Status, &body));
    };
    if received.code != status.code.as_u16() {
        return Err(Mismatch::WrongCode {
            expected: status.code.as_u16(),
            actual: received.code,
        });
    }
    if let Some(error_name) = &status.error_name {
        if received.error_name.as_deref() != Some(error_name.as_str()) {
            return Err(Mismatch::WrongErrorName {
                expected: error_name.clone(),
                actual: received.error_name,
            });
        }
    }
    Ok(received)
}

/// Check a decoded TRANSFORM message.
pub fn check_transform(
    header: &MessageHeader,
    body: Body,
    expected: &Expected,
    matrix: &Matrix4x4,
    check: MatrixCheck,
) -> Result<Matrix4x4, Mismatch> {
    expected.check_type(header)?;
    expected.check_name(header)?;
    let Body::Transform(received) = body else {
        return Err(body_type_mismatch(&MessageType::Transform, &body));
    };
    if let Some(tolerance) = check.tolerance() {
        if !compare(&received, matrix, tolerance) {
            debug!(
                "expected matrix:\n{}\nreceived matrix:\n{}",
                format_matrix(matrix),
                format_matrix(&received)
            );
            return Err(Mismatch::MatrixMismatch {
                max_difference: max_difference(&received, matrix),
                tolerance,
            });
        }
    }
    Ok(received)
}

/// Receive the body for `header` and check it as a STRING message.
pub fn receive_string(
    conn: &mut Connection,
    header: &MessageHeader,
    expected: &Expected,
    text: &str,
) -> Result<StringBody, Mismatch> {
    let body = take_body(conn, header, expected)?;
    check_string(header, body, expected, text)
}

/// Receive the body for `header` and check it as a STATUS message.
pub fn receive_status(
    conn: &mut Connection,
    header: &MessageHeader,
    expected: &Expected,
    status: &StatusExpectation,
) -> Result<StatusBody, Mismatch> {
    let body = take_body(conn, header, expected)?;
    check_status(header, body, expected, status)
}

/// Receive the body for `header` and check it as a TRANSFORM message.
pub fn receive_transform(
    conn: &mut Connection,
    header: &MessageHeader,
    expected: &Expected,
    matrix: &Matrix4x4,
    check: MatrixCheck,
) -> Result<Matrix4x4, Mismatch> {
    let body = take_body(conn, header, expected)?;
    check_transform(header, body, expected, matrix, check)
}

/// Consume the body. A body of the wrong type is skipped undecoded.
fn take_body(
    conn: &mut Connection,
    header: &MessageHeader,
    expected: &Expected,
) -> Result<Body, Mismatch> {
    if let Err(mismatch) = expected.check_type(header) {
        if let Err(err) = conn.skip_body(header) {
            debug!(error = %err, "could not skip unexpected body");
        }
        return Err(mismatch);
    }
    Ok(conn.receive_body(header)?)
}

fn body_type_mismatch(expected: &MessageType, body: &Body) -> Mismatch {
    Mismatch::WrongType {
        expected: expected.clone(),
        actual: body.message_type(),
    }
}
