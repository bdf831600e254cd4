//! Message type tags and status codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire name of the STRING message type.
pub const STRING: &str = "STRING";
/// Wire name of the STATUS message type.
pub const STATUS: &str = "STATUS";
/// Wire name of the TRANSFORM message type.
pub const TRANSFORM: &str = "TRANSFORM";
/// Wire name of the status query.
pub const GET_STATUS: &str = "GET_STATUS";
/// Wire name of the transform query (type names are capped at 12 bytes).
pub const GET_TRANSFORM: &str = "GET_TRANS";

/// Declared type of a message, taken from its header.
///
/// The set is closed over what a navigation session exchanges; anything
/// else is carried as [`MessageType::Other`] so that it can still be
/// skipped cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MessageType {
    String,
    Status,
    Transform,
    GetStatus,
    GetTransform,
    Other(String),
}

impl MessageType {
    /// Parse a wire type name.
    pub fn from_wire(name: &str) -> Self {
        match name {
            STRING => MessageType::String,
            STATUS => MessageType::Status,
            TRANSFORM => MessageType::Transform,
            GET_STATUS => MessageType::GetStatus,
            GET_TRANSFORM => MessageType::GetTransform,
            other => MessageType::Other(other.to_string()),
        }
    }

    /// Wire type name.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::String => STRING,
            MessageType::Status => STATUS,
            MessageType::Transform => TRANSFORM,
            MessageType::GetStatus => GET_STATUS,
            MessageType::GetTransform => GET_TRANSFORM,
            MessageType::Other(name) => name,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        value.as_str().to_string()
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        MessageType::from_wire(&value)
    }
}

/// STATUS message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum StatusCode {
    Invalid = 0,
    Ok = 1,
    UnknownError = 2,
    PanicMode = 3,
    NotFound = 4,
    AccessDenied = 5,
    Busy = 6,
    TimeOut = 7,
    Overflow = 8,
    ChecksumError = 9,
    ConfigError = 10,
    ResourceError = 11,
    UnknownInstruction = 12,
    NotReady = 13,
    ManualMode = 14,
    Disabled = 15,
    NotPresent = 16,
    UnknownVersion = 17,
    HardwareFailure = 18,
    ShutDown = 19,
}

impl StatusCode {
    const ALL: [StatusCode; 20] = [
        StatusCode::Invalid,
        StatusCode::Ok,
        StatusCode::UnknownError,
        StatusCode::PanicMode,
        StatusCode::NotFound,
        StatusCode::AccessDenied,
        StatusCode::Busy,
        StatusCode::TimeOut,
        StatusCode::Overflow,
        StatusCode::ChecksumError,
        StatusCode::ConfigError,
        StatusCode::ResourceError,
        StatusCode::UnknownInstruction,
        StatusCode::NotReady,
        StatusCode::ManualMode,
        StatusCode::Disabled,
        StatusCode::NotPresent,
        StatusCode::UnknownVersion,
        StatusCode::HardwareFailure,
        StatusCode::ShutDown,
    ];

    /// Numeric wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Look up a code by its wire value.
    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Protocol name of the code, e.g. `STATUS_OK`.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Invalid => "STATUS_INVALID",
            StatusCode::Ok => "STATUS_OK",
            StatusCode::UnknownError => "STATUS_UNKNOWN_ERROR",
            StatusCode::PanicMode => "STATUS_PANIC_MODE",
            StatusCode::NotFound => "STATUS_NOT_FOUND",
            StatusCode::AccessDenied => "STATUS_ACCESS_DENIED",
            StatusCode::Busy => "STATUS_BUSY",
            StatusCode::TimeOut => "STATUS_TIME_OUT",
            StatusCode::Overflow => "STATUS_OVERFLOW",
            StatusCode::ChecksumError => "STATUS_CHECKSUM_ERROR",
            StatusCode::ConfigError => "STATUS_CONFIG_ERROR",
            StatusCode::ResourceError => "STATUS_RESOURCE_ERROR",
            StatusCode::UnknownInstruction => "STATUS_UNKNOWN_INSTRUCTION",
            StatusCode::NotReady => "STATUS_NOT_READY",
            StatusCode::ManualMode => "STATUS_MANUAL_MODE",
            StatusCode::Disabled => "STATUS_DISABLED",
            StatusCode::NotPresent => "STATUS_NOT_PRESENT",
            StatusCode::UnknownVersion => "STATUS_UNKNOWN_VERSION",
            StatusCode::HardwareFailure => "STATUS_HARDWARE_FAILURE",
            StatusCode::ShutDown => "STATUS_SHUT_DOWN",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a raw status code, naming it when known.
pub fn describe_code(code: u16) -> String {
    match StatusCode::from_u16(code) {
        Some(known) => format!("{known} ({code})"),
        None => format!("unknown status {code}"),
    }
}
