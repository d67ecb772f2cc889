//! Error types shared across the server.

use thiserror::Error;

/// Failures of the fixed-width address codecs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be 4 bytes, got {0}")]
    InvalidLength(usize),
    #[error("255.255.255.255 has no successor")]
    Overflow,
    #[error("invalid hardware address: {0}")]
    InvalidHardwareAddress(String),
}

/// Reasons a datagram could not be decoded or a message could not be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("datagram too short: {0} bytes (minimum 236)")]
    Truncated(usize),
    #[error("option {code} runs past the end of the datagram")]
    OptionOverrun { code: u8 },
    #[error("invalid operation code {0}")]
    InvalidOperation(u8),
    #[error("option {0} occurs more than once")]
    DuplicateOption(u8),
    #[error("option {0} is a framing marker and cannot be set")]
    ReservedOption(u8),
    #[error("option {code} payload of {len} bytes exceeds 255")]
    OptionTooLong { code: u8, len: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("lease snapshot I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("lease snapshot format: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure while handling a single datagram. Terminates that worker only.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("failed parsing packet: {0}")]
    Message(#[from] MessageError),
    #[error("failed to send reply: {0}")]
    Send(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("bind error: {0}")]
    Bind(#[source] std::io::Error),
}
