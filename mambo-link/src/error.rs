use crate::flight::{FlightIntent, FlightState};
use crate::frame::{Channel, RawFrame};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure to parse bytes received from the aircraft
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Truncated frame: {needed} bytes needed, {actual} available")]
    Truncated { needed: usize, actual: usize },
    #[error("Unknown frame kind: {0}")]
    UnknownKind(RawFrame),
    #[error("Payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Invalid frame type {0:#04x}")]
    InvalidFrameType(u8),
}

/// Frame that cannot be put on the wire
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum EncodeError {
    #[error("{0:?} does not carry commands")]
    NotACommandChannel(Channel),
}

/// Reasons a flight intent did not complete
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CommandFailed {
    #[error("{intent:?} is not allowed while {state:?}")]
    IllegalState {
        intent: FlightIntent,
        state: FlightState,
    },
    #[error("No ack for sequence {sequence} on {channel:?} after {attempts} attempts")]
    AckTimeout {
        channel: Channel,
        sequence: u8,
        attempts: u32,
    },
    #[error("Discarded by an emergency stop before being sent")]
    Preempted,
    #[error("Aircraft did not report {expected:?} within {timeout:?}")]
    NotConfirmed {
        expected: FlightState,
        timeout: std::time::Duration,
    },
}

/// Errors reported by the radio transport behind a [crate::LinkGateway]
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Write on {channel:?} failed: {reason}")]
    WriteFailed { channel: Channel, reason: String },
    #[error("Subscribe to {channel:?} failed: {reason}")]
    SubscribeFailed { channel: Channel, reason: String },
    #[error("Transport not connected")]
    NotConnected,
}

/// Malformed or unexpected inbound bytes. Never fatal to the session.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Protocol warning on {channel:?} ({bytes}): {error}")]
pub struct ProtocolWarning {
    pub channel: Channel,
    /// Hex dump of the offending bytes
    pub bytes: String,
    pub error: DecodeError,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Command failed: {0}")]
    Command(CommandFailed),
    #[error("Link error: {0}")]
    Link(LinkError),
    #[error("Decode error: {0}")]
    Decode(DecodeError),
    #[error("Encode error: {0}")]
    Encode(EncodeError),
    #[error("Disconnected: {0}")]
    Disconnected(String),
    #[error("Uplink queue full")]
    QueueFull,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Cannot spawn engine task: {0}")]
    Spawn(String),
}

impl From<CommandFailed> for Error {
    fn from(error: CommandFailed) -> Self {
        Error::Command(error)
    }
}

impl From<LinkError> for Error {
    fn from(error: LinkError) -> Self {
        Error::Link(error)
    }
}

impl From<DecodeError> for Error {
    fn from(error: DecodeError) -> Self {
        Error::Decode(error)
    }
}

impl From<EncodeError> for Error {
    fn from(error: EncodeError) -> Self {
        Error::Encode(error)
    }
}

impl From<futures::task::SpawnError> for Error {
    fn from(error: futures::task::SpawnError) -> Self {
        Error::Spawn(error.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(error: std::num::ParseIntError) -> Self {
        Error::InvalidConfig(error.to_string())
    }
}
