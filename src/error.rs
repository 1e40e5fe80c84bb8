//! Error types shared by the planner, the codecs and the emitters.

use thiserror::Error;

/// Errors raised while accepting a schema, planning layouts, emitting code or
/// running a codec.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A signal's bit range does not fit its message, or collides with an
    /// earlier signal.
    #[error("layout overflow in message '{message}', signal '{signal}': {reason}")]
    LayoutOverflow {
        message: String,
        signal: String,
        reason: String,
    },

    /// Decode was handed fewer bytes than the message declares.
    #[error("truncated frame 0x{frame_id:x}: expected {expected} bytes, got {actual}")]
    TruncatedFrame {
        frame_id: u32,
        expected: usize,
        actual: usize,
    },

    /// No codec is registered for the frame identifier.
    #[error("unknown message with frame id 0x{frame_id:x}")]
    UnknownMessage { frame_id: u32 },

    /// Frame id or payload length outside what CAN allows.
    #[error("invalid message '{message}': {reason}")]
    InvalidMessage { message: String, reason: String },

    #[error("signal '{signal}' in message '{message}' has a scale of zero")]
    InvalidScale { message: String, signal: String },

    #[error("invalid signal '{signal}' in message '{message}': {reason}")]
    InvalidSignal {
        message: String,
        signal: String,
        reason: String,
    },

    /// A declared choice value cannot be represented by the signal's bits.
    #[error("choice {value} ('{name}') of signal '{signal}' in message '{message}' is not representable")]
    InvalidChoice {
        message: String,
        signal: String,
        value: i128,
        name: String,
    },

    #[error("signal '{signal}' has no choice named '{name}'")]
    UnknownChoice { signal: String, name: String },

    #[error("frame id 0x{frame_id:x} is used by both '{first}' and '{second}'")]
    DuplicateFrameId {
        frame_id: u32,
        first: String,
        second: String,
    },

    #[error("failed to format generated source")]
    Format(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, CodegenError>;
