//! Error types shared across the hindsight crate.

use std::fmt;

/// Error type for encoding and decoding values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A `Ref`'s type name could not be resolved to a registered constructor.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// An incoming `Ref` does not match the cached shape for its type.
    #[error("shape mismatch for {type_name}: {reason}")]
    ShapeMismatch { type_name: String, reason: String },

    /// A value cannot be represented in the value model.
    #[error("unsupported value: {0}")]
    Unsupported(String),

    /// Wire JSON that does not map back to a value tree.
    #[error("malformed wire value: {0}")]
    MalformedWire(String),

    /// Catch-all for serde-originated messages.
    #[error("{0}")]
    Message(String),
}

impl serde::ser::Error for CodecError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CodecError::Message(msg.to_string())
    }
}

impl serde::de::Error for CodecError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CodecError::Message(msg.to_string())
    }
}

/// Error type for the wire protocol and its transport.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Underlying socket failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame arrived that is not a valid envelope.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String, raw: String },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Line framing failure (oversized or invalid line).
    #[error("framing error: {0}")]
    Framing(String),
}

/// Error type for debug session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server is not running, so the operation has nothing to act on.
    #[error("debug server is not running")]
    NotRunning,

    /// The server is already running.
    #[error("debug server is already running on {0}")]
    AlreadyRunning(String),

    /// No attached component with the given id.
    #[error("component not attached: {0}")]
    UnknownComponent(String),

    /// Failed to bind or operate the listener.
    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Filter(#[from] crate::filter::FilterError),
}

/// Failure produced by a command resolver.
///
/// Never fatal to the runtime: the resolver's `recover` hook maps it back into
/// an application message.
#[derive(Debug, thiserror::Error)]
#[error("command resolution failed: {reason}")]
pub struct ResolveError {
    pub reason: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl ResolveError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(reason: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            reason: reason.into(),
            source: Some(source),
        }
    }
}

/// Error type for the component runtime itself.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The component's event loop has stopped; no further messages accepted.
    #[error("component is not running")]
    NotRunning,
}
