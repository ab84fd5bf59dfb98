//! # Bridge Error Types
//!
//! Every fault the bridge can report. Decode faults drop one frame, transport
//! faults end the session, and nothing here is ever a panic.

use thiserror::Error;

use tether_shared::ObjectHandle;

/// A frame that could not be decoded. The frame is dropped and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame (or one bundle member) had no command name.
    #[error("empty command")]
    EmptyCommand,

    /// A bundle or binary header timestamp was not an integer.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// A binary frame had no ETX byte ending its ASCII header.
    #[error("binary frame has no header terminator")]
    MissingHeaderTerminator,

    /// A binary header was not `timestamp STX command`.
    #[error("malformed binary header: {0:?}")]
    MalformedBinaryHeader(String),

    /// The text part of a frame was not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// A handle argument was neither an alias nor a decimal integer.
    #[error("invalid handle: {0:?}")]
    InvalidHandle(String),

    /// A numeric argument could not be parsed.
    #[error("invalid number {value:?} in {context}")]
    InvalidNumber {
        /// Where the number appeared.
        context: &'static str,
        /// The offending text.
        value: String,
    },

    /// A command carried fewer arguments than it needs.
    #[error("{command}: expected at least {expected} arguments, got {got}")]
    MissingArguments {
        /// Command name.
        command: String,
        /// Required argument count.
        expected: usize,
        /// Arguments present.
        got: usize,
    },

    /// A geometry aspect name was not one of the six known ones.
    #[error("unknown geometry aspect {0:?}")]
    UnknownAspect(String),

    /// A vector had the wrong number of components.
    #[error("{aspect}: expected {expected} components, got {got}")]
    WrongArity {
        /// Aspect being parsed.
        aspect: &'static str,
        /// Expected component count.
        expected: usize,
        /// Components present.
        got: usize,
    },

    /// A binary geometry record's header promised more floats than remain.
    #[error("truncated geometry record for handle {handle}: need {needed} bytes, {remaining} left")]
    TruncatedRecord {
        /// Handle from the record header.
        handle: ObjectHandle,
        /// Bytes the header requires.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// Fewer than four bytes remain where a record header should start.
    #[error("trailing {0} bytes do not form a geometry record header")]
    TrailingBytes(usize),

    /// An object spec was not valid JSON.
    #[error("invalid object spec: {0}")]
    InvalidObjectSpec(String),
}

/// Faults of the socket layer. Any of these ends the session.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Underlying socket error.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// A frame length exceeded the configured limit.
    #[error("frame of {len} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Announced length.
        len: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The frame kind byte was not text or binary.
    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u8),

    /// Sending was attempted with no live connection.
    #[error("not connected")]
    NotConnected,
}

/// Invalid or unreadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config was not valid TOML for [`crate::BridgeConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Umbrella error for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Frame decode fault.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Transport fault.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration fault.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The command queue hit its configured bound; the message was dropped.
    #[error("command queue full ({limit} pending), dropped {command} for handle {handle}")]
    QueueFull {
        /// Handle the message was addressed to.
        handle: ObjectHandle,
        /// Dropped command.
        command: String,
        /// Configured bound.
        limit: usize,
    },

    /// The handle space of the geometry header is exhausted.
    #[error("object handles exhausted")]
    HandlesExhausted,

    /// The session was asked to proceed before the handshake completed.
    #[error("session not established")]
    SessionNotReady,
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
