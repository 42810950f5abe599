use std::io;

use thiserror::Error;

/// Result type used across this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the IPMB stack.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the physical layer (I2C device, sysfs queue, etc.).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// No response arrived before the read deadline.
    #[error("no response before the read deadline")]
    Timeout,

    /// The connection header checksum of an inbound frame did not match.
    #[error("invalid IPMB header checksum")]
    HeaderChecksum,

    /// The trailing message checksum of an inbound frame did not match.
    #[error("invalid IPMB message checksum")]
    MessageChecksum,

    /// A frame or message was malformed.
    #[error("malformed IPMB message: {0}")]
    Protocol(&'static str),

    /// Invalid caller-supplied argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A bounded mutex acquisition expired.
    #[error("failed to lock mutex in time")]
    MutexLock,

    /// The bus index is not configured or not enabled.
    #[error("unknown or disabled IPMB bus index {0}")]
    UnknownBus(usize),

    /// A queue's other end has gone away (engine shut down).
    #[error("queue closed")]
    QueueClosed,

    /// Unsupported configuration or interface.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// An IPMI command completed with a non-zero completion code.
    #[error("responder returned completion code {completion_code:#04x}")]
    CompletionCode {
        /// Raw completion code returned by the responder.
        completion_code: u8,
    },
}
