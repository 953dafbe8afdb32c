use crate::flags::MessageType;
use core::result::Result as CoreResult;
use thiserror::Error;

pub type Result<T> = CoreResult<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Invalid start bytes, expected CC 81, got {0:02X} {1:02X}")]
    InvalidStartBytes(u8, u8),
    #[error("Invalid package length {0}, at least 9 bytes are required")]
    InvalidLength(usize),
    #[error("Invalid checksum, expected {expected:#04x}, got {actual:#04x}")]
    InvalidChecksum { expected: u8, actual: u8 },
    #[error("Invalid end bytes, expected 0D 0A, got {0:02X} {1:02X}")]
    InvalidEndBytes(u8, u8),
    #[error("Unknown message type {0:#04x}")]
    UnknownMessageType(u8),
    #[error("Could not parse recieved data correctly: {0}")]
    InvalidData(&'static str),
    #[error("Payload of {0} bytes does not fit into a single package")]
    PayloadTooLong(usize),

    #[error("Recieved an unexpected type of response, expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Device refused {0}")]
    Refused(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Session is already closed")]
    Closed,
}

/// Coarse classification of [`Error`], telling the caller what has to be rebuilt after a failure
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// Underlying byte stream failed, session has to be recreated
    Transport,
    /// Byte stream is desynchronized, session has to be torn down
    Framing,
    /// A query got an answer of a different type, or the device turned a setting down
    ProtocolMismatch,
    /// Rejected before talking to the device
    Configuration,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            IOError(_) | Closed => ErrorKind::Transport,
            InvalidStartBytes(..)
            | InvalidLength(_)
            | InvalidChecksum { .. }
            | InvalidEndBytes(..)
            | UnknownMessageType(_)
            | InvalidData(_)
            | PayloadTooLong(_) => ErrorKind::Framing,
            UnexpectedResponse { .. } | Refused(_) => ErrorKind::ProtocolMismatch,
            InvalidConfig(_) => ErrorKind::Configuration,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(Error::from(io).kind(), ErrorKind::Transport);
        assert_eq!(
            Error::InvalidChecksum {
                expected: 1,
                actual: 2
            }
            .kind(),
            ErrorKind::Framing
        );
        assert_eq!(
            Error::UnexpectedResponse {
                expected: MessageType::GetRange,
                actual: MessageType::Stop
            }
            .kind(),
            ErrorKind::ProtocolMismatch
        );
        assert_eq!(Error::config("window").kind(), ErrorKind::Configuration);
    }
}
