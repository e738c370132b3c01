use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::network::Network;

pub type Result<T> = std::result::Result<T, HandshakeError>;

/// EncodingError represents a failure while building, writing or parsing message bytes
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Failed to read or write buffer")]
    BufferIOError(#[from] std::io::Error),

    #[error("User agent is {0} bytes long, at most 255 fit the length prefix")]
    UserAgentTooLong(usize),

    #[error("Command name {0:?} does not fit in 12 bytes")]
    CommandTooLong(String),

    #[error("Invalid header size")]
    InvalidHeaderSize,

    #[error("Payload truncated: header announces {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    #[error("Failed on decode bytes")]
    DecodeError(#[from] std::array::TryFromSliceError),

    #[error("Failed to decode user agent")]
    DecodeUserAgentError(#[from] std::string::FromUtf8Error),
}

/// Phase names the step of the handshake an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    SendingVersion,
    AwaitingVersion,
    SendingVerack,
    AwaitingVerack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Connecting => "connecting",
            Phase::SendingVersion => "sending version",
            Phase::AwaitingVersion => "awaiting version",
            Phase::SendingVerack => "sending verack",
            Phase::AwaitingVerack => "awaiting verack",
        })
    }
}

/// Violation describes how a peer broke the handshake contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("expected {expected} but received {received:?}")]
    UnexpectedCommand {
        expected: &'static str,
        received: String,
    },

    #[error("magic {received:02x?} ({:?}) does not belong to {expected:?}", Network::from_magic(.received))]
    WrongNetwork { expected: Network, received: [u8; 4] },

    #[error("payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(u32),

    #[error("checksum mismatch for {command:?}")]
    InvalidChecksum { command: String },
}

///! HandshakeError is the typed outcome of every fatal path in the handshake
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Transport failure while {phase}: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoding failure while {phase}: {source}")]
    Encoding {
        phase: Phase,
        #[source]
        source: EncodingError,
    },

    #[error("Protocol violation while {phase}: {violation}")]
    ProtocolViolation { phase: Phase, violation: Violation },

    #[error("Timed out after {timeout:?} while {phase}")]
    HandshakeTimeout { phase: Phase, timeout: Duration },
}

impl HandshakeError {
    pub(crate) fn transport(phase: Phase) -> impl FnOnce(std::io::Error) -> Self {
        move |source| HandshakeError::Transport { phase, source }
    }

    pub(crate) fn encoding(phase: Phase) -> impl FnOnce(EncodingError) -> Self {
        move |source| HandshakeError::Encoding { phase, source }
    }

    pub(crate) fn violation(phase: Phase) -> impl FnOnce(Violation) -> Self {
        move |violation| HandshakeError::ProtocolViolation { phase, violation }
    }

    /// The phase the error was raised in
    pub fn phase(&self) -> Phase {
        match self {
            HandshakeError::Transport { phase, .. }
            | HandshakeError::Encoding { phase, .. }
            | HandshakeError::ProtocolViolation { phase, .. }
            | HandshakeError::HandshakeTimeout { phase, .. } => *phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_names_phase() {
        let err = HandshakeError::ProtocolViolation {
            phase: Phase::AwaitingVersion,
            violation: Violation::UnexpectedCommand {
                expected: "version",
                received: "ping".into(),
            },
        };

        assert_eq!(
            err.to_string(),
            "Protocol violation while awaiting version: expected version but received \"ping\""
        );
        assert_eq!(err.phase(), Phase::AwaitingVersion);
    }

    #[test]
    fn test_transport_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = HandshakeError::transport(Phase::SendingVerack)(io);

        assert!(matches!(
            &err,
            HandshakeError::Transport { phase: Phase::SendingVerack, source }
                if source.kind() == std::io::ErrorKind::ConnectionReset
        ));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_encoding_names_phase() {
        let err = HandshakeError::encoding(Phase::SendingVersion)(EncodingError::UserAgentTooLong(256));

        assert_eq!(err.phase(), Phase::SendingVersion);
        assert_eq!(
            err.to_string(),
            "Encoding failure while sending version: User agent is 256 bytes long, at most 255 fit the length prefix"
        );
    }

    #[test]
    fn test_wrong_network_names_foreign_network() {
        let violation = Violation::WrongNetwork {
            expected: Network::RegTest,
            received: Network::MainNet.magic(),
        };

        assert_eq!(
            violation.to_string(),
            "magic [f9, be, b4, d9] (Some(MainNet)) does not belong to RegTest"
        );
    }
}
