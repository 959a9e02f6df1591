//! Error types shared by the backend session and the frontend supervisor

use thiserror::Error;

/// Failures that can surface while a session or supervisor is running
#[derive(Error, Debug)]
pub enum Error {
    /// Socket I/O failed; the connection it happened on is finished
    #[error("Connection lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    /// No usable capture device (or the capture component was shut down)
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Answer generation or transcription failed
    #[error("Answer provider failure: {0}")]
    ProviderFailure(String),

    /// Peer sent something out of order or undecodable
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The backend did not greet us with the readiness token
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the owning process can keep going after this error.
    ///
    /// Only configuration problems are fatal; everything else is handled by
    /// replying to the peer, resetting the connection, or logging.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::ConnectionLost(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(Error::DeviceUnavailable("none".into()).is_recoverable());
        assert!(Error::ProviderFailure("timeout".into()).is_recoverable());
        assert!(Error::ProtocolViolation("early".into()).is_recoverable());
        assert!(Error::HandshakeFailed("eof".into()).is_recoverable());
        assert!(Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_recoverable());
        assert!(!Error::Config("bad port".into()).is_recoverable());
    }

    #[test]
    fn test_io_errors_map_to_connection_lost() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::ConnectionReset).into();
        assert!(matches!(err, Error::ConnectionLost(_)));
        assert!(err.to_string().starts_with("Connection lost"));
    }
}
