use std::fmt;

use dsim_core::ClockError;

use super::TransportState;

/// Failures of a command transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The link is not in high speed clock mode
    NotReady(TransportState),
    InvalidArgument(String),
    /// The data id is not one the transport knows how to send
    UnsupportedType(u8),
    /// The bus did not complete in time. Caller may retry.
    CommandTimeout,
    /// Malformed response or an error report from the peripheral
    ProtocolError(String),
    /// The RX FIFO still held data after the response was consumed
    ResidualData,
    /// PHY power control failed
    Power(String),
    /// The link clock is not set up
    Clock(ClockError),
}

impl TransportError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportError::NotReady(_) => "NOT_READY",
            TransportError::InvalidArgument(_) => "INVALID_ARGUMENT",
            TransportError::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            TransportError::CommandTimeout => "COMMAND_TIMEOUT",
            TransportError::ProtocolError(_) => "PROTOCOL_ERROR",
            TransportError::ResidualData => "RESIDUAL_DATA",
            TransportError::Power(_) => "POWER",
            TransportError::Clock(e) => e.as_str(),
        }
    }

    /// The caller may reissue the same command
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::CommandTimeout)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotReady(state) => write!(f, "{}: not ready ({:?})", self.as_str(), state),
            TransportError::InvalidArgument(msg) => write!(f, "{}: {}", self.as_str(), msg),
            TransportError::UnsupportedType(id) => {
                write!(f, "{}: data id 0x{:02x} is not supported", self.as_str(), id)
            }
            TransportError::CommandTimeout => write!(f, "{}: command timed out", self.as_str()),
            TransportError::ProtocolError(msg) => write!(f, "{}: {}", self.as_str(), msg),
            TransportError::ResidualData => write!(f, "{}: RX FIFO is not empty", self.as_str()),
            TransportError::Power(msg) => write!(f, "{}: {}", self.as_str(), msg),
            TransportError::Clock(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Clock(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClockError> for TransportError {
    fn from(e: ClockError) -> Self {
        TransportError::Clock(e)
    }
}
