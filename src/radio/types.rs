//! Radio link types consumed by the engine.

use serde::{Deserialize, Serialize};

/// Delivery mode of an uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageFlags {
    /// Fire and forget; no network acknowledgement requested
    Unconfirmed,
    /// Network acknowledgement requested
    Confirmed,
}

/// Reasons the radio stack refuses to queue a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Duty-cycle restriction in force; retry later
    WouldBlock,
    /// The stack is busy with another operation
    Busy,
    /// No network session has been joined
    NotConnected,
    /// Application port outside the allowed range
    PortInvalid(u8),
    /// Payload exceeds the current maximum frame size
    PayloadTooLarge { size: usize, max: usize },
    /// Any other stack status code
    Other(i32),
}

impl TxError {
    /// Stack status code for reports.
    pub fn code(&self) -> i32 {
        match self {
            TxError::Busy => -1000,
            TxError::WouldBlock => -1001,
            TxError::NotConnected => -1009,
            TxError::PayloadTooLarge { .. } => -1010,
            TxError::PortInvalid(_) => -1015,
            TxError::Other(code) => *code,
        }
    }

    /// Only a duty-cycle rejection is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxError::WouldBlock)
    }
}

impl std::fmt::Display for TxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxError::WouldBlock => write!(f, "Duty cycle violation"),
            TxError::Busy => write!(f, "Radio stack busy"),
            TxError::NotConnected => write!(f, "No active network session"),
            TxError::PortInvalid(port) => write!(f, "Invalid application port {port}"),
            TxError::PayloadTooLarge { size, max } => {
                write!(f, "Payload of {size} bytes exceeds maximum of {max}")
            }
            TxError::Other(code) => write!(f, "Error code {code}"),
        }
    }
}

impl std::error::Error for TxError {}

/// A frame sent by the network server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downlink {
    pub port: u8,
    pub payload: Vec<u8>,
    pub flags: MessageFlags,
}

/// Uplink sink.
///
/// `send` returns as soon as the stack has queued (or refused) the frame;
/// delivery is reported later through a [`RadioEvent`]. Receive failures use
/// the same stack status codes as send failures.
pub trait Transmitter {
    fn send(&mut self, port: u8, payload: &[u8], flags: MessageFlags) -> Result<usize, TxError>;

    /// Take the downlink announced by [`RadioEvent::RxDone`].
    ///
    /// Stacks without a receive path report `WouldBlock`, meaning nothing is
    /// waiting.
    fn receive(&mut self) -> Result<Downlink, TxError> {
        Err(TxError::WouldBlock)
    }
}

impl<T: Transmitter + ?Sized> Transmitter for Box<T> {
    fn send(&mut self, port: u8, payload: &[u8], flags: MessageFlags) -> Result<usize, TxError> {
        (**self).send(port, payload, flags)
    }

    fn receive(&mut self) -> Result<Downlink, TxError> {
        (**self).receive()
    }
}

/// Events delivered asynchronously by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioEvent {
    Connected,
    Disconnected,
    TxDone,
    TxTimeout,
    TxError,
    TxCryptoError,
    TxSchedulingError,
    RxDone,
    RxTimeout,
    RxError,
    JoinFailure,
    UplinkRequired,
}

impl RadioEvent {
    /// Transmission failed after having been queued.
    pub fn is_tx_failure(&self) -> bool {
        matches!(
            self,
            RadioEvent::TxTimeout
                | RadioEvent::TxError
                | RadioEvent::TxCryptoError
                | RadioEvent::TxSchedulingError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_would_block_is_retryable() {
        assert!(TxError::WouldBlock.is_retryable());
        assert!(!TxError::Busy.is_retryable());
        assert!(!TxError::NotConnected.is_retryable());
        assert!(!TxError::Other(-1).is_retryable());
    }

    #[test]
    fn test_tx_error_display() {
        assert_eq!(TxError::WouldBlock.to_string(), "Duty cycle violation");
        assert_eq!(TxError::Other(-7).to_string(), "Error code -7");
        assert_eq!(TxError::Other(-7).code(), -7);
    }

    #[test]
    fn test_tx_failure_events() {
        assert!(RadioEvent::TxTimeout.is_tx_failure());
        assert!(RadioEvent::TxCryptoError.is_tx_failure());
        assert!(!RadioEvent::TxDone.is_tx_failure());
        assert!(!RadioEvent::RxError.is_tx_failure());
    }
}
