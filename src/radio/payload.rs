//! Uplink payload codec.
//!
//! The payload is the tally itself: one byte per slot, categories first, then
//! anomaly, then uncertain.

use crate::core::aggregate::Tally;

/// Payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Length is not `label_count + 2`
    Length { expected: usize, actual: usize },
    /// Hex text is malformed
    Hex(String),
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::Length { expected, actual } => {
                write!(f, "Payload length {actual} does not match expected {expected}")
            }
            PayloadError::Hex(msg) => write!(f, "Invalid hex payload: {msg}"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Serialize a tally for transmission.
pub fn encode_payload(tally: &Tally) -> Vec<u8> {
    tally.counts().to_vec()
}

/// Decode a payload produced for a model with `label_count` categories.
pub fn decode_payload(bytes: &[u8], label_count: usize) -> Result<Tally, PayloadError> {
    let expected = label_count + 2;
    if bytes.len() != expected {
        return Err(PayloadError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Tally::from_counts(bytes.to_vec()).ok_or(PayloadError::Length {
        expected,
        actual: bytes.len(),
    })
}

/// Lowercase hex rendering, as shown by network-server consoles.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse hex text; whitespace between bytes is ignored.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, PayloadError> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        return Err(PayloadError::Hex("non-ASCII characters".to_string()));
    }
    if digits.len() % 2 != 0 {
        return Err(PayloadError::Hex("odd number of digits".to_string()));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| PayloadError::Hex(format!("'{}': {e}", &digits[i..i + 2])))
        })
        .collect()
}
