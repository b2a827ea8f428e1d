//! Radio link boundary: the transmitter trait, stack events, the payload
//! codec and a simulated duty-cycled radio.

pub mod payload;
pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use payload::{decode_payload, encode_payload, parse_hex, to_hex, PayloadError};
pub use simulated::{RadioConfig, SimulatedRadio, Uplink};
pub use types::{Downlink, MessageFlags, RadioEvent, Transmitter, TxError};
