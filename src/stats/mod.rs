//! Uplink statistics shared between the engine and the CLI.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedUplinkLog, UplinkLog, UplinkStats,
};
