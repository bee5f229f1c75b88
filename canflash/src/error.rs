//! Error types for canflash.

use crate::protocol::AppStatus;
use std::io;
use thiserror::Error;

/// Result type for canflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for canflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (CAN socket, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame identifier or payload does not fit a standard CAN frame.
    #[error("Invalid CAN frame: {0}")]
    InvalidFrame(String),

    /// Malformed Intel HEX input.
    #[error("Invalid HEX (line {line}): {reason}")]
    InvalidHex {
        /// 1-based line number of the offending record.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Image read outside `[min_address, max_address]`.
    #[error("Address {0:#010x} is outside the image")]
    AddressOutOfRange(u32),

    /// The bootloader never acknowledged the start-update command.
    #[error("{board}: bootloader did not start (no update ack)")]
    DidNotStart {
        /// Board name.
        board: String,
    },

    /// An erase-complete reply did not arrive within the timeout.
    #[error("{board}: flash erase did not complete")]
    EraseIncomplete {
        /// Board name.
        board: String,
    },

    /// Attempted to erase or program a write-protected sector.
    #[error("{board}: sector {sector} at {base_address:#010x} is write-protected")]
    WriteProtected {
        /// Board name.
        board: String,
        /// Sector id.
        sector: u8,
        /// Sector base address.
        base_address: u32,
    },

    /// No reply at all during a phase that requires one.
    #[error("{board}: device unresponsive during {phase}")]
    Unresponsive {
        /// Board name.
        board: String,
        /// Phase label.
        phase: &'static str,
    },

    /// Device reported something other than APP_VALID after an update.
    #[error("{board}: integrity check failed (device reported {status})")]
    IntegrityCheckFailed {
        /// Board name.
        board: String,
        /// Reported status.
        status: AppStatus,
    },

    /// Device reported something other than NO_APP after an erase.
    #[error("{board}: erase verification failed (device reported {status})")]
    EraseVerificationFailed {
        /// Board name.
        board: String,
        /// Reported status.
        status: AppStatus,
    },

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Unsupported operation on this platform or build.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the device stopped answering, as opposed to answering wrongly.
    pub fn is_unresponsive(&self) -> bool {
        matches!(
            self,
            Self::DidNotStart { .. } | Self::EraseIncomplete { .. } | Self::Unresponsive { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_name_the_board() {
        let err = Error::IntegrityCheckFailed {
            board: "FSM".into(),
            status: AppStatus::Invalid,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("FSM:"));
        assert!(msg.contains("APP_INVALID"));
    }

    #[test]
    fn test_unresponsive_classification() {
        assert!(Error::DidNotStart { board: "VC".into() }.is_unresponsive());
        assert!(
            Error::Unresponsive {
                board: "VC".into(),
                phase: "verify"
            }
            .is_unresponsive()
        );
        assert!(
            !Error::EraseVerificationFailed {
                board: "VC".into(),
                status: AppStatus::Valid
            }
            .is_unresponsive()
        );
    }

    #[test]
    fn test_write_protected_message() {
        let err = Error::WriteProtected {
            board: "BMS".into(),
            sector: 0,
            base_address: 0x0800_0000,
        };
        assert_eq!(
            err.to_string(),
            "BMS: sector 0 at 0x08000000 is write-protected"
        );
    }
}
