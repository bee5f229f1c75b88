//! CAN bootloader protocol definitions.
//!
//! ## Message Identifiers
//!
//! Start-update and update-ack identifiers are per board (see
//! [`Board`](crate::target::Board)). Everything else is shared by every
//! bootloader on the bus:
//!
//! ```text
//! +------+-----------------+-----------+------------------------------+
//! |  ID  | Purpose         | Direction | Payload                      |
//! +------+-----------------+-----------+------------------------------+
//! | 1100 | erase sector    | host->dev | sector id (1 byte)           |
//! | 1101 | program         | host->dev | data (8 bytes)               |
//! | 1102 | verify          | host->dev | empty                        |
//! | 1110 | erase complete  | dev->host | empty                        |
//! | 1111 | app validity    | dev->host | status (1 byte)              |
//! | 1112 | lost packet     | both      | chunk index LE (2) / data (8)|
//! +------+-----------------+-----------+------------------------------+
//! ```

pub mod wait;

use std::fmt;

/// Erase one flash sector.
pub const ERASE_SECTOR_CAN_ID: u16 = 1100;

/// Program 8 bytes at the next address.
pub const PROGRAM_CAN_ID: u16 = 1101;

/// Ask the bootloader to checksum the application.
pub const VERIFY_CAN_ID: u16 = 1102;

/// Sector erase finished.
pub const ERASE_SECTOR_COMPLETE_CAN_ID: u16 = 1110;

/// Application validity report.
pub const APP_VALIDITY_CAN_ID: u16 = 1111;

/// Lost-packet report (device) and resend (host).
pub const LOST_PACKET_CAN_ID: u16 = 1112;

/// Bytes carried by one program frame.
pub const CHUNK_SIZE: usize = 8;

/// Application status reported by the bootloader after a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppStatus {
    /// Checksum matched.
    Valid,
    /// An application is present but its checksum does not match.
    Invalid,
    /// Flash holds no application.
    NoApp,
    /// Any byte the bootloader should never send.
    Unknown(u8),
}

impl AppStatus {
    /// Raw status byte.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Valid => 0,
            Self::Invalid => 1,
            Self::NoApp => 2,
            Self::Unknown(b) => b,
        }
    }
}

impl From<u8> for AppStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Valid,
            1 => Self::Invalid,
            2 => Self::NoApp,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "APP_VALID"),
            Self::Invalid => write!(f, "APP_INVALID"),
            Self::NoApp => write!(f, "NO_APP"),
            Self::Unknown(b) => write!(f, "unknown status {b:#04x}"),
        }
    }
}

// Re-export common types
pub use wait::{Verdict, WaitOutcome, id_is, wait_for_frame};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_status_from_u8() {
        assert_eq!(AppStatus::from(0), AppStatus::Valid);
        assert_eq!(AppStatus::from(1), AppStatus::Invalid);
        assert_eq!(AppStatus::from(2), AppStatus::NoApp);
        assert_eq!(AppStatus::from(7), AppStatus::Unknown(7));
    }

    #[test]
    fn test_app_status_as_u8() {
        for b in 0..=3u8 {
            assert_eq!(AppStatus::from(b).as_u8(), b);
        }
    }

    #[test]
    fn test_id_is_selects_by_identifier() {
        let mut is_program = id_is(PROGRAM_CAN_ID);
        let program = crate::transport::Frame::new(PROGRAM_CAN_ID, &[0; 8]).unwrap();
        let verify = crate::transport::Frame::empty(VERIFY_CAN_ID).unwrap();
        assert_eq!(is_program(&program), Verdict::Accept);
        assert_eq!(is_program(&verify), Verdict::Reject);
    }

    #[test]
    fn test_ids_fit_standard_frames() {
        for id in [
            ERASE_SECTOR_CAN_ID,
            PROGRAM_CAN_ID,
            VERIFY_CAN_ID,
            ERASE_SECTOR_COMPLETE_CAN_ID,
            APP_VALIDITY_CAN_ID,
            LOST_PACKET_CAN_ID,
        ] {
            assert!(id <= crate::transport::MAX_STANDARD_ID);
        }
    }
}
