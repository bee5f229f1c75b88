//! # canflash
//!
//! A library for updating application firmware on boards that run a CAN
//! bootloader.
//!
//! This crate provides the host side of the bootloader protocol:
//!
//! - Start-update handshake with a board's bootloader
//! - Erase planning over the microcontroller's flash sectors
//! - Bulk programming with lost-packet recovery
//! - Checksum verification and full application wipe
//! - Intel HEX image loading
//! - Listening for commit broadcasts of running applications
//!
//! ## Supported Targets
//!
//! - STM32F412xx and STM32H733xx flash layouts
//! - The quadruna car boards (VC, BMS, FSM, RSM, CRIT) and the h7dev board
//!
//! ## Features
//!
//! - `native` (default): SocketCAN transport (Linux)
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use canflash::{Catalog, HexImage, Session};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Catalog::builtin();
//!     let board = catalog.board("FSM").ok_or("unknown board")?;
//!     let image = HexImage::from_file(board.image_path(Path::new("build_fw_deploy")))?;
//!
//!     #[cfg(all(feature = "native", target_os = "linux"))]
//!     {
//!         let mut bus = canflash::SocketCanTransport::open("can0")?;
//!         Session::new(&mut bus, board)
//!             .with_image(&image)
//!             .with_progress(|label: &str, total: usize, done: usize| {
//!                 println!("{label}: {done}/{total}");
//!             })
//!             .update()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootloader;
pub mod commit;
pub mod error;
pub mod image;
pub mod progress;
pub mod protocol;
pub mod target;
pub mod transport;

// Re-exports for convenience
#[cfg(all(feature = "native", target_os = "linux"))]
pub use transport::SocketCanTransport;
pub use {
    bootloader::Session,
    commit::{CommitInfo, collect_commits},
    error::{Error, Result},
    image::{HexImage, ImageSource, RawImage},
    progress::{NoProgress, Progress},
    protocol::AppStatus,
    target::{Board, BoardConfig, COMMIT_SOURCES, Catalog, CommitSource, FlashSector, Microcontroller},
    transport::{Frame, Transport},
};
