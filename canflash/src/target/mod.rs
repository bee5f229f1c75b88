//! Target descriptions: flash layouts and board catalog.

pub mod board;
pub mod mcu;

pub use board::{Board, BoardConfig, COMMIT_SOURCES, Catalog, CommitSource};
pub use mcu::{FlashSector, Microcontroller};
