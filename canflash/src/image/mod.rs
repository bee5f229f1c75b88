//! Firmware image sources.
//!
//! The engine reads the application through [`ImageSource`], a
//! byte-addressable view over one contiguous address range. Reads are pure
//! and may be repeated (lost-packet recovery re-reads chunks).

pub mod ihex;

use crate::error::{Error, Result};

/// Byte-addressable firmware image.
pub trait ImageSource {
    /// Lowest address covered by the image.
    fn min_address(&self) -> u32;

    /// Highest address covered by the image (inclusive).
    fn max_address(&self) -> u32;

    /// Byte at `address`; `Error::AddressOutOfRange` outside
    /// `[min_address, max_address]`.
    fn byte_at(&self, address: u32) -> Result<u8>;

    /// Number of bytes covered, `max - min + 1`.
    fn span(&self) -> u32 {
        self.max_address() - self.min_address() + 1
    }

    /// Whether `address` lies inside the image.
    fn contains(&self, address: u32) -> bool {
        (self.min_address()..=self.max_address()).contains(&address)
    }
}

/// A flat binary placed at a base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    base: u32,
    data: Vec<u8>,
}

impl RawImage {
    /// Wrap `data` so that its first byte lives at `base`.
    pub fn new(base: u32, data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Config("image is empty".into()));
        }
        let last = u32::try_from(data.len() - 1)
            .ok()
            .and_then(|len| base.checked_add(len));
        if last.is_none() {
            return Err(Error::Config(format!(
                "{} bytes at {base:#010x} overflow the 32-bit address space",
                data.len()
            )));
        }
        Ok(Self { base, data })
    }

    /// Image contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ImageSource for RawImage {
    fn min_address(&self) -> u32 {
        self.base
    }

    #[allow(clippy::cast_possible_truncation)]
    fn max_address(&self) -> u32 {
        // Length checked against the address space in `new`
        self.base + (self.data.len() - 1) as u32
    }

    fn byte_at(&self, address: u32) -> Result<u8> {
        address
            .checked_sub(self.base)
            .and_then(|offset| self.data.get(offset as usize))
            .copied()
            .ok_or(Error::AddressOutOfRange(address))
    }
}

pub use ihex::HexImage;
