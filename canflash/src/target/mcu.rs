//! Microcontroller flash geometry.

use std::fmt;

const KB: u32 = 1024;

/// One independently erasable flash sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashSector {
    /// Device-local sector index, sent in the erase command.
    pub id: u8,
    /// First address of the sector.
    pub base_address: u32,
    /// Sector size in bytes.
    pub size: u32,
    /// Sector holds bootloader code and must never be erased or programmed.
    #[cfg_attr(feature = "serde", serde(default))]
    pub write_protect: bool,
}

impl FlashSector {
    /// Create a sector description.
    pub const fn new(id: u8, base_address: u32, size: u32, write_protect: bool) -> Self {
        Self {
            id,
            base_address,
            size,
            write_protect,
        }
    }

    /// Last address inside the sector (inclusive).
    pub const fn max_address(&self) -> u32 {
        self.base_address + (self.size - 1)
    }

    /// Whether the inclusive range `[min, max]` shares any address with
    /// this sector.
    pub const fn intersects(&self, min: u32, max: u32) -> bool {
        max >= self.base_address && self.max_address() >= min
    }
}

impl fmt::Display for FlashSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sector {} [{:#010X}..={:#010X}] {} KiB{}",
            self.id,
            self.base_address,
            self.max_address(),
            self.size / KB,
            if self.write_protect { " (protected)" } else { "" }
        )
    }
}

/// A microcontroller family and its flash layout.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Microcontroller {
    /// Part family name, e.g. `STM32F412xx`.
    pub name: String,
    /// Sectors ordered by base address, non-overlapping.
    pub flash_sectors: Vec<FlashSector>,
    /// Smallest block the flash controller programs at once, in bytes.
    pub min_program_unit: u32,
}

impl Microcontroller {
    /// STM32F412xx, per ST RM0402.
    ///
    /// Sectors 0-4 hold the bootloader and are write-protected.
    pub fn stm32f412() -> Self {
        let layout: [(u8, u32, u32, bool); 12] = [
            (0, 0x0800_0000, 16, true),
            (1, 0x0800_4000, 16, true),
            (2, 0x0800_8000, 16, true),
            (3, 0x0800_C000, 16, true),
            (4, 0x0801_0000, 64, true),
            (5, 0x0802_0000, 128, false),
            (6, 0x0804_0000, 128, false),
            (7, 0x0806_0000, 128, false),
            (8, 0x0808_0000, 128, false),
            (9, 0x080A_0000, 128, false),
            (10, 0x080C_0000, 128, false),
            (11, 0x080E_0000, 128, false),
        ];

        Self {
            name: "STM32F412xx".into(),
            flash_sectors: layout
                .iter()
                .map(|&(id, base, size_kb, wp)| FlashSector::new(id, base, size_kb * KB, wp))
                .collect(),
            min_program_unit: 8,
        }
    }

    /// STM32H733xx, per ST RM0468.
    ///
    /// Sector 0 holds the bootloader and is write-protected. Flash is
    /// programmed in 256-bit words.
    pub fn stm32h733() -> Self {
        Self {
            name: "STM32H733xx".into(),
            flash_sectors: (0..8u8)
                .map(|id| {
                    FlashSector::new(id, 0x0800_0000 + u32::from(id) * 128 * KB, 128 * KB, id == 0)
                })
                .collect(),
            min_program_unit: 32,
        }
    }

    /// Look up a built-in part by name (case-insensitive, `xx` suffix optional).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        match name.trim_end_matches("xx") {
            "stm32f412" => Some(Self::stm32f412()),
            "stm32h733" => Some(Self::stm32h733()),
            _ => None,
        }
    }

    /// Total size of all sectors.
    pub fn flash_size(&self) -> u64 {
        self.flash_sectors
            .iter()
            .map(|s| u64::from(s.size))
            .sum()
    }

    /// Find a sector by id.
    pub fn sector(&self, id: u8) -> Option<&FlashSector> {
        self.flash_sectors.iter().find(|s| s.id == id)
    }
}

impl fmt::Display for Microcontroller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
