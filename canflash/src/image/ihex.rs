//! Intel HEX firmware images.
//!
//! ## Record Format
//!
//! ```text
//! +-------+-------+---------+------+-----------+----------+
//! | Start | Count | Address | Type |   Data    | Checksum |
//! +-------+-------+---------+------+-----------+----------+
//! |  ':'  |  1B   |   2B    |  1B  |  Count B  |    1B    |
//! +-------+-------+---------+------+-----------+----------+
//! ```
//!
//! All fields are ASCII hex, big-endian. The checksum is the two's
//! complement of the sum of every other byte in the record.
//!
//! Supported record types: 00 data, 01 end of file, 02 extended segment
//! address, 03 start segment address, 04 extended linear address and
//! 05 start linear address.
//!
//! The image spans the lowest to the highest data address. Addresses inside
//! that range that no record covers read as `0xFF`, the erased flash value.

use crate::error::{Error, Result};
use crate::image::ImageSource;
use byteorder::{BigEndian, ByteOrder};
use log::debug;
use std::fs;
use std::path::Path;

/// Value of unprogrammed flash.
pub const ERASED_BYTE: u8 = 0xFF;

/// Largest image accepted (covers every part in the catalog with room to spare).
pub const MAX_IMAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Intel HEX record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Data bytes at an address.
    Data = 0x00,
    /// End of file.
    EndOfFile = 0x01,
    /// Upper address bits as a 16-byte segment.
    ExtendedSegmentAddress = 0x02,
    /// CS:IP entry point.
    StartSegmentAddress = 0x03,
    /// Upper 16 address bits.
    ExtendedLinearAddress = 0x04,
    /// 32-bit entry point.
    StartLinearAddress = 0x05,
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0x00 => Ok(Self::Data),
            0x01 => Ok(Self::EndOfFile),
            0x02 => Ok(Self::ExtendedSegmentAddress),
            0x03 => Ok(Self::StartSegmentAddress),
            0x04 => Ok(Self::ExtendedLinearAddress),
            0x05 => Ok(Self::StartLinearAddress),
            other => Err(other),
        }
    }
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    kind: RecordType,
    address: u16,
    data: Vec<u8>,
}

impl Record {
    /// Decode a single `:`-prefixed line.
    fn parse(line: &str, line_no: usize) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidHex {
            line: line_no,
            reason,
        };

        let hex = line
            .strip_prefix(':')
            .ok_or_else(|| invalid("record does not start with ':'".into()))?;
        if !hex.is_ascii() {
            return Err(invalid("non-ASCII characters in record".into()));
        }
        if hex.len() % 2 != 0 {
            return Err(invalid("odd number of hex digits".into()));
        }

        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|e| invalid(format!("bad hex digit: {e}")))?;

        if bytes.len() < 5 {
            return Err(invalid("record too short".into()));
        }
        let count = usize::from(bytes[0]);
        if bytes.len() != count + 5 {
            return Err(invalid(format!(
                "byte count {count} does not match record length {}",
                bytes.len() - 5
            )));
        }

        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if sum != 0 {
            let stored = bytes[bytes.len() - 1];
            let expected = stored.wrapping_sub(sum);
            return Err(invalid(format!(
                "checksum mismatch: expected {expected:#04x}, got {stored:#04x}"
            )));
        }

        let kind = RecordType::try_from(bytes[3])
            .map_err(|t| invalid(format!("unknown record type {t:#04x}")))?;

        Ok(Self {
            kind,
            address: BigEndian::read_u16(&bytes[1..3]),
            data: bytes[4..4 + count].to_vec(),
        })
    }

    fn expect_len(&self, len: usize, line_no: usize) -> Result<()> {
        if self.data.len() == len {
            Ok(())
        } else {
            Err(Error::InvalidHex {
                line: line_no,
                reason: format!(
                    "{:?} record needs {len} data bytes, has {}",
                    self.kind,
                    self.data.len()
                ),
            })
        }
    }
}

/// Firmware image loaded from an Intel HEX file.
#[derive(Clone, PartialEq, Eq)]
pub struct HexImage {
    base: u32,
    data: Vec<u8>,
    start_address: Option<u32>,
}

impl HexImage {
    /// Load and parse a HEX file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let image = Self::parse(&text)?;
        debug!(
            "Loaded {} ({} bytes at {:#010X})",
            path.display(),
            image.data.len(),
            image.base
        );
        Ok(image)
    }

    /// Parse HEX text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut upper: u32 = 0;
        let mut start_address = None;
        let mut chunks: Vec<(u32, Vec<u8>, usize)> = Vec::new();
        let mut saw_eof = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let record = Record::parse(line, line_no)?;
            match record.kind {
                RecordType::Data => {
                    if record.data.is_empty() {
                        continue;
                    }
                    let address = upper
                        .checked_add(u32::from(record.address))
                        .ok_or_else(|| Error::InvalidHex {
                            line: line_no,
                            reason: "address overflows 32 bits".into(),
                        })?;
                    chunks.push((address, record.data, line_no));
                },
                RecordType::EndOfFile => {
                    saw_eof = true;
                    break;
                },
                RecordType::ExtendedSegmentAddress => {
                    record.expect_len(2, line_no)?;
                    upper = u32::from(BigEndian::read_u16(&record.data)) << 4;
                },
                RecordType::StartSegmentAddress => {
                    record.expect_len(4, line_no)?;
                    let cs = u32::from(BigEndian::read_u16(&record.data[..2]));
                    let ip = u32::from(BigEndian::read_u16(&record.data[2..]));
                    start_address = Some((cs << 4) + ip);
                },
                RecordType::ExtendedLinearAddress => {
                    record.expect_len(2, line_no)?;
                    upper = u32::from(BigEndian::read_u16(&record.data)) << 16;
                },
                RecordType::StartLinearAddress => {
                    record.expect_len(4, line_no)?;
                    start_address = Some(BigEndian::read_u32(&record.data));
                },
            }
        }

        if !saw_eof {
            debug!("HEX input has no end-of-file record");
        }

        Self::assemble(chunks, start_address)
    }

    /// Lay data records out into one contiguous buffer.
    fn assemble(mut chunks: Vec<(u32, Vec<u8>, usize)>, start_address: Option<u32>) -> Result<Self> {
        chunks.sort_by_key(|(address, _, _)| *address);

        if let Some((address, _, line_no)) = chunks
            .iter()
            .find(|chunk| chunk_end(chunk) > u64::from(u32::MAX) + 1)
        {
            return Err(Error::InvalidHex {
                line: *line_no,
                reason: format!("data at {address:#010x} runs past the 32-bit address space"),
            });
        }

        let (base, last) = match (chunks.first(), chunks.iter().map(chunk_end).max()) {
            (Some((base, _, _)), Some(end)) => (*base, end),
            _ => {
                return Err(Error::InvalidHex {
                    line: 0,
                    reason: "no data records".into(),
                });
            },
        };

        let size = last - u64::from(base);
        if size > u64::from(MAX_IMAGE_SIZE) {
            return Err(Error::InvalidHex {
                line: 0,
                reason: format!("image spans {size} bytes, more than {MAX_IMAGE_SIZE}"),
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let mut data = vec![ERASED_BYTE; size as usize];
        let mut written_to = u64::from(base);
        for (address, bytes, line_no) in &chunks {
            if u64::from(*address) < written_to {
                return Err(Error::InvalidHex {
                    line: *line_no,
                    reason: format!("data at {address:#010x} overlaps an earlier record"),
                });
            }
            let offset = (*address - base) as usize;
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
            written_to = u64::from(*address) + bytes.len() as u64;
        }

        Ok(Self {
            base,
            data,
            start_address,
        })
    }

    /// Entry point from a start address record, if present.
    pub fn start_address(&self) -> Option<u32> {
        self.start_address
    }

    /// Image contents from `min_address` to `max_address`, gaps filled with 0xFF.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Exclusive end address of a chunk, widened so the last byte at
/// `0xFFFF_FFFF` does not overflow.
fn chunk_end(chunk: &(u32, Vec<u8>, usize)) -> u64 {
    u64::from(chunk.0) + chunk.1.len() as u64
}

impl ImageSource for HexImage {
    fn min_address(&self) -> u32 {
        self.base
    }

    #[allow(clippy::cast_possible_truncation)]
    fn max_address(&self) -> u32 {
        // Bounded by MAX_IMAGE_SIZE when assembled
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

impl std::fmt::Debug for HexImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HexImage")
            .field("base", &format_args!("{:#010X}", self.base))
            .field("data_len", &self.data.len())
            .field("start_address", &self.start_address)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one record line with a correct checksum.
    fn record(kind: u8, address: u16, data: &[u8]) -> String {
        #[allow(clippy::cast_possible_truncation)]
        let mut bytes = vec![data.len() as u8, (address >> 8) as u8, address as u8, kind];
        bytes.extend_from_slice(data);
        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        bytes.push(sum.wrapping_neg());

        let mut line = String::from(":");
        for b in bytes {
            line.push_str(&format!("{b:02X}"));
        }
        line
    }

    #[test]
    fn test_parse_known_record() {
        // Classic example record from the Intel HEX specification
        let image = HexImage::parse(
            ":10010000214601360121470136007EFE09D2190140\n:00000001FF\n",
        )
        .unwrap();
        assert_eq!(image.min_address(), 0x0100);
        assert_eq!(image.max_address(), 0x010F);
        assert_eq!(image.byte_at(0x0100).unwrap(), 0x21);
        assert_eq!(image.byte_at(0x010F).unwrap(), 0x01);
    }

    #[test]
    fn test_extended_linear_address() {
        let text = [
            record(0x04, 0, &[0x08, 0x02]),
            record(0x00, 0x0000, &[1, 2, 3, 4]),
            record(0x05, 0, &[0x08, 0x02, 0x01, 0x01]),
            record(0x01, 0, &[]),
        ]
        .join("\n");

        let image = HexImage::parse(&text).unwrap();
        assert_eq!(image.min_address(), 0x0802_0000);
        assert_eq!(image.max_address(), 0x0802_0003);
        assert_eq!(image.start_address(), Some(0x0802_0101));
        assert_eq!(image.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_extended_segment_address() {
        let text = [
            record(0x02, 0, &[0x10, 0x00]),
            record(0x00, 0x0010, &[0xAB]),
            record(0x01, 0, &[]),
        ]
        .join("\n");

        let image = HexImage::parse(&text).unwrap();
        assert_eq!(image.min_address(), 0x1_0010);
    }

    #[test]
    fn test_gaps_read_as_erased() {
        let text = [
            record(0x00, 0x0000, &[0x11, 0x22]),
            record(0x00, 0x0008, &[0x33]),
            record(0x01, 0, &[]),
        ]
        .join("\n");

        let image = HexImage::parse(&text).unwrap();
        assert_eq!(image.span(), 9);
        assert_eq!(image.byte_at(0x0001).unwrap(), 0x22);
        assert_eq!(image.byte_at(0x0004).unwrap(), ERASED_BYTE);
        assert_eq!(image.byte_at(0x0008).unwrap(), 0x33);
        assert!(image.byte_at(0x0009).is_err());
    }

    #[test]
    fn test_records_out_of_order() {
        let text = [
            record(0x00, 0x0010, &[0xBB]),
            record(0x00, 0x0000, &[0xAA]),
        ]
        .join("\n");

        let image = HexImage::parse(&text).unwrap();
        assert_eq!(image.min_address(), 0);
        assert_eq!(image.byte_at(0x10).unwrap(), 0xBB);
    }

    #[test]
    fn test_bad_checksum_reports_line() {
        let good = record(0x00, 0, &[1, 2]);
        let mut bad = record(0x00, 2, &[3, 4]);
        bad.replace_range(bad.len() - 2.., "00");
        let err = HexImage::parse(&format!("{good}\n{bad}")).unwrap_err();
        assert!(matches!(err, Error::InvalidHex { line: 2, ref reason } if reason.contains("checksum")));
    }

    #[test]
    fn test_record_past_address_space_rejected() {
        let err = HexImage::parse(":02000004FFFFFC\n:02FFFF00AABB9B\n:00000001FF\n").unwrap_err();
        assert!(matches!(err, Error::InvalidHex { line: 2, ref reason } if reason.contains("32-bit")));
    }

    #[test]
    fn test_record_ending_at_last_address() {
        let text = [
            record(0x04, 0, &[0xFF, 0xFF]),
            record(0x00, 0xFFFE, &[0xAA, 0xBB]),
            record(0x01, 0, &[]),
        ]
        .join("\n");
        let image = HexImage::parse(&text).unwrap();
        assert_eq!(image.min_address(), 0xFFFF_FFFE);
        assert_eq!(image.max_address(), u32::MAX);
        assert_eq!(image.byte_at(u32::MAX).unwrap(), 0xBB);
    }

    #[test]
    fn test_overlap_rejected() {
        let text = [
            record(0x00, 0x0000, &[1, 2, 3, 4]),
            record(0x00, 0x0002, &[9]),
        ]
        .join("\n");
        assert!(matches!(
            HexImage::parse(&text),
            Err(Error::InvalidHex { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_colon_and_unknown_type() {
        assert!(matches!(
            HexImage::parse("10010000"),
            Err(Error::InvalidHex { line: 1, .. })
        ));
        let unknown = record(0x07, 0, &[]);
        assert!(matches!(
            HexImage::parse(&unknown),
            Err(Error::InvalidHex { line: 1, ref reason }) if reason.contains("unknown record type")
        ));
    }

    #[test]
    fn test_no_data_is_an_error() {
        assert!(HexImage::parse(&record(0x01, 0, &[])).is_err());
        assert!(HexImage::parse("").is_err());
    }

    #[test]
    fn test_data_after_eof_ignored() {
        let text = [
            record(0x00, 0, &[1]),
            record(0x01, 0, &[]),
            record(0x00, 0x100, &[2]),
        ]
        .join("\n");
        let image = HexImage::parse(&text).unwrap();
        assert_eq!(image.max_address(), 0);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.hex");
        let text = [record(0x00, 0x0040, &[7, 8, 9]), record(0x01, 0, &[])].join("\r\n");
        fs::write(&path, text).unwrap();

        let image = HexImage::from_file(&path).unwrap();
        assert_eq!(image.min_address(), 0x40);
        assert_eq!(image.byte_at(0x42).unwrap(), 9);
    }
}
