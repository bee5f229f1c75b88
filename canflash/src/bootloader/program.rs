//! Bulk programming and lost-packet recovery.
//!
//! Program frames are fire-and-forget: the bootloader does not acknowledge
//! them. Instead it remembers which chunks never arrived and, once the host
//! goes quiet, reports each one on the lost-packet id as a little-endian u16
//! chunk index counted from the image's lowest address. Chunk index `n`
//! covers `min_address + n * 8`. The host answers every report with the
//! chunk data on the same id and stops listening after one poll interval
//! without a report.

use super::{PROGRAM_LABEL, RECOVERY_LABEL, Session};
use crate::error::{Error, Result};
use crate::image::ImageSource;
use crate::protocol::{CHUNK_SIZE, LOST_PACKET_CAN_ID, PROGRAM_CAN_ID, WaitOutcome, id_is, wait_for_frame};
use crate::transport::{Frame, Transport};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace};
use std::thread;

/// Round `value` up to the next multiple of `unit` (a zero unit counts as 1).
pub fn round_up(value: u64, unit: u64) -> u64 {
    value.div_ceil(unit.max(1)) * unit.max(1)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Bytes programmed for an image spanning `span` bytes: rounded up to a
/// multiple of both the minimum programming unit and the chunk size.
pub fn programmed_size(span: u64, min_program_unit: u32) -> u64 {
    let unit = u64::from(min_program_unit).max(1);
    let chunk = CHUNK_SIZE as u64;
    round_up(span, unit / gcd(unit, chunk) * chunk)
}

/// Read one program chunk. Addresses past the end of the image read as
/// erased flash.
fn read_chunk(image: &dyn ImageSource, index: u64) -> Result<[u8; CHUNK_SIZE]> {
    let mut chunk = [0xFF; CHUNK_SIZE];
    let start = u64::from(image.min_address()) + index * CHUNK_SIZE as u64;
    let max = u64::from(image.max_address());

    for (offset, byte) in chunk.iter_mut().enumerate() {
        let address = start + offset as u64;
        if address > max {
            break;
        }
        #[allow(clippy::cast_possible_truncation)]
        let address = address as u32;
        *byte = image.byte_at(address)?;
    }
    Ok(chunk)
}

impl<T: Transport + ?Sized> Session<'_, T> {
    /// Bytes that will be programmed; see [`programmed_size`].
    pub fn size_bytes(&self) -> Result<u64> {
        let image = self.image()?;
        Ok(programmed_size(
            u64::from(image.span()),
            self.board.mcu.min_program_unit,
        ))
    }

    /// Send the whole image, then answer lost-packet reports.
    pub fn program(&mut self) -> Result<()> {
        let board = self.board;
        let image = self.image()?;
        let size = self.size_bytes()?;
        let chunks = size / CHUNK_SIZE as u64;
        let total = usize::try_from(size)
            .map_err(|_| Error::Protocol(format!("{size} byte image does not fit in memory")))?;

        info!(
            "{}: programming {} bytes from {:#010X}",
            board.name,
            size,
            image.min_address()
        );
        self.report(PROGRAM_LABEL, total, 0);

        let stride = self.progress_stride as u64;
        for index in 0..chunks {
            let data = read_chunk(image, index)?;
            let frame = Frame::new(PROGRAM_CAN_ID, &data)?;
            trace!("{}: TX {frame}", board.name);
            self.transport.send(&frame)?;

            let sent = index + 1;
            if sent % stride == 0 && sent < chunks {
                #[allow(clippy::cast_possible_truncation)]
                let done = (sent * CHUNK_SIZE as u64) as usize;
                self.report(PROGRAM_LABEL, total, done);
            }
            if !self.frame_delay.is_zero() {
                thread::sleep(self.frame_delay);
            }
        }
        self.report(PROGRAM_LABEL, total, total);

        let resent = self.recover_lost_packets(chunks)?;
        if resent > 0 {
            info!("{}: resent {resent} lost chunk(s)", board.name);
        }
        Ok(())
    }

    /// Answer lost-packet reports until one poll interval passes without
    /// one. Returns the number of chunks resent.
    ///
    /// Every report is answered, so a chunk reported twice is sent twice.
    fn recover_lost_packets(&mut self, chunks: u64) -> Result<usize> {
        let board = self.board;
        let image = self.image()?;
        let mut resent = 0usize;
        self.report(RECOVERY_LABEL, 0, 0);

        loop {
            let outcome = wait_for_frame(
                &mut *self.transport,
                self.poll_interval,
                self.poll_interval,
                id_is(LOST_PACKET_CAN_ID),
            )?;
            let WaitOutcome::Accepted(report) = outcome else {
                break;
            };

            if report.len() < 2 {
                self.discarded(&report);
                continue;
            }
            let index = u64::from(LittleEndian::read_u16(report.data()));
            if index >= chunks {
                return Err(Error::Protocol(format!(
                    "{}: lost-packet report for chunk index {index}, image has {chunks} chunks",
                    board.name
                )));
            }

            let data = read_chunk(image, index)?;
            debug!("{}: resending chunk {index}", board.name);
            self.transport
                .send(&Frame::new(LOST_PACKET_CAN_ID, &data)?)?;
            resent += 1;
            self.report(RECOVERY_LABEL, resent, resent);
        }

        self.report(RECOVERY_LABEL, resent, resent);
        Ok(resent)
    }
}
