//! Erase planning and execution.

use super::{ERASE_LABEL, Session};
use crate::error::{Error, Result};
use crate::protocol::{ERASE_SECTOR_CAN_ID, ERASE_SECTOR_COMPLETE_CAN_ID, id_is, wait_for_frame};
use crate::target::FlashSector;
use crate::transport::{Frame, Transport};
use log::{debug, info, warn};

/// Sectors sharing at least one address with `[min_address, min_address + size)`.
///
/// Protected sectors are returned too, so that erasing them fails loudly
/// instead of silently leaving part of the image unerased.
#[allow(clippy::cast_possible_truncation)]
pub fn sectors_for_range(sectors: &[FlashSector], min_address: u32, size: u64) -> Vec<FlashSector> {
    if size == 0 {
        return Vec::new();
    }
    let max_address = (u64::from(min_address) + size - 1).min(u64::from(u32::MAX)) as u32;

    sectors
        .iter()
        .filter(|s| s.intersects(min_address, max_address))
        .copied()
        .collect()
}

/// Every sector that is not write-protected, for a full application wipe.
pub fn erasable_sectors(sectors: &[FlashSector]) -> Vec<FlashSector> {
    sectors.iter().filter(|s| !s.write_protect).copied().collect()
}

impl<T: Transport + ?Sized> Session<'_, T> {
    /// Erase `sectors` one by one in ascending id order.
    ///
    /// Fails with [`Error::WriteProtected`] before sending anything if any
    /// sector is protected. Returns `false` as soon as one erase-complete
    /// reply times out; the remaining sectors are left alone.
    pub fn erase_sectors(&mut self, sectors: &[FlashSector]) -> Result<bool> {
        let board = self.board;
        if let Some(sector) = sectors.iter().find(|s| s.write_protect) {
            return Err(Error::WriteProtected {
                board: board.name.clone(),
                sector: sector.id,
                base_address: sector.base_address,
            });
        }

        let mut ordered = sectors.to_vec();
        ordered.sort_by_key(|s| s.id);

        let total: usize = ordered.iter().map(|s| s.size as usize).sum();
        info!(
            "{}: erasing {} sector(s), {} bytes",
            board.name,
            ordered.len(),
            total
        );
        self.report(ERASE_LABEL, total, 0);

        let mut erased = 0usize;
        for sector in &ordered {
            debug!("{}: erasing {sector}", board.name);
            self.transport
                .send(&Frame::new(ERASE_SECTOR_CAN_ID, &[sector.id])?)?;

            let outcome = wait_for_frame(
                &mut *self.transport,
                self.timeout,
                self.poll_interval,
                id_is(ERASE_SECTOR_COMPLETE_CAN_ID),
            )?;
            if outcome.is_timed_out() {
                warn!(
                    "{}: no erase-complete for sector {} within {:?}",
                    board.name, sector.id, self.timeout
                );
                return Ok(false);
            }

            erased += sector.size as usize;
            self.report(ERASE_LABEL, total, erased);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootloader::tests::{bench_board, cooperative_bus, fast};
    use crate::transport::mock::MockBus;

    fn layout() -> Vec<FlashSector> {
        vec![
            FlashSector::new(0, 0x1000, 0x1000, true),
            FlashSector::new(1, 0x2000, 0x1000, false),
        ]
    }

    fn ids(sectors: &[FlashSector]) -> Vec<u8> {
        sectors.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_range_inside_one_sector() {
        assert_eq!(ids(&sectors_for_range(&layout(), 0x2000, 0x10)), [1]);
    }

    #[test]
    fn test_range_touching_last_byte_of_previous_sector() {
        // 0x1FFF belongs to sector 0
        assert_eq!(ids(&sectors_for_range(&layout(), 0x1FFF, 0x11)), [0, 1]);
    }

    #[test]
    fn test_range_ending_on_sector_boundary() {
        // [0x1800, 0x2000) stops one byte short of sector 1
        assert_eq!(ids(&sectors_for_range(&layout(), 0x1800, 0x800)), [0]);
    }

    #[test]
    fn test_range_outside_every_sector() {
        assert!(sectors_for_range(&layout(), 0x4000, 0x100).is_empty());
        assert!(sectors_for_range(&layout(), 0x0000, 0x1000).is_empty());
        assert!(sectors_for_range(&layout(), 0x2000, 0).is_empty());
    }

    #[test]
    fn test_range_at_top_of_address_space() {
        let sectors = [FlashSector::new(9, 0xFFFF_F000, 0x1000, false)];
        assert_eq!(ids(&sectors_for_range(&sectors, 0xFFFF_FFF0, 0x40)), [9]);
    }

    #[test]
    fn test_erasable_sectors_skip_protected() {
        assert_eq!(ids(&erasable_sectors(&layout())), [1]);
    }

    #[test]
    fn test_protected_sector_fails_before_any_frame() {
        let board = bench_board();
        let mut bus = cooperative_bus(0);
        let sectors = sectors_for_range(&board.mcu.flash_sectors, 0x1FFF, 0x11);

        let err = fast(Session::new(&mut bus, &board))
            .erase_sectors(&sectors)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WriteProtected {
                sector: 0,
                base_address: 0x1000,
                ..
            }
        ));
        assert!(bus.sent().is_empty());
    }

    #[test]
    fn test_erase_in_ascending_id_order() {
        let board = bench_board();
        let mut bus = cooperative_bus(0);
        let mut sectors = erasable_sectors(&board.mcu.flash_sectors);
        sectors.reverse();

        let ok = fast(Session::new(&mut bus, &board))
            .erase_sectors(&sectors)
            .unwrap();
        assert!(ok);
        let sent: Vec<_> = bus.sent().iter().map(|f| f.data()[0]).collect();
        assert_eq!(sent, [1, 2]);
    }

    #[test]
    fn test_erase_stops_at_first_timeout() {
        let board = bench_board();
        let mut bus = MockBus::new();
        bus.push_incoming(Frame::empty(ERASE_SECTOR_COMPLETE_CAN_ID).unwrap());

        let sectors = erasable_sectors(&board.mcu.flash_sectors);
        let ok = fast(Session::new(&mut bus, &board))
            .erase_sectors(&sectors)
            .unwrap();
        assert!(!ok);
        assert_eq!(bus.sent_with_id(ERASE_SECTOR_CAN_ID).len(), 2);

        let mut bus = MockBus::new();
        let ok = fast(Session::new(&mut bus, &board))
            .erase_sectors(&sectors)
            .unwrap();
        assert!(!ok);
        assert_eq!(bus.sent_with_id(ERASE_SECTOR_CAN_ID).len(), 1);
    }

    #[test]
    fn test_erase_progress_is_cumulative() {
        let board = bench_board();
        let mut bus = cooperative_bus(0);
        let mut reports = Vec::new();

        let sectors = erasable_sectors(&board.mcu.flash_sectors);
        fast(Session::new(&mut bus, &board).with_progress(
            |_: &str, total: usize, done: usize| reports.push((total, done)),
        ))
        .erase_sectors(&sectors)
        .unwrap();

        assert_eq!(reports, [(0x2000, 0), (0x2000, 0x1000), (0x2000, 0x2000)]);
    }
}
