//! Simulated CAN bootloader for end-to-end session tests.

#![allow(dead_code)]

use canflash::protocol::{
    APP_VALIDITY_CAN_ID, AppStatus, ERASE_SECTOR_CAN_ID, ERASE_SECTOR_COMPLETE_CAN_ID,
    LOST_PACKET_CAN_ID, PROGRAM_CAN_ID, VERIFY_CAN_ID,
};
use canflash::{Board, Frame, ImageSource, Transport};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// Device side of the bootloader protocol, backed by an in-memory flash.
///
/// Programming ANDs data into flash like real NOR flash, so skipping an
/// erase corrupts the application.
pub struct SimulatedBootloader {
    board: Board,
    flash_base: u32,
    flash: Vec<u8>,
    app_base: u32,
    expected: Vec<u8>,
    cursor: u32,
    program_frames: usize,
    drop_every: Option<usize>,
    lost: Vec<u16>,
    awaiting_resend: VecDeque<u16>,
    ack_delay: Duration,
    answer_erase: bool,
    erase_clears: bool,
    chatter: Option<Frame>,
    outbox: VecDeque<(Instant, Frame)>,
    received: Vec<Frame>,
    erased: Vec<u8>,
}

impl SimulatedBootloader {
    /// Device for `board` whose build checksum matches `image`. Flash starts
    /// out holding zeros, as if an older application was installed.
    pub fn new(board: &Board, image: &dyn ImageSource) -> Self {
        let first = board.mcu.flash_sectors.first().expect("layout has sectors");
        let size = usize::try_from(board.mcu.flash_size()).unwrap();
        let expected = (image.min_address()..=image.max_address())
            .map(|a| image.byte_at(a).unwrap())
            .collect();

        Self {
            board: board.clone(),
            flash_base: first.base_address,
            flash: vec![0x00; size],
            app_base: image.min_address(),
            expected,
            cursor: image.min_address(),
            program_frames: 0,
            drop_every: None,
            lost: Vec::new(),
            awaiting_resend: VecDeque::new(),
            ack_delay: Duration::ZERO,
            answer_erase: true,
            erase_clears: true,
            chatter: None,
            outbox: VecDeque::new(),
            received: Vec::new(),
            erased: Vec::new(),
        }
    }

    /// Miss every `n`th program frame.
    pub fn drop_every(mut self, n: usize) -> Self {
        self.drop_every = Some(n);
        self
    }

    /// Delay the update ack.
    pub fn ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    /// Never answer erase commands.
    pub fn silent_erase(mut self) -> Self {
        self.answer_erase = false;
        self
    }

    /// Answer erase commands without touching flash.
    pub fn broken_erase(mut self) -> Self {
        self.erase_clears = false;
        self
    }

    /// Start with the expected application already programmed.
    pub fn with_installed_app(mut self) -> Self {
        let offset = self.offset(self.app_base);
        let end = offset + self.expected.len();
        self.flash[offset..end].copy_from_slice(&self.expected);
        self
    }

    /// Put `frame` on the bus before every reply.
    pub fn with_chatter(mut self, frame: Frame) -> Self {
        self.chatter = Some(frame);
        self
    }

    /// Frames the host sent, in order.
    pub fn received(&self) -> &[Frame] {
        &self.received
    }

    /// Host frames with identifier `id`.
    pub fn received_with_id(&self, id: u16) -> Vec<Frame> {
        self.received
            .iter()
            .filter(|f| f.id() == id)
            .copied()
            .collect()
    }

    /// Sector ids erased, in order.
    pub fn erased(&self) -> &[u8] {
        &self.erased
    }

    /// Application bytes currently in flash.
    pub fn app_region(&self) -> &[u8] {
        let offset = self.offset(self.app_base);
        &self.flash[offset..offset + self.expected.len()]
    }

    fn offset(&self, address: u32) -> usize {
        (address - self.flash_base) as usize
    }

    fn reply(&mut self, frame: Frame, delay: Duration) {
        let at = Instant::now() + delay;
        if let Some(chatter) = self.chatter {
            self.outbox.push_back((at, chatter));
        }
        self.outbox.push_back((at, frame));
    }

    fn write(&mut self, address: u32, data: &[u8]) {
        let offset = self.offset(address);
        for (i, byte) in data.iter().enumerate() {
            if let Some(cell) = self.flash.get_mut(offset + i) {
                *cell &= *byte;
            }
        }
    }

    fn status(&self) -> AppStatus {
        let app = self.app_region();
        if app == self.expected.as_slice() {
            AppStatus::Valid
        } else if app.iter().all(|b| *b == 0xFF) {
            AppStatus::NoApp
        } else {
            AppStatus::Invalid
        }
    }

    fn handle(&mut self, frame: &Frame) {
        match frame.id() {
            id if id == self.board.start_update_can_id => {
                self.cursor = self.app_base;
                self.program_frames = 0;
                let ack = Frame::empty(self.board.update_ack_can_id).unwrap();
                self.reply(ack, self.ack_delay);
            },
            ERASE_SECTOR_CAN_ID => {
                let id = frame.data()[0];
                let sector = *self.board.mcu.sector(id).expect("known sector");
                assert!(!sector.write_protect, "host erased protected sector {id}");
                if !self.answer_erase {
                    return;
                }
                if self.erase_clears {
                    let offset = self.offset(sector.base_address);
                    self.flash[offset..offset + sector.size as usize].fill(0xFF);
                }
                self.erased.push(id);
                self.reply(Frame::empty(ERASE_SECTOR_COMPLETE_CAN_ID).unwrap(), Duration::ZERO);
            },
            PROGRAM_CAN_ID => {
                let index = self.program_frames;
                self.program_frames += 1;
                let address = self.cursor;
                self.cursor += 8;

                if self.drop_every.is_some_and(|n| index % n == n - 1) {
                    self.lost.push(u16::try_from(index).unwrap());
                } else {
                    self.write(address, frame.data());
                }
            },
            LOST_PACKET_CAN_ID => {
                let index = self.awaiting_resend.pop_front().expect("resend was requested");
                let address = self.app_base + u32::from(index) * 8;
                self.write(address, frame.data());
            },
            VERIFY_CAN_ID => {
                let status = self.status().as_u8();
                self.reply(
                    Frame::new(APP_VALIDITY_CAN_ID, &[status]).unwrap(),
                    Duration::ZERO,
                );
            },
            _ => {},
        }
    }
}

impl Transport for SimulatedBootloader {
    fn send(&mut self, frame: &Frame) -> canflash::Result<()> {
        self.received.push(*frame);
        self.handle(frame);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> canflash::Result<Option<Frame>> {
        // The host stopped streaming; report what went missing.
        for index in std::mem::take(&mut self.lost) {
            self.awaiting_resend.push_back(index);
            self.outbox.push_back((
                Instant::now(),
                Frame::new(LOST_PACKET_CAN_ID, &index.to_le_bytes()).unwrap(),
            ));
        }

        let deadline = Instant::now() + timeout;
        match self.outbox.front() {
            Some((at, _)) if *at <= deadline => {
                let wait = at.saturating_duration_since(Instant::now());
                thread::sleep(wait);
                Ok(self.outbox.pop_front().map(|(_, frame)| frame))
            },
            _ => {
                thread::sleep(timeout);
                Ok(None)
            },
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Intel HEX text for `data` placed at `base`, 16 bytes per record.
pub fn hex_text(base: u32, data: &[u8]) -> String {
    fn record(kind: u8, address: u16, payload: &[u8]) -> String {
        let [hi, lo] = address.to_be_bytes();
        let mut bytes = vec![u8::try_from(payload.len()).unwrap(), hi, lo, kind];
        bytes.extend_from_slice(payload);
        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        bytes.push(sum.wrapping_neg());
        let digits: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        format!(":{digits}")
    }

    let mut lines = Vec::new();
    let mut upper = None;
    for (i, chunk) in data.chunks(16).enumerate() {
        let address = base + u32::try_from(i * 16).unwrap();
        let high = u16::try_from(address >> 16).unwrap();
        if upper != Some(high) {
            lines.push(record(0x04, 0, &high.to_be_bytes()));
            upper = Some(high);
        }
        lines.push(record(0x00, (address & 0xFFFF) as u16, chunk));
    }
    lines.push(record(0x01, 0, &[]));
    lines.join("\n")
}

/// Deterministic application bytes.
pub fn app_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}
