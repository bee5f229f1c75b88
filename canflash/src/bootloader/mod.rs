//! Bootloader update and erase sessions.
//!
//! A [`Session`] drives one board's bootloader through the update or erase
//! sequence over a shared [`Transport`]:
//!
//! ```text
//!   update:  handshake -> erase touched sectors -> program -> lost-packet
//!            recovery -> verify (expects APP_VALID)
//!   erase:   handshake -> erase every open sector -> verify (expects NO_APP)
//! ```
//!
//! Every phase is fail-fast. Phase methods return plain outcomes
//! (`bool`, `Option<AppStatus>`) and the orchestrating [`Session::update`]
//! and [`Session::erase`] turn them into board-named [`Error`]s.
//!
//! ## Example
//!
//! ```rust,no_run
//! use canflash::bootloader::Session;
//! use canflash::image::HexImage;
//! use canflash::target::Catalog;
//! use canflash::transport::Transport;
//! use std::path::Path;
//!
//! fn update_all(bus: &mut impl Transport) -> canflash::Result<()> {
//!     let catalog = Catalog::builtin();
//!     for board in catalog.config("quadruna")? {
//!         let image = HexImage::from_file(board.image_path(Path::new("build_fw_deploy")))?;
//!         Session::new(&mut *bus, board)
//!             .with_image(&image)
//!             .with_progress(|label: &str, total: usize, done: usize| {
//!                 println!("{label}: {done}/{total}");
//!             })
//!             .update()?;
//!     }
//!     Ok(())
//! }
//!
//! fn main() -> canflash::Result<()> {
//!     #[cfg(all(feature = "native", target_os = "linux"))]
//!     update_all(&mut canflash::SocketCanTransport::open("can0")?)?;
//!     Ok(())
//! }
//! ```

mod erase;
mod program;
mod verify;

pub use erase::{erasable_sectors, sectors_for_range};
pub use program::{programmed_size, round_up};

use crate::error::{Error, Result};
use crate::image::ImageSource;
use crate::progress::{NoProgress, Progress};
use crate::protocol::{AppStatus, id_is, wait_for_frame};
use crate::target::Board;
use crate::transport::{Frame, Transport};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// How long each phase waits for its reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound of a single transport read, and the silence that ends
/// lost-packet recovery.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after erasing and after programming, before the next command.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Gap between consecutive program frames.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_micros(1);

/// Program frames between two progress reports.
pub const DEFAULT_PROGRESS_STRIDE: usize = 128;

/// Progress label of the erase phase.
pub const ERASE_LABEL: &str = "Erasing flash sectors";

/// Progress label of the program phase.
pub const PROGRAM_LABEL: &str = "Programming code";

/// Progress label of lost-packet recovery.
pub const RECOVERY_LABEL: &str = "Recovering lost packets";

/// Progress label of the verify phase.
pub const VERIFY_LABEL: &str = "Verifying application";

/// One update or erase session for a single board.
///
/// Borrows the transport for its lifetime, so sessions for several boards
/// on the same bus run strictly one after another. Nothing survives the
/// session.
pub struct Session<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    board: &'a Board,
    image: Option<&'a dyn ImageSource>,
    progress: Box<dyn Progress + 'a>,
    timeout: Duration,
    poll_interval: Duration,
    settle_delay: Duration,
    frame_delay: Duration,
    progress_stride: usize,
}

impl<'a, T: Transport + ?Sized> Session<'a, T> {
    /// Create a session with default timing and no progress observer.
    pub fn new(transport: &'a mut T, board: &'a Board) -> Self {
        Self {
            transport,
            board,
            image: None,
            progress: Box::new(NoProgress),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            frame_delay: DEFAULT_FRAME_DELAY,
            progress_stride: DEFAULT_PROGRESS_STRIDE,
        }
    }

    /// Set the application image. Required by [`update`](Self::update).
    #[must_use]
    pub fn with_image(mut self, image: &'a dyn ImageSource) -> Self {
        self.image = Some(image);
        self
    }

    /// Set the progress observer.
    #[must_use]
    pub fn with_progress(mut self, progress: impl Progress + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Set the per-phase reply timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the single-read bound.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the pause after erase and after programming.
    #[must_use]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Set the gap between program frames.
    #[must_use]
    pub fn with_frame_delay(mut self, frame_delay: Duration) -> Self {
        self.frame_delay = frame_delay;
        self
    }

    /// Report programming progress every `frames` frames (minimum 1).
    #[must_use]
    pub fn with_progress_stride(mut self, frames: usize) -> Self {
        self.progress_stride = frames.max(1);
        self
    }

    /// The board this session talks to.
    pub fn board(&self) -> &Board {
        self.board
    }

    /// Ask the bootloader to enter update mode.
    ///
    /// Returns whether the update ack arrived within the timeout. Frames
    /// with any other identifier are discarded.
    pub fn start_update(&mut self) -> Result<bool> {
        let board = self.board;
        debug!("{}: sending start update on {}", board.name, board.start_update_can_id);
        self.transport
            .send(&Frame::empty(board.start_update_can_id)?)?;

        let outcome = wait_for_frame(
            &mut *self.transport,
            self.timeout,
            self.poll_interval,
            id_is(board.update_ack_can_id),
        )?;
        Ok(!outcome.is_timed_out())
    }

    /// Run a full update: handshake, erase the sectors the image touches,
    /// program, recover lost packets and verify.
    pub fn update(&mut self) -> Result<()> {
        let board = self.board;
        let image = self.image()?;
        info!(
            "{}: updating via {} ({:#010X}..={:#010X})",
            board.name,
            self.transport.name(),
            image.min_address(),
            image.max_address()
        );

        if !self.start_update()? {
            return Err(Error::DidNotStart {
                board: board.name.clone(),
            });
        }
        info!("{}: bootloader ready", board.name);

        let size = self.size_bytes()?;
        let sectors = sectors_for_range(&board.mcu.flash_sectors, image.min_address(), size);
        if !self.erase_sectors(&sectors)? {
            return Err(Error::EraseIncomplete {
                board: board.name.clone(),
            });
        }
        self.settle();

        self.program()?;
        self.settle();

        match self.verify()? {
            Some(AppStatus::Valid) => {
                info!("{}: application verified", board.name);
                Ok(())
            },
            Some(status) => Err(Error::IntegrityCheckFailed {
                board: board.name.clone(),
                status,
            }),
            None => Err(Error::Unresponsive {
                board: board.name.clone(),
                phase: "verify",
            }),
        }
    }

    /// Wipe the application: handshake, erase every sector that is not
    /// write-protected and check that no application remains.
    pub fn erase(&mut self) -> Result<()> {
        let board = self.board;
        info!("{}: erasing application via {}", board.name, self.transport.name());

        if !self.start_update()? {
            return Err(Error::DidNotStart {
                board: board.name.clone(),
            });
        }

        let sectors = erasable_sectors(&board.mcu.flash_sectors);
        if !self.erase_sectors(&sectors)? {
            return Err(Error::EraseIncomplete {
                board: board.name.clone(),
            });
        }
        self.settle();

        match self.verify()? {
            Some(AppStatus::NoApp) => {
                info!("{}: flash erased", board.name);
                Ok(())
            },
            Some(status) => Err(Error::EraseVerificationFailed {
                board: board.name.clone(),
                status,
            }),
            None => Err(Error::Unresponsive {
                board: board.name.clone(),
                phase: "erase verify",
            }),
        }
    }

    fn image(&self) -> Result<&'a dyn ImageSource> {
        self.image.ok_or_else(|| {
            Error::Config(format!("{}: no firmware image for update", self.board.name))
        })
    }

    fn settle(&self) {
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
    }

    fn report(&mut self, label: &str, total: usize, completed: usize) {
        self.progress.report(label, total, completed);
    }

    fn discarded(&self, frame: &Frame) {
        warn!("{}: ignoring unexpected frame {frame}", self.board.name);
    }
}
