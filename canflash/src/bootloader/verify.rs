//! Application status query.

use super::{Session, VERIFY_LABEL};
use crate::error::Result;
use crate::protocol::{APP_VALIDITY_CAN_ID, AppStatus, VERIFY_CAN_ID, Verdict, wait_for_frame};
use crate::transport::{Frame, Transport};
use log::{debug, warn};

impl<T: Transport + ?Sized> Session<'_, T> {
    /// Ask the bootloader to checksum the application and report its status.
    ///
    /// `None` means no app-validity reply arrived within the timeout, which
    /// is a different failure from an explicit APP_INVALID or NO_APP.
    pub fn verify(&mut self) -> Result<Option<AppStatus>> {
        let board = self.board;
        self.report(VERIFY_LABEL, 1, 0);
        self.transport.send(&Frame::empty(VERIFY_CAN_ID)?)?;

        let outcome = wait_for_frame(
            &mut *self.transport,
            self.timeout,
            self.poll_interval,
            |frame| match (frame.id(), frame.data().first()) {
                (APP_VALIDITY_CAN_ID, Some(_)) => Verdict::Accept,
                (APP_VALIDITY_CAN_ID, None) => {
                    warn!("{}: app-validity reply without a status byte", board.name);
                    Verdict::Reject
                },
                _ => Verdict::Reject,
            },
        )?;

        let status = outcome
            .accepted()
            .and_then(|frame| frame.data().first().copied())
            .map(AppStatus::from);
        match status {
            Some(status) => {
                debug!("{}: device reports {status}", board.name);
                self.report(VERIFY_LABEL, 1, 1);
            },
            None => warn!("{}: no app-validity reply within {:?}", board.name, self.timeout),
        }
        Ok(status)
    }
}
