//! Bounded wait for a matching reply frame.
//!
//! Every blocking point in the engine goes through [`wait_for_frame`]. It
//! polls the transport in short slices until the caller's predicate accepts
//! a frame, aborts on one, or the overall timeout runs out. Frames the
//! predicate rejects are dropped: the bus is shared and stale or unrelated
//! traffic is expected.

use crate::error::Result;
use crate::transport::{Frame, Transport};
use log::trace;
use std::time::{Duration, Instant};

/// Predicate decision for one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// This is the reply we were waiting for.
    Accept,
    /// Not ours; discard it and keep waiting.
    Reject,
    /// A reply that ends the wait unsuccessfully.
    Abort,
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The predicate accepted this frame.
    Accepted(Frame),
    /// The predicate aborted on this frame.
    Rejected(Frame),
    /// Nothing acceptable arrived before the timeout.
    TimedOut,
}

impl WaitOutcome {
    /// The accepted frame, if any.
    pub fn accepted(self) -> Option<Frame> {
        match self {
            Self::Accepted(frame) => Some(frame),
            Self::Rejected(_) | Self::TimedOut => None,
        }
    }

    /// Whether the wait ended without any decisive frame.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Wait up to `timeout` for a frame the predicate accepts.
///
/// Each receive call is bounded by `poll` (or by what is left of `timeout`,
/// whichever is shorter), so the call never blocks past its deadline by more
/// than one transport read.
pub fn wait_for_frame<T, F>(
    transport: &mut T,
    timeout: Duration,
    poll: Duration,
    mut predicate: F,
) -> Result<WaitOutcome>
where
    T: Transport + ?Sized,
    F: FnMut(&Frame) -> Verdict,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        let slice = poll.min(timeout.saturating_sub(start.elapsed()));
        let Some(frame) = transport.receive(slice)? else {
            continue;
        };

        match predicate(&frame) {
            Verdict::Accept => return Ok(WaitOutcome::Accepted(frame)),
            Verdict::Abort => return Ok(WaitOutcome::Rejected(frame)),
            Verdict::Reject => trace!("Discarding unrelated frame {frame}"),
        }
    }

    Ok(WaitOutcome::TimedOut)
}

/// Predicate that accepts exactly one identifier and discards the rest.
pub fn id_is(id: u16) -> impl FnMut(&Frame) -> Verdict {
    move |frame| {
        if frame.id() == id {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}
