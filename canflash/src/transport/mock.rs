//! In-memory transport for unit tests.

use crate::error::Result;
use crate::transport::{Frame, Transport};
use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::Duration;

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame>>;

/// Scripted bus: queued replies, an optional endless chatter frame, and an
/// optional responder that reacts to every sent frame.
pub(crate) struct MockBus {
    incoming: VecDeque<Frame>,
    repeat: Option<Frame>,
    sent: Vec<Frame>,
    responder: Option<Responder>,
    sends_before_failure: Option<usize>,
}

impl MockBus {
    pub(crate) fn new() -> Self {
        Self {
            incoming: VecDeque::new(),
            repeat: None,
            sent: Vec::new(),
            responder: None,
            sends_before_failure: None,
        }
    }

    pub(crate) fn push_incoming(&mut self, frame: Frame) {
        self.incoming.push_back(frame);
    }

    /// Deliver `frame` on every receive once the queue is empty.
    pub(crate) fn repeat_incoming(&mut self, frame: Frame) {
        self.repeat = Some(frame);
    }

    pub(crate) fn respond_with<F>(&mut self, responder: F)
    where
        F: FnMut(&Frame) -> Vec<Frame> + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    /// Make every send after the first `n` fail like an unplugged adapter.
    pub(crate) fn fail_after_sends(&mut self, n: usize) {
        self.sends_before_failure = Some(n);
    }

    pub(crate) fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }

    pub(crate) fn sent(&self) -> &[Frame] {
        &self.sent
    }

    pub(crate) fn sent_with_id(&self, id: u16) -> Vec<Frame> {
        self.sent
            .iter()
            .filter(|f| f.id() == id)
            .copied()
            .collect()
    }
}

impl Transport for MockBus {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        if let Some(remaining) = self.sends_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "adapter gone").into());
            }
            *remaining -= 1;
        }

        self.sent.push(*frame);
        if let Some(responder) = self.responder.as_mut() {
            self.incoming.extend(responder(frame));
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        if let Some(frame) = self.incoming.pop_front() {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.repeat {
            thread::sleep(Duration::from_millis(1).min(timeout));
            return Ok(Some(frame));
        }
        thread::sleep(timeout);
        Ok(None)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
