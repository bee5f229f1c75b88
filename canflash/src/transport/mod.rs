//! CAN transport abstraction.
//!
//! The protocol engine never touches a CAN adapter directly. It talks to a
//! [`Transport`], which moves standard-id [`Frame`]s on and off the bus:
//!
//! - **Native** (Linux): raw SocketCAN via the `socketcan` crate
//! - **Tests / simulation**: any in-memory type implementing the trait
//!
//! ## Architecture
//!
//! ```text
//! +------------------+
//! |  Protocol Engine |
//! | (bootloader, wait|
//! |  commit listener)|
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  Transport Trait |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  SocketCAN raw   |
//! |    (socketcan)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use canflash::transport::{Frame, Transport};
//! use std::time::Duration;
//!
//! fn ping<T: Transport>(bus: &mut T) -> canflash::Result<()> {
//!     bus.send(&Frame::empty(1210)?)?;
//!
//!     if let Some(frame) = bus.receive(Duration::from_secs(1))? {
//!         println!("Received: {frame}");
//!     }
//!     Ok(())
//! }
//! ```

#[cfg(all(feature = "native", target_os = "linux"))]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Largest standard (11-bit) CAN identifier.
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Maximum classic CAN payload length.
pub const MAX_PAYLOAD: usize = 8;

/// A classic CAN data frame with a standard identifier.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    id: u16,
    len: u8,
    data: [u8; MAX_PAYLOAD],
}

impl Frame {
    /// Create a frame, validating the identifier and payload length.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(id: u16, payload: &[u8]) -> Result<Self> {
        if id > MAX_STANDARD_ID {
            return Err(Error::InvalidFrame(format!(
                "identifier {id} does not fit in 11 bits"
            )));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::InvalidFrame(format!(
                "payload of {} bytes exceeds {MAX_PAYLOAD}",
                payload.len()
            )));
        }

        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            // Bounded by MAX_PAYLOAD above
            len: payload.len() as u8,
            data,
        })
    }

    /// Create a zero-payload frame.
    pub fn empty(id: u16) -> Result<Self> {
        Self::new(id, &[])
    }

    /// Frame identifier.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({self})")
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X}#", self.id)?;
        for b in self.data() {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

/// Message-oriented, half-duplex CAN transport.
///
/// Implementations are used by one session at a time; the engine never
/// shares a transport between concurrent sessions.
pub trait Transport {
    /// Queue a frame for transmission.
    fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Wait up to `timeout` for the next received frame.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Interface name, for log messages.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        (**self).receive(timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        (**self).receive(timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(all(feature = "native", target_os = "linux"))]
pub use native::SocketCanTransport;
