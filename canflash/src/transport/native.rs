//! Native CAN transport using Linux SocketCAN via the `socketcan` crate.
//!
//! Works with any interface the kernel exposes (`can0`, `vcan0`, slcan,
//! PEAK and Kvaser adapters through their SocketCAN drivers). Bit rate is
//! configured on the interface itself (`ip link set can0 type can bitrate
//! 500000`), not here.

use {
    crate::{
        error::Result,
        transport::{Frame, Transport},
    },
    log::trace,
    socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket, StandardId},
    std::{
        io::ErrorKind,
        time::{Duration, Instant},
    },
};

/// Shortest read timeout handed to the socket; zero would block forever.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Raw SocketCAN transport.
pub struct SocketCanTransport {
    socket: CanSocket,
    name: String,
}

impl SocketCanTransport {
    /// Open a raw CAN socket on the given interface.
    pub fn open(interface: &str) -> Result<Self> {
        let socket = CanSocket::open(interface)?;
        trace!("Opened SocketCAN interface {interface}");

        Ok(Self {
            socket,
            name: interface.to_string(),
        })
    }
}

impl Transport for SocketCanTransport {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        let id = StandardId::new(frame.id()).ok_or_else(|| {
            crate::Error::InvalidFrame(format!("identifier {} out of range", frame.id()))
        })?;
        let can_frame = CanFrame::new(id, frame.data())
            .ok_or_else(|| crate::Error::InvalidFrame(format!("cannot encode {frame}")))?;

        trace!("TX {frame}");
        self.socket.write_frame(&can_frame)?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket
                .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))?;

            match self.socket.read_frame() {
                Ok(CanFrame::Data(data_frame)) => match data_frame.id() {
                    Id::Standard(id) => {
                        let frame = Frame::new(id.as_raw(), data_frame.data())?;
                        trace!("RX {frame}");
                        return Ok(Some(frame));
                    },
                    Id::Extended(id) => {
                        trace!("Ignoring extended frame {:#010X}", id.as_raw());
                    },
                },
                Ok(other) => {
                    trace!("Ignoring non-data frame: {other:?}");
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
