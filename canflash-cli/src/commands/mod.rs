//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod commits;
pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod update;

use anyhow::Result;
use canflash::Transport;

/// Open the CAN interface.
#[cfg(target_os = "linux")]
pub(crate) fn open_bus(interface: &str) -> Result<Box<dyn Transport>> {
    use anyhow::Context as _;

    let bus = canflash::SocketCanTransport::open(interface)
        .with_context(|| format!("Failed to open CAN interface {interface}"))?;
    Ok(Box::new(bus))
}

/// Open the CAN interface.
#[cfg(not(target_os = "linux"))]
pub(crate) fn open_bus(interface: &str) -> Result<Box<dyn Transport>> {
    Err(canflash::Error::Unsupported(format!(
        "cannot open {interface}: SocketCAN is only available on Linux"
    ))
    .into())
}
