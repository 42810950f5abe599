//! Physical layer collaborators.

use crate::error::Result;

/// One IPMB bus as seen by the transmit and receive workers.
///
/// Both workers share the link, so implementations must be usable from two
/// threads at once.
pub trait Link: Send + Sync {
    /// Write `payload` to the device at 7-bit `target_addr`.
    ///
    /// `payload` is an encoded frame without its address byte; the address
    /// travels in the I2C address phase.
    fn write(&self, target_addr: u8, payload: &[u8]) -> Result<()>;

    /// Take the next received frame, if any.
    ///
    /// Byte 0 of a returned frame is this controller's address in 8-bit form.
    fn read(&self) -> Result<Option<Vec<u8>>>;
}

/// Sink for responses bound for the host KCS interface.
///
/// Buffers are `[netfn << 2, cmd, completion code, data..]`.
pub trait KcsWriter: Send + Sync {
    /// Hand one response buffer to the host.
    fn write(&self, buf: &[u8]) -> Result<()>;
}

pub mod memory;

#[cfg(all(feature = "i2c-dev", target_os = "linux"))]
pub mod linux;
