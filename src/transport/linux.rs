//! Linux I2C link.
//!
//! Outbound frames go through `/dev/i2c-N` after selecting the target with
//! the `I2C_SLAVE` ioctl. Inbound frames are collected by the kernel's
//! `slave-mqueue` backend, which exposes one queued message per read of its
//! sysfs file and prefixes each with the 8-bit slave address.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::protocol::IPMB_FRAME_MAX_LENGTH;
use crate::transport::Link;

#[allow(unsafe_code)]
mod ioctl {
    // I2C_SLAVE from linux/i2c-dev.h; the address is passed by value.
    nix::ioctl_write_int_bad!(i2c_set_slave, 0x0703);
}

// Slave-side client addresses are registered with this flag set.
const I2C_SLAVE_ADDR_FLAG: u16 = 0x1000;

/// An IPMB bus backed by a Linux I2C adapter.
pub struct I2cLink {
    dev: Mutex<File>,
    mqueue: File,
}

impl I2cLink {
    /// Open adapter `bus` and the slave message queue registered at 7-bit
    /// `self_addr`.
    pub fn open(bus: u8, self_addr: u8) -> Result<Self> {
        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/i2c-{bus}"))?;
        let mqueue = File::open(mqueue_path(bus, self_addr))?;

        Ok(Self {
            dev: Mutex::new(dev),
            mqueue,
        })
    }
}

fn mqueue_path(bus: u8, self_addr: u8) -> PathBuf {
    let client = I2C_SLAVE_ADDR_FLAG | u16::from(self_addr);
    PathBuf::from(format!(
        "/sys/bus/i2c/devices/{bus}-{client:04x}/slave-mqueue"
    ))
}

impl Link for I2cLink {
    fn write(&self, target_addr: u8, payload: &[u8]) -> Result<()> {
        if target_addr > 0x7F {
            return Err(Error::InvalidArgument("I2C address must be 7-bit"));
        }

        let mut dev = self.dev.lock();
        // SAFETY: the descriptor is owned by `dev` and stays open for the call.
        #[allow(unsafe_code)]
        let selected = unsafe { ioctl::i2c_set_slave(dev.as_raw_fd(), i32::from(target_addr)) };
        selected.map_err(io::Error::from)?;

        dev.write_all(payload)?;
        Ok(())
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; IPMB_FRAME_MAX_LENGTH];
        let n = self.mqueue.read_at(&mut buf, 0)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn null_link() -> I2cLink {
        I2cLink {
            dev: Mutex::new(File::open("/dev/null").expect("dev")),
            mqueue: File::open("/dev/null").expect("mqueue"),
        }
    }

    #[test]
    fn address_selection_failure_is_an_io_error() {
        let link = null_link();
        match link.write(0x20, &[0x18, 0xA8]) {
            Err(Error::Io(err)) => {
                assert_eq!(err.raw_os_error(), Some(nix::errno::Errno::ENOTTY as i32));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            link.write(0x80, &[]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_mqueue_reads_nothing() {
        assert!(null_link().read().expect("read").is_none());
    }

    #[test]
    fn mqueue_path_uses_slave_client_name() {
        assert_eq!(
            mqueue_path(2, 0x10).to_string_lossy(),
            "/sys/bus/i2c/devices/2-1010/slave-mqueue"
        );
    }
}
