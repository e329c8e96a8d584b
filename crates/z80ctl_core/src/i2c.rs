//! I2C transport consumed by the expander drivers.

use crate::error::Result;

/// Byte-level I2C master.
///
/// The three expander chips hang off one bus, and every register access is
/// a blocking round trip through a single `I2cBus` instance, so chip
/// traffic stays strictly serialized. The bus-cycle sequencing in
/// `supervisor` depends on that: no unrelated transaction may land between
/// two strobe writes.
pub trait I2cBus {
    /// Write `bytes` to the 7-bit slave `addr`.
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` by reading from the slave.
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()>;

    /// Write `out`, then read `buf.len()` bytes back. Register reads on
    /// chips with a register pointer go through here.
    fn write_read(&mut self, addr: u8, out: &[u8], buf: &mut [u8]) -> Result<()> {
        self.write(addr, out)?;
        self.read(addr, buf)
    }
}

#[cfg(unix)]
pub use dev::I2cDev;

#[cfg(unix)]
mod dev {
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    use super::I2cBus;
    use crate::error::Result;

    /// `ioctl` request selecting the slave address for subsequent reads
    /// and writes on an i2c-dev file descriptor.
    const I2C_SLAVE: libc::c_ulong = 0x0703;

    /// Transport over a Linux `/dev/i2c-N` character device.
    pub struct I2cDev {
        file: File,
        slave: Option<u8>,
    }

    impl I2cDev {
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            Ok(Self { file, slave: None })
        }

        /// Point the device node at `addr`. The ioctl is only reissued
        /// when the target chip changes between transactions.
        fn select(&mut self, addr: u8) -> Result<()> {
            if self.slave == Some(addr) {
                return Ok(());
            }
            let rc = unsafe {
                libc::ioctl(self.file.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(addr))
            };
            if rc < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            self.slave = Some(addr);
            Ok(())
        }
    }

    impl I2cBus for I2cDev {
        fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<()> {
            self.select(addr)?;
            self.file.write_all(bytes)?;
            Ok(())
        }

        fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
            self.select(addr)?;
            self.file.read_exact(buf)?;
            Ok(())
        }
    }
}
