//! Blocking single-key reads in raw mode, for the interactive stepper.

use std::io::{self, Read};
use std::mem::MaybeUninit;
use std::os::unix::io::AsRawFd;

/// Puts the terminal into raw (no echo, byte-at-a-time) mode for the
/// lifetime of the value and restores the original attributes on drop.
pub struct RawMode {
    original: libc::termios,
}

impl RawMode {
    pub fn enter() -> io::Result<Self> {
        let fd = io::stdin().as_raw_fd();
        let mut original = MaybeUninit::<libc::termios>::uninit();
        if unsafe { libc::tcgetattr(fd, original.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let original = unsafe { original.assume_init() };

        let mut raw = original;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        // Reads return after a single byte, with no timeout.
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { original })
    }

    /// Block until one key arrives.
    pub fn read_key(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        io::stdin().lock().read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let fd = io::stdin().as_raw_fd();
        unsafe {
            libc::tcsetattr(fd, libc::TCSANOW, &self.original);
        }
    }
}
