//! Host-side bus supervisor for a Z80 single-board computer.
//!
//! The board exposes the Z80's address, data and control lines through
//! three I2C GPIO expander chips. This crate owns the BUSREQ/BUSACK
//! handshake for taking the bus away from the processor, the signal
//! sequencing of memory and IO access cycles, clock-mode control, and
//! single-instruction stepping. The `z80ctl` binary drives it from the
//! command line.

pub mod addr;
pub mod clock;
pub mod error;
pub mod expander;
pub mod i2c;
pub mod signals;
pub mod step;
pub mod supervisor;

pub use clock::ClockMode;
pub use error::{Error, Result};
pub use step::{StepArm, StepArmState};
pub use supervisor::{BusMaster, BusOwnership, Supervisor};

#[cfg(test)]
pub(crate) mod testbus;
