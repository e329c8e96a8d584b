//! Bus mastership and memory/IO access cycles.

use std::thread;
use std::time::{Duration, Instant};

use crate::addr;
use crate::clock::ClockMode;
use crate::error::{Error, Result};
use crate::expander::{Mcp23017, Pcf8574, Port};
use crate::i2c::I2cBus;
use crate::signals::{ControlSignals, DataSignals, BANK_PORT};
use crate::step::StepArmState;

/// Default bound on the BUSREQ/BUSACK handshake polls.
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);
/// Default bound on waiting for an instruction fetch while stepping.
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);
/// RESET pulse width.
const RESET_PULSE: Duration = Duration::from_millis(1);

/// Who currently drives the target's address/data/control lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusOwnership {
    Released,
    Acquired,
}

/// Supervisor over the three expander chips.
///
/// The data chip sits at the configured base address, the control chip at
/// base + 1 and the address chip at base + 2. All register traffic goes
/// through the single owned transport.
pub struct Supervisor<B: I2cBus> {
    pub(crate) i2c: B,
    pub(crate) data: Mcp23017,
    pub(crate) control: Pcf8574,
    pub(crate) address: Mcp23017,
    pub(crate) ownership: BusOwnership,
    pub(crate) step_arm: StepArmState,
    pub(crate) clock_mode: ClockMode,
    pub(crate) ack_timeout: Duration,
    pub(crate) step_timeout: Duration,
}

impl<B: I2cBus> Supervisor<B> {
    pub fn new(i2c: B, chip_base: u8) -> Self {
        Self {
            i2c,
            data: Mcp23017::new(chip_base),
            control: Pcf8574::new(chip_base + 1),
            address: Mcp23017::new(chip_base + 2),
            ownership: BusOwnership::Released,
            step_arm: StepArmState::Disarmed,
            clock_mode: ClockMode::HardwareFree,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn ownership(&self) -> BusOwnership {
        self.ownership
    }

    pub fn arm_state(&self) -> StepArmState {
        self.step_arm
    }

    pub fn clock_mode(&self) -> ClockMode {
        self.clock_mode
    }

    /// Bound on the BUSACK handshake polls.
    pub fn set_ack_timeout(&mut self, timeout: Duration) {
        self.ack_timeout = timeout;
    }

    /// Bound on the instruction-fetch polls while stepping.
    pub fn set_step_timeout(&mut self, timeout: Duration) {
        self.step_timeout = timeout;
    }

    /// Pulse the target's RESET line. Does not require bus mastership.
    pub fn reset(&mut self) -> Result<()> {
        log::debug!("pulsing RESET");
        self.control
            .clear_bits(&mut self.i2c, ControlSignals::RESET.bits())?;
        thread::sleep(RESET_PULSE);
        self.control
            .set_bits(&mut self.i2c, ControlSignals::RESET.bits())
    }

    /// Current logic level of the target's INT line.
    pub fn int_level(&mut self) -> Result<bool> {
        let pins = self.data.read_pins(&mut self.i2c, Port::B)?;
        Ok(pins & DataSignals::INT.bits() != 0)
    }

    /// Request bus mastership: assert BUSREQ, wait for the target to float
    /// its lines, then turn the address and data ports into outputs with
    /// every strobe inactive. With `bank`, one IO-write cycle selects the
    /// paged memory bank before the handle is returned.
    ///
    /// If the target never acknowledges, BUSREQ is lifted again and the
    /// call fails with [`Error::Timeout`].
    pub fn take_bus(&mut self, bank: Option<u8>) -> Result<BusMaster<'_, B>> {
        self.control
            .clear_bits(&mut self.i2c, ControlSignals::BUSREQ.bits())?;
        log::debug!("waiting for BUSACK");
        let timeout = self.ack_timeout;
        if let Err(e) = self.poll_until("BUSACK assert", timeout, |s| {
            let pins = s.data.read_pins(&mut s.i2c, Port::B)?;
            Ok(pins & DataSignals::BUSACK.bits() == 0)
        }) {
            if let Err(lift) = self
                .control
                .set_bits(&mut self.i2c, ControlSignals::BUSREQ.bits())
            {
                log::warn!("failed to lift BUSREQ after timeout: {lift}");
            }
            return Err(e);
        }
        log::debug!("BUSACK received, driving bus");
        self.ownership = BusOwnership::Acquired;

        // From here on the handle's Drop releases the bus should any of
        // the remaining setup fail.
        let mut master = BusMaster {
            sup: self,
            released: false,
        };
        master.enter(bank)?;
        Ok(master)
    }

    /// Poll `cond` until it reports true, failing with [`Error::Timeout`]
    /// once `timeout` has elapsed. The condition is always checked at
    /// least once.
    pub(crate) fn poll_until(
        &mut self,
        condition: &'static str,
        timeout: Duration,
        mut cond: impl FnMut(&mut Self) -> Result<bool>,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if cond(self)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout { condition, timeout });
            }
        }
    }

    fn pulse_reset_held(&mut self) -> Result<()> {
        // While RESET is low BUSACK goes high, and the first instruction
        // fetch after RESET rises happens exactly once while BUSREQ is
        // still held. Pulsing here therefore leaves the target stopped at
        // a known instruction boundary.
        log::debug!("pulsing RESET while bus is held");
        self.control
            .clear_bits(&mut self.i2c, ControlSignals::RESET.bits())?;
        thread::sleep(RESET_PULSE);
        self.control
            .set_bits(&mut self.i2c, ControlSignals::RESET.bits())
    }

    /// Hand the lines back and wait for the target to resume mastership.
    fn release_inner(&mut self, reset: bool) -> Result<()> {
        // Float every host-driven line before BUSREQ is lifted. The order
        // matters: once BUSREQ rises the target assumes the bus is its
        // own.
        self.address.set_direction(&mut self.i2c, Port::A, 0xFF)?;
        self.address.set_direction(&mut self.i2c, Port::B, 0xFF)?;
        self.data.set_direction(&mut self.i2c, Port::A, 0xFF)?;
        self.data.set_direction(&mut self.i2c, Port::B, 0xFF)?;

        if reset {
            self.pulse_reset_held()?;
        }

        self.control
            .set_bits(&mut self.i2c, ControlSignals::BUSREQ.bits())?;
        self.ownership = BusOwnership::Released;
        log::debug!("waiting for BUSACK release");
        let timeout = self.ack_timeout;
        self.poll_until("BUSACK release", timeout, |s| {
            let pins = s.data.read_pins(&mut s.i2c, Port::B)?;
            Ok(pins & DataSignals::BUSACK.bits() != 0)
        })?;
        log::debug!("target resumed bus mastership");
        Ok(())
    }

    fn set_address(&mut self, address: u16) -> Result<()> {
        let (high, low) = addr::encode(address);
        self.address.write_pins(&mut self.i2c, Port::A, high)?;
        self.address.write_pins(&mut self.i2c, Port::B, low)
    }

    /// One read cycle: latch the address, drop RD then the request strobe,
    /// sample the data port, raise the request strobe then RD.
    fn read_cycle(&mut self, address: u16, request: DataSignals) -> Result<u8> {
        debug_assert_eq!(self.ownership, BusOwnership::Acquired);
        self.set_address(address)?;
        // Direction strobe before request strobe; the target's latches
        // sample relative to this order.
        self.data
            .clear_bits(&mut self.i2c, Port::B, DataSignals::RD.bits())?;
        self.data.clear_bits(&mut self.i2c, Port::B, request.bits())?;
        let value = self.data.read_pins(&mut self.i2c, Port::A)?;
        self.data.set_bits(&mut self.i2c, Port::B, request.bits())?;
        self.data
            .set_bits(&mut self.i2c, Port::B, DataSignals::RD.bits())?;
        Ok(value)
    }

    /// One write cycle: latch the address, drive the value onto the data
    /// port, strobe WR then the request line, release in reverse, float
    /// the data port again.
    fn write_cycle(&mut self, address: u16, request: DataSignals, value: u8) -> Result<()> {
        debug_assert_eq!(self.ownership, BusOwnership::Acquired);
        self.set_address(address)?;
        self.data.set_direction(&mut self.i2c, Port::A, 0x00)?;
        self.data.write_pins(&mut self.i2c, Port::A, value)?;
        self.data
            .clear_bits(&mut self.i2c, Port::B, DataSignals::WR.bits())?;
        self.data.clear_bits(&mut self.i2c, Port::B, request.bits())?;
        self.data.set_bits(&mut self.i2c, Port::B, request.bits())?;
        self.data
            .set_bits(&mut self.i2c, Port::B, DataSignals::WR.bits())?;
        // Stop driving the data lines outside the active cycle.
        self.data.set_direction(&mut self.i2c, Port::A, 0xFF)
    }
}

/// Scoped bus mastership.
///
/// Memory and IO cycles are only reachable through this handle, so they
/// can only run while the bus is acquired. Dropping the handle without an
/// explicit [`release`](BusMaster::release) hands the bus back on a best
/// effort basis and logs any failure.
pub struct BusMaster<'a, B: I2cBus> {
    sup: &'a mut Supervisor<B>,
    released: bool,
}

impl<'a, B: I2cBus> std::fmt::Debug for BusMaster<'a, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusMaster")
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<'a, B: I2cBus> BusMaster<'a, B> {
    /// Switch the acquired lines over to host control. Runs directly after
    /// BUSACK: the target has floated its bus, so the address ports and
    /// the host-driven half of the data port become outputs, and the
    /// strobes are forced to their inactive level before anything else
    /// touches them.
    fn enter(&mut self, bank: Option<u8>) -> Result<()> {
        let sup = &mut *self.sup;
        sup.address.set_direction(&mut sup.i2c, Port::A, 0x00)?;
        sup.address.set_direction(&mut sup.i2c, Port::B, 0x00)?;
        sup.data
            .set_direction(&mut sup.i2c, Port::B, DataSignals::host_inputs())?;
        sup.data
            .write_pins(&mut sup.i2c, Port::B, DataSignals::strobes())?;

        if let Some(bank) = bank {
            self.select_bank(bank)?;
        }
        Ok(())
    }

    /// Read one byte from memory space.
    pub fn mem_read(&mut self, address: u16) -> Result<u8> {
        self.sup.read_cycle(address, DataSignals::MREQ)
    }

    /// Write one byte to memory space.
    pub fn mem_write(&mut self, address: u16, value: u8) -> Result<()> {
        self.sup.write_cycle(address, DataSignals::MREQ, value)
    }

    /// Read one byte from IO space.
    pub fn io_read(&mut self, port: u16) -> Result<u8> {
        self.sup.read_cycle(port, DataSignals::IORQ)
    }

    /// Write one byte to IO space.
    pub fn io_write(&mut self, port: u16, value: u8) -> Result<()> {
        self.sup.write_cycle(port, DataSignals::IORQ, value)
    }

    /// Select a memory bank on the paged RAM/ROM board.
    pub fn select_bank(&mut self, bank: u8) -> Result<()> {
        log::debug!("selecting bank {bank}");
        self.io_write(BANK_PORT, bank)
    }

    /// Hand the bus back to the target. With `reset`, RESET is pulsed
    /// while BUSREQ is still held so the target restarts at a known
    /// instruction boundary.
    pub fn release(mut self, reset: bool) -> Result<()> {
        self.released = true;
        self.sup.release_inner(reset)
    }

    /// Consume the handle while keeping the bus held, for chained
    /// invocations that skip the release.
    pub fn leave_held(mut self) {
        self.released = true;
        log::debug!("leaving bus held");
    }
}

impl<B: I2cBus> Drop for BusMaster<'_, B> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.sup.release_inner(false) {
                log::warn!("bus release on drop failed: {e}");
            }
        }
    }
}
