//! Clock-mode control: hardware pass-through or a host-driven square wave.

use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::i2c::I2cBus;
use crate::signals::ControlSignals;
use crate::supervisor::Supervisor;

/// Which side currently owns the target's clock.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClockMode {
    /// The on-board oscillator free-runs through CLKEN.
    HardwareFree,
    /// The host bit-bangs CLKOUT at the given rate.
    HostSlow(u32),
    /// Execution is gated by the M1 interrupt (see `step`).
    SingleStep,
}

impl<B: I2cBus> Supervisor<B> {
    /// Hand the clock back to the on-board oscillator.
    pub fn normal_clock(&mut self) -> Result<()> {
        self.control
            .set_bits(&mut self.i2c, ControlSignals::CLKEN.bits())?;
        self.clock_mode = ClockMode::HardwareFree;
        Ok(())
    }

    /// Drive the target clock from the host as a square wave of `rate_hz`
    /// until `cancel` reports true. The hardware clock is re-enabled on
    /// every exit path, including errors and unwinds.
    pub fn slow_clock(&mut self, rate_hz: u32, mut cancel: impl FnMut() -> bool) -> Result<()> {
        if rate_hz == 0 {
            return Err(Error::InvalidArgument(
                "clock rate must be at least 1 Hz".into(),
            ));
        }
        let half_period = Duration::from_secs_f64(1.0 / f64::from(rate_hz) / 2.0);
        self.control
            .clear_bits(&mut self.i2c, ControlSignals::CLKEN.bits())?;
        self.clock_mode = ClockMode::HostSlow(rate_hz);
        log::info!("host clock at {rate_hz} Hz");

        let mut hold = ClockHold { sup: self };
        while !cancel() {
            hold.sup
                .control
                .clear_bits(&mut hold.sup.i2c, ControlSignals::CLKOUT.bits())?;
            thread::sleep(half_period);
            hold.sup
                .control
                .set_bits(&mut hold.sup.i2c, ControlSignals::CLKOUT.bits())?;
            thread::sleep(half_period);
        }
        Ok(())
    }
}

/// Restores the hardware clock when host-driven clocking ends, no matter
/// how the loop exits.
struct ClockHold<'a, B: I2cBus> {
    sup: &'a mut Supervisor<B>,
}

impl<B: I2cBus> Drop for ClockHold<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.sup.normal_clock() {
            log::warn!("failed to re-enable the hardware clock: {e}");
        }
    }
}
