//! Single-instruction stepping via the data expander's interrupt-on-change
//! block on the M1 line.
//!
//! M1 falls at the start of every instruction-fetch cycle. With the
//! interrupt armed, a fetch latches the chip's interrupt flag; reading the
//! pins both clears the latch and shows when the fetch has completed.

use std::thread;
use std::time::{Duration, Instant};

use crate::clock::ClockMode;
use crate::error::{Error, Result};
use crate::expander::Port;
use crate::i2c::I2cBus;
use crate::signals::DataSignals;
use crate::supervisor::Supervisor;

/// Whether the M1 interrupt-on-change is armed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepArmState {
    Disarmed,
    Armed,
}

impl<B: I2cBus> Supervisor<B> {
    /// Arm the M1 interrupt-on-change: compare M1 against its idle (high)
    /// level so the flag latches the moment a fetch begins.
    pub fn singlestep_on(&mut self) -> Result<()> {
        let m1 = DataSignals::M1.bits();
        self.data
            .set_interrupt_compare(&mut self.i2c, Port::B, m1)?;
        self.data
            .set_interrupt_default(&mut self.i2c, Port::B, m1)?;
        self.data.enable_interrupts(&mut self.i2c, Port::B, m1)?;
        self.step_arm = StepArmState::Armed;
        self.clock_mode = ClockMode::SingleStep;
        Ok(())
    }

    /// Disarm the M1 interrupt. Every routine that arms must come back
    /// through here on all exit paths, or the target is left halted on an
    /// unserviced interrupt condition.
    pub fn singlestep_off(&mut self) -> Result<()> {
        self.data.enable_interrupts(&mut self.i2c, Port::B, 0)?;
        self.step_arm = StepArmState::Disarmed;
        self.clock_mode = ClockMode::HardwareFree;
        Ok(())
    }

    /// Arm the M1 interrupt behind a scope guard that disarms on drop.
    pub fn arm_singlestep(&mut self) -> Result<StepArm<'_, B>> {
        self.singlestep_on()?;
        Ok(StepArm {
            sup: self,
            disarmed: false,
        })
    }

    /// Wait for the interrupt flag marking the start of a fetch.
    pub(crate) fn wait_fetch_flagged(&mut self) -> Result<()> {
        let timeout = self.step_timeout;
        self.poll_until("M1 fetch flag", timeout, |s| {
            let flags = s.data.interrupt_flags(&mut s.i2c, Port::B)?;
            Ok(flags & DataSignals::M1.bits() != 0)
        })
    }

    /// Wait for M1 to read high again. Reading the pins clears the latched
    /// interrupt, but M1 may still be low and would immediately re-latch,
    /// so keep reading until the fetch has completed.
    pub(crate) fn wait_fetch_settled(&mut self) -> Result<()> {
        let timeout = self.step_timeout;
        self.poll_until("M1 de-assert", timeout, |s| {
            let pins = s.data.read_pins(&mut s.i2c, Port::B)?;
            Ok(pins & DataSignals::M1.bits() != 0)
        })
    }
}

/// Scoped arming of the M1 interrupt.
///
/// Stepping operations are only reachable while armed; dropping the guard
/// without an explicit [`disarm`](StepArm::disarm) disarms on a best
/// effort basis and logs any failure.
pub struct StepArm<'a, B: I2cBus> {
    sup: &'a mut Supervisor<B>,
    disarmed: bool,
}

impl<'a, B: I2cBus> StepArm<'a, B> {
    /// Let exactly one instruction fetch begin and complete: wait for the
    /// interrupt flag, then for M1 to settle high.
    pub fn step(&mut self) -> Result<()> {
        self.sup.wait_fetch_flagged()?;
        self.sup.wait_fetch_settled()
    }

    /// Wait out the current fetch only. The interactive stepper advances
    /// on this after each keypress.
    pub fn settle(&mut self) -> Result<()> {
        self.sup.wait_fetch_settled()
    }

    /// Step continuously, pacing iterations to `rate_hz`, until `cancel`
    /// reports true.
    pub fn run(&mut self, rate_hz: u32, mut cancel: impl FnMut() -> bool) -> Result<()> {
        if rate_hz == 0 {
            return Err(Error::InvalidArgument(
                "step rate must be at least 1 Hz".into(),
            ));
        }
        let period = Duration::from_secs_f64(1.0 / f64::from(rate_hz));
        while !cancel() {
            let deadline = Instant::now() + period;
            self.step()?;
            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
            }
        }
        Ok(())
    }

    /// Disarm explicitly, propagating any failure.
    pub fn disarm(mut self) -> Result<()> {
        self.disarmed = true;
        self.sup.singlestep_off()
    }
}

impl<B: I2cBus> Drop for StepArm<'_, B> {
    fn drop(&mut self) {
        if !self.disarmed {
            if let Err(e) = self.sup.singlestep_off() {
                log::warn!("failed to disarm single-step interrupt: {e}");
            }
        }
    }
}

impl<B: I2cBus> Supervisor<B> {
    /// Step continuously at `rate_hz` until `cancel` reports true. The M1
    /// interrupt is disarmed again on every exit path.
    pub fn autostep(&mut self, rate_hz: u32, cancel: impl FnMut() -> bool) -> Result<()> {
        let mut arm = self.arm_singlestep()?;
        arm.run(rate_hz, cancel)?;
        arm.disarm()
    }
}
