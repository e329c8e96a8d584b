//! Signal wiring of the supervisor board.
//!
//! Address expander: A15..A8 on port A, A7..A0 on port B, both bit-reversed
//! by the board routing (see `addr`). Data expander: D7..D0 on port A, the
//! `DataSignals` lines on port B. Control expander: the `ControlSignals`
//! lines on its single port.

use bitflags::bitflags;

bitflags! {
    /// Data-expander port B lines. All active low except CLK, which simply
    /// mirrors the running clock.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataSignals: u8 {
        /// Instruction-fetch cycle marker.
        const M1 = 0x01;
        const CLK = 0x02;
        const INT = 0x04;
        /// Memory-space request strobe.
        const MREQ = 0x08;
        const WR = 0x10;
        const RD = 0x20;
        /// IO-space request strobe.
        const IORQ = 0x40;
        /// Target's acknowledgment that it has floated its bus.
        const BUSACK = 0x80;
    }
}

bitflags! {
    /// Control-expander lines, all active low except CLKEN/CLKOUT which are
    /// plain levels: CLKEN high passes the on-board oscillator through,
    /// CLKOUT is the host-driven clock when CLKEN is low.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlSignals: u8 {
        const BUSREQ = 0x01;
        const RESET = 0x02;
        const CLKEN = 0x04;
        const CLKOUT = 0x08;
    }
}

impl DataSignals {
    /// Lines on the data expander's port B that stay inputs while the host
    /// masters the bus: target-driven status plus the clock echo.
    pub fn host_inputs() -> u8 {
        (Self::M1 | Self::CLK | Self::INT | Self::BUSACK).bits()
    }

    /// All four cycle strobes, i.e. the inactive (high) idle level of the
    /// host-driven half of port B.
    pub fn strobes() -> u8 {
        (Self::MREQ | Self::WR | Self::RD | Self::IORQ).bits()
    }
}

/// IO port of the bank-select register on the paged RAM/ROM board.
pub const BANK_PORT: u16 = 0x38;
