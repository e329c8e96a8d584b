//! Register drivers for the board's GPIO expander chips.
//!
//! Two chip types sit on the bus: MCP23017 16-bit expanders carry the
//! address and data/status lines, a PCF8574 8-bit expander carries the
//! control lines. The drivers keep an output-latch shadow so that masked
//! set/clear updates never have to read pin state back; on mixed-direction
//! ports a readback would return input levels, not the latch.

use crate::error::Result;
use crate::i2c::I2cBus;

/// One of the two 8-bit ports of an MCP23017.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Port {
    A,
    B,
}

impl Port {
    #[inline]
    fn index(self) -> usize {
        match self {
            Port::A => 0,
            Port::B => 1,
        }
    }

    #[inline]
    fn reg(self, base: u8) -> u8 {
        base + self.index() as u8
    }
}

// MCP23017 register pairs with IOCON.BANK = 0: each B register directly
// follows its A register, so `Port::reg` addresses either port.
const IODIR: u8 = 0x00; // direction, 1 = input
const GPINTEN: u8 = 0x04; // interrupt-on-change enable
const DEFVAL: u8 = 0x06; // default comparison value
const INTCON: u8 = 0x08; // 1 = compare against DEFVAL, 0 = any change
const INTF: u8 = 0x0E; // interrupt flags (read only)
const GPIO: u8 = 0x12; // pin levels; writing writes the output latch

/// MCP23017 16-bit I2C GPIO expander.
pub struct Mcp23017 {
    addr: u8,
    /// Output-latch shadow per port. The chip resets with the latch clear.
    olat: [u8; 2],
}

impl Mcp23017 {
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            olat: [0x00; 2],
        }
    }

    pub fn address(&self) -> u8 {
        self.addr
    }

    fn write_reg<B: I2cBus>(&self, bus: &mut B, reg: u8, value: u8) -> Result<()> {
        bus.write(self.addr, &[reg, value])
    }

    fn read_reg<B: I2cBus>(&self, bus: &mut B, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        bus.write_read(self.addr, &[reg], &mut buf)?;
        Ok(buf[0])
    }

    /// Set a port's direction mask: 1 bits are inputs (floating), 0 bits
    /// outputs.
    pub fn set_direction<B: I2cBus>(&mut self, bus: &mut B, port: Port, mask: u8) -> Result<()> {
        self.write_reg(bus, port.reg(IODIR), mask)
    }

    /// Read live pin levels. On the interrupt-capable port this also
    /// clears a latched interrupt-on-change condition.
    pub fn read_pins<B: I2cBus>(&mut self, bus: &mut B, port: Port) -> Result<u8> {
        self.read_reg(bus, port.reg(GPIO))
    }

    /// Drive a port's whole output latch.
    pub fn write_pins<B: I2cBus>(&mut self, bus: &mut B, port: Port, value: u8) -> Result<()> {
        self.olat[port.index()] = value;
        self.write_reg(bus, port.reg(GPIO), value)
    }

    /// Drive the masked bits high, leaving the rest of the latch as is.
    pub fn set_bits<B: I2cBus>(&mut self, bus: &mut B, port: Port, mask: u8) -> Result<()> {
        let value = self.olat[port.index()] | mask;
        self.write_pins(bus, port, value)
    }

    /// Drive the masked bits low.
    pub fn clear_bits<B: I2cBus>(&mut self, bus: &mut B, port: Port, mask: u8) -> Result<()> {
        let value = self.olat[port.index()] & !mask;
        self.write_pins(bus, port, value)
    }

    /// Select which masked pins compare against the DEFVAL register (set
    /// bits) rather than flagging on any change.
    pub fn set_interrupt_compare<B: I2cBus>(
        &mut self,
        bus: &mut B,
        port: Port,
        mask: u8,
    ) -> Result<()> {
        self.write_reg(bus, port.reg(INTCON), mask)
    }

    /// Set the default comparison value; a pin configured via
    /// `set_interrupt_compare` flags when it leaves this level.
    pub fn set_interrupt_default<B: I2cBus>(
        &mut self,
        bus: &mut B,
        port: Port,
        value: u8,
    ) -> Result<()> {
        self.write_reg(bus, port.reg(DEFVAL), value)
    }

    /// Enable interrupt-on-change for the masked pins; zero disables.
    pub fn enable_interrupts<B: I2cBus>(
        &mut self,
        bus: &mut B,
        port: Port,
        mask: u8,
    ) -> Result<()> {
        self.write_reg(bus, port.reg(GPINTEN), mask)
    }

    /// Read the interrupt flags. Flags clear when the pins are read, not
    /// here.
    pub fn interrupt_flags<B: I2cBus>(&mut self, bus: &mut B, port: Port) -> Result<u8> {
        self.read_reg(bus, port.reg(INTF))
    }
}

/// PCF8574 8-bit quasi-bidirectional expander.
///
/// A single register: writing sets the output latch, reading returns pin
/// levels. Pins written high are weakly pulled up and double as inputs.
pub struct Pcf8574 {
    addr: u8,
    /// The chip powers up with all lines high.
    latch: u8,
}

impl Pcf8574 {
    pub fn new(addr: u8) -> Self {
        Self { addr, latch: 0xFF }
    }

    pub fn address(&self) -> u8 {
        self.addr
    }

    pub fn write_pins<B: I2cBus>(&mut self, bus: &mut B, value: u8) -> Result<()> {
        self.latch = value;
        bus.write(self.addr, &[value])
    }

    pub fn read_pins<B: I2cBus>(&mut self, bus: &mut B) -> Result<u8> {
        let mut buf = [0u8; 1];
        bus.read(self.addr, &mut buf)?;
        Ok(buf[0])
    }

    pub fn set_bits<B: I2cBus>(&mut self, bus: &mut B, mask: u8) -> Result<()> {
        let value = self.latch | mask;
        self.write_pins(bus, value)
    }

    pub fn clear_bits<B: I2cBus>(&mut self, bus: &mut B, mask: u8) -> Result<()> {
        let value = self.latch & !mask;
        self.write_pins(bus, value)
    }
}
