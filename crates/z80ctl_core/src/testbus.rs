//! Simulated supervisor board backing the unit tests.
//!
//! Models the register files of the three expander chips plus enough of
//! the Z80 side to exercise the supervisor: the BUSREQ/BUSACK coupling,
//! 64 KiB of memory and an IO-port map latched off the decoded address and
//! strobe edges, and a scriptable M1 line for the stepping tests. Every
//! observable register access is appended to an event log so tests can
//! assert ordering.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::error::Result;
use crate::i2c::I2cBus;
use crate::signals::{ControlSignals, DataSignals};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Chip {
    Data,
    Control,
    Address,
}

/// Observable traffic, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    DirWrite { chip: Chip, port: usize, mask: u8 },
    PinWrite { chip: Chip, port: usize, value: u8 },
    PinRead { chip: Chip, port: usize },
    IntfRead,
    CtrlWrite { value: u8 },
}

/// MCP23017 register file (IOCON.BANK = 0).
pub struct McpChip {
    ptr: u8,
    pub iodir: [u8; 2],
    pub olat: [u8; 2],
    pub gpinten: [u8; 2],
    pub defval: [u8; 2],
    pub intcon: [u8; 2],
}

impl McpChip {
    fn new() -> Self {
        Self {
            ptr: 0,
            iodir: [0xFF; 2],
            olat: [0x00; 2],
            gpinten: [0x00; 2],
            defval: [0x00; 2],
            intcon: [0x00; 2],
        }
    }
}

pub struct FakeBoard {
    base: u8,
    pub data: McpChip,
    pub address: McpChip,
    pub control_latch: u8,
    /// Target memory, indexed by the decoded (un-reversed) address.
    pub mem: Vec<u8>,
    /// IO space, keyed by the full 16-bit address.
    pub io: Vec<u8>,
    /// When false the target never acknowledges BUSREQ.
    pub ack_responds: bool,
    /// INTF reads left before the M1 flag reports set; `None` = clear.
    pub m1_flag_after: Option<usize>,
    /// GPIO-B reads reporting M1 low before it settles high again.
    pub m1_low_reads: usize,
    /// Re-latch a fetch after every completed settle, like a running
    /// target would.
    pub m1_refetch: bool,
    pub log: Vec<Event>,
    prev_mem_write: bool,
    prev_io_write: bool,
}

impl FakeBoard {
    pub fn new(base: u8) -> Self {
        Self {
            base,
            data: McpChip::new(),
            address: McpChip::new(),
            control_latch: 0xFF,
            mem: vec![0; 0x10000],
            io: vec![0; 0x10000],
            ack_responds: true,
            m1_flag_after: None,
            m1_low_reads: 0,
            m1_refetch: false,
            log: Vec::new(),
            prev_mem_write: false,
            prev_io_write: false,
        }
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn dir(&self, chip: Chip, port: usize) -> u8 {
        match chip {
            Chip::Data => self.data.iodir[port],
            Chip::Address => self.address.iodir[port],
            Chip::Control => 0xFF,
        }
    }

    pub fn busreq_high(&self) -> bool {
        self.control_latch & ControlSignals::BUSREQ.bits() != 0
    }

    pub fn clken_high(&self) -> bool {
        self.control_latch & ControlSignals::CLKEN.bits() != 0
    }

    /// Values written to the data chip's port B latch, in order.
    pub fn port_b_pin_writes(&self) -> Vec<u8> {
        self.log
            .iter()
            .filter_map(|e| match e {
                Event::PinWrite {
                    chip: Chip::Data,
                    port: 1,
                    value,
                } => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Values written to the control expander, in order.
    pub fn ctrl_writes(&self) -> Vec<u8> {
        self.log
            .iter()
            .filter_map(|e| match e {
                Event::CtrlWrite { value } => Some(*value),
                _ => None,
            })
            .collect()
    }

    fn busack_level(&self) -> bool {
        if !self.ack_responds {
            return true;
        }
        // The target acknowledges (low) for as long as BUSREQ is held low.
        self.busreq_high()
    }

    /// Effective level of a data-chip port B line: latch where driven,
    /// board state where floating.
    fn data_b_level(&self, mask: u8) -> bool {
        if self.data.iodir[1] & mask == 0 {
            self.data.olat[1] & mask != 0
        } else {
            // Floating strobes read pulled-up.
            true
        }
    }

    fn decoded_addr(&self) -> u16 {
        let high = self.address.olat[0].reverse_bits();
        let low = self.address.olat[1].reverse_bits();
        u16::from(high) << 8 | u16::from(low)
    }

    fn data_a_driven(&self) -> u8 {
        self.data.olat[0] & !self.data.iodir[0] | 0xFF & self.data.iodir[0]
    }

    fn cycle_states(&self) -> (bool, bool, bool, bool) {
        let mreq = !self.data_b_level(DataSignals::MREQ.bits());
        let iorq = !self.data_b_level(DataSignals::IORQ.bits());
        let rd = !self.data_b_level(DataSignals::RD.bits());
        let wr = !self.data_b_level(DataSignals::WR.bits());
        (mreq && wr, iorq && wr, mreq && rd, iorq && rd)
    }

    /// Commit writes on the strobe edge that activates the cycle.
    fn latch_cycles(&mut self) {
        let (mem_write, io_write, _, _) = self.cycle_states();
        let addr = self.decoded_addr() as usize;
        let value = self.data_a_driven();
        if mem_write && !self.prev_mem_write {
            self.mem[addr] = value;
        }
        if io_write && !self.prev_io_write {
            self.io[addr] = value;
        }
        self.prev_mem_write = mem_write;
        self.prev_io_write = io_write;
    }

    /// Refresh the edge trackers without committing, after direction
    /// changes.
    fn sync_cycles(&mut self) {
        let (mem_write, io_write, _, _) = self.cycle_states();
        self.prev_mem_write = mem_write;
        self.prev_io_write = io_write;
    }

    fn mcp_mut(&mut self, chip: Chip) -> &mut McpChip {
        match chip {
            Chip::Data => &mut self.data,
            Chip::Address => &mut self.address,
            Chip::Control => unreachable!(),
        }
    }

    fn mcp_write(&mut self, chip: Chip, bytes: &[u8]) {
        let reg = bytes[0];
        self.mcp_mut(chip).ptr = reg;
        let Some(&value) = bytes.get(1) else {
            return;
        };
        let port = (reg & 0x01) as usize;
        let pair = reg & !0x01;
        let file = self.mcp_mut(chip);
        match pair {
            0x00 => file.iodir[port] = value,
            0x04 => file.gpinten[port] = value,
            0x06 => file.defval[port] = value,
            0x08 => file.intcon[port] = value,
            0x12 | 0x14 => file.olat[port] = value,
            reg => panic!("unmodelled register write {reg:#04x}"),
        }
        match pair {
            0x00 => {
                self.log.push(Event::DirWrite { chip, port, mask: value });
                self.sync_cycles();
            }
            0x12 | 0x14 => {
                self.log.push(Event::PinWrite { chip, port, value });
                if chip == Chip::Data && port == 1 {
                    self.latch_cycles();
                }
            }
            _ => {}
        }
    }

    fn mcp_read(&mut self, chip: Chip) -> u8 {
        let (ptr, iodir, olat) = match chip {
            Chip::Data => (self.data.ptr, self.data.iodir, self.data.olat),
            Chip::Address => (self.address.ptr, self.address.iodir, self.address.olat),
            Chip::Control => unreachable!(),
        };
        let port = (ptr & 0x01) as usize;
        match ptr & !0x01 {
            0x0E => {
                self.log.push(Event::IntfRead);
                self.read_intf(chip, port)
            }
            0x12 => {
                self.log.push(Event::PinRead { chip, port });
                let board = self.board_pins(chip, port);
                olat[port] & !iodir[port] | board & iodir[port]
            }
            reg => panic!("unmodelled register read {reg:#04x}"),
        }
    }

    fn read_intf(&mut self, chip: Chip, port: usize) -> u8 {
        let m1 = DataSignals::M1.bits();
        if chip != Chip::Data || port != 1 || self.data.gpinten[1] & m1 == 0 {
            return 0;
        }
        match self.m1_flag_after {
            Some(0) => m1,
            Some(n) => {
                self.m1_flag_after = Some(n - 1);
                0
            }
            None => 0,
        }
    }

    fn board_pins(&mut self, chip: Chip, port: usize) -> u8 {
        match (chip, port) {
            // Data lines float high unless an active read cycle drives
            // them from memory or an IO port.
            (Chip::Data, 0) => {
                let (_, _, mem_read, io_read) = self.cycle_states();
                if mem_read {
                    self.mem[self.decoded_addr() as usize]
                } else if io_read {
                    self.io[self.decoded_addr() as usize]
                } else {
                    0xFF
                }
            }
            (Chip::Data, 1) => {
                let mut pins = 0xFF;
                if !self.busack_level() {
                    pins &= !DataSignals::BUSACK.bits();
                }
                if self.m1_level_on_read() {
                    pins |= DataSignals::M1.bits();
                } else {
                    pins &= !DataSignals::M1.bits();
                }
                pins
            }
            _ => 0xFF,
        }
    }

    fn m1_level_on_read(&mut self) -> bool {
        if self.m1_low_reads > 0 {
            self.m1_low_reads -= 1;
            return false;
        }
        // Fetch complete; the latched flag is consumed by this read.
        if self.m1_flag_after == Some(0) {
            if self.m1_refetch {
                self.m1_flag_after = Some(0);
                self.m1_low_reads = 1;
            } else {
                self.m1_flag_after = None;
            }
        }
        true
    }

    fn chip_for(&self, addr: u8) -> Chip {
        match addr.wrapping_sub(self.base) {
            0 => Chip::Data,
            1 => Chip::Control,
            2 => Chip::Address,
            _ => panic!("unexpected chip address {addr:#04x}"),
        }
    }

    fn write(&mut self, addr: u8, bytes: &[u8]) -> io::Result<()> {
        match self.chip_for(addr) {
            Chip::Control => {
                self.control_latch = bytes[0];
                let value = bytes[0];
                self.log.push(Event::CtrlWrite { value });
            }
            chip => self.mcp_write(chip, bytes),
        }
        Ok(())
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> io::Result<()> {
        let value = match self.chip_for(addr) {
            Chip::Control => self.control_latch,
            chip => self.mcp_read(chip),
        };
        for slot in buf.iter_mut() {
            *slot = value;
        }
        Ok(())
    }
}

impl I2cBus for Rc<RefCell<FakeBoard>> {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<()> {
        self.borrow_mut().write(addr, bytes)?;
        Ok(())
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.borrow_mut().read(addr, buf)?;
        Ok(())
    }
}
