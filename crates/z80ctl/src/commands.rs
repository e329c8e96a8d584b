//! Command implementations.
//!
//! Every command that touches memory or IO acquires the bus through
//! `take_bus` and hands it back through the `BusMaster` scope, so the
//! target gets its lines back on every exit path. `--no-release` swaps the
//! release for `leave_held`, for chained invocations.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::Context;
use z80ctl_core::i2c::{I2cBus, I2cDev};
use z80ctl_core::supervisor::BusMaster;
use z80ctl_core::{Error, Supervisor};
use z80ctl_hexfile::HexImage;

use crate::console::RawMode;
use crate::hexdump::{self, ROW_LEN};
use crate::interrupt;
use crate::{BusArgs, Cli, Command, RangeArgs};

pub fn run(cli: Cli) -> anyhow::Result<()> {
    interrupt::install();
    let i2c = I2cDev::open(&cli.i2c_dev)
        .with_context(|| format!("opening {}", cli.i2c_dev.display()))?;
    let mut sup = Supervisor::new(i2c, cli.i2c_base);
    dispatch(&mut sup, cli.command)
}

fn dispatch<B: I2cBus>(sup: &mut Supervisor<B>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Reset => Ok(sup.reset()?),
        Command::Memdump { range, bus } => memdump(sup, &range, &bus),
        Command::Savehex { range, file, bus } => savehex(sup, &range, file.as_deref(), &bus),
        Command::Loadhex { file, reset, bus } => loadhex(sup, file.as_deref(), reset, &bus),
        Command::Peek { addr, bus } => peek(sup, addr, &bus),
        Command::Poke { addr, value, bus } => poke(sup, addr, value, &bus),
        Command::Ioread { addr, bus } => ioread(sup, addr, &bus),
        Command::Iowrite { addr, value, bus } => iowrite(sup, addr, value, &bus),
        Command::Iowatch { addr, bus } => iowatch(sup, addr, &bus),
        Command::Slowclock { rate } => Ok(sup.slow_clock(rate, interrupt::interrupted)?),
        Command::Autostep { rate } => Ok(sup.autostep(rate, interrupt::interrupted)?),
        Command::Singlestep => singlestep(sup),
        Command::Showint => showint(sup),
    }
}

/// Take the bus, run `body`, then release (or keep holding, with
/// `--no-release`). The body's error wins over a release failure.
fn with_bus<B: I2cBus, T>(
    sup: &mut Supervisor<B>,
    bus: &BusArgs,
    reset_on_release: bool,
    body: impl FnOnce(&mut BusMaster<'_, B>) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let mut master = sup.take_bus(bus.bank)?;
    let result = body(&mut master);
    let released = if bus.no_release {
        master.leave_held();
        Ok(())
    } else {
        master.release(reset_on_release)
    };
    match (result, released) {
        (Err(e), Err(release_err)) => {
            log::warn!("bus release after a failed command also failed: {release_err}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(e)) => Err(e.into()),
        (Ok(value), Ok(())) => Ok(value),
    }
}

fn check_range(range: &RangeArgs) -> Result<(), Error> {
    if u32::from(range.addr) + range.count > 0x10000 {
        return Err(Error::InvalidArgument(format!(
            "range {:#06x}+{} runs past the 64 KiB address space",
            range.addr, range.count
        )));
    }
    Ok(())
}

fn check_interrupted() -> anyhow::Result<()> {
    if interrupt::interrupted() {
        anyhow::bail!("interrupted");
    }
    Ok(())
}

fn memdump<B: I2cBus>(
    sup: &mut Supervisor<B>,
    range: &RangeArgs,
    bus: &BusArgs,
) -> anyhow::Result<()> {
    check_range(range)?;
    let (addr, count) = (range.addr, range.count);
    with_bus(sup, bus, false, |master| {
        let mut row_start = addr;
        let mut remaining = count;
        while remaining > 0 {
            check_interrupted()?;
            let row_len = remaining.min(ROW_LEN as u32) as usize;
            let mut row = Vec::with_capacity(row_len);
            for i in 0..row_len {
                row.push(master.mem_read(row_start.wrapping_add(i as u16))?);
            }
            println!("{}", hexdump::format_row(row_start, &row));
            row_start = row_start.wrapping_add(row_len as u16);
            remaining -= row_len as u32;
        }
        Ok(())
    })
}

fn savehex<B: I2cBus>(
    sup: &mut Supervisor<B>,
    range: &RangeArgs,
    file: Option<&Path>,
    bus: &BusArgs,
) -> anyhow::Result<()> {
    check_range(range)?;
    let (addr, count) = (range.addr, range.count);
    let image = with_bus(sup, bus, false, |master| {
        let mut image = HexImage::new(addr);
        for i in 0..count {
            check_interrupted()?;
            image.push(master.mem_read(addr.wrapping_add(i as u16))?);
        }
        Ok(image)
    })?;
    match file {
        Some(path) => fs::write(path, image.to_string())
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{image}"),
    }
    Ok(())
}

fn loadhex<B: I2cBus>(
    sup: &mut Supervisor<B>,
    file: Option<&Path>,
    reset: bool,
    bus: &BusArgs,
) -> anyhow::Result<()> {
    let text = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            text
        }
    };
    let image: HexImage = text.parse()?;
    log::info!("image: {} bytes at {:#06x}", image.len(), image.base);
    with_bus(sup, bus, reset, |master| {
        let mut offset = image.base;
        for &byte in &image.data {
            check_interrupted()?;
            master.mem_write(offset, byte)?;
            offset = offset.wrapping_add(1);
        }
        Ok(())
    })
}

fn peek<B: I2cBus>(sup: &mut Supervisor<B>, addr: u16, bus: &BusArgs) -> anyhow::Result<()> {
    let value = with_bus(sup, bus, false, |master| Ok(master.mem_read(addr)?))?;
    println!("{value:02X}");
    Ok(())
}

fn poke<B: I2cBus>(
    sup: &mut Supervisor<B>,
    addr: u16,
    value: u8,
    bus: &BusArgs,
) -> anyhow::Result<()> {
    with_bus(sup, bus, false, |master| Ok(master.mem_write(addr, value)?))
}

fn ioread<B: I2cBus>(sup: &mut Supervisor<B>, addr: u16, bus: &BusArgs) -> anyhow::Result<()> {
    let value = with_bus(sup, bus, false, |master| Ok(master.io_read(addr)?))?;
    println!("{value:02X}");
    Ok(())
}

fn iowrite<B: I2cBus>(
    sup: &mut Supervisor<B>,
    addr: u16,
    value: u8,
    bus: &BusArgs,
) -> anyhow::Result<()> {
    with_bus(sup, bus, false, |master| Ok(master.io_write(addr, value)?))
}

fn iowatch<B: I2cBus>(sup: &mut Supervisor<B>, addr: u16, bus: &BusArgs) -> anyhow::Result<()> {
    with_bus(sup, bus, false, |master| {
        let mut last = None;
        while !interrupt::interrupted() {
            let value = master.io_read(addr)?;
            if last != Some(value) {
                println!("{value:02X}");
                last = Some(value);
            }
        }
        Ok(())
    })
}

fn singlestep<B: I2cBus>(sup: &mut Supervisor<B>) -> anyhow::Result<()> {
    let mut keys = RawMode::enter().context("switching the terminal to raw mode")?;
    let mut arm = sup.arm_singlestep()?;
    loop {
        print!("press `s` to step, `q` to quit ");
        io::stdout().flush()?;
        match keys.read_key()? {
            b's' => {
                arm.settle()?;
                println!();
            }
            b'q' => {
                println!();
                break;
            }
            _ => println!(),
        }
    }
    arm.disarm()?;
    Ok(())
}

fn showint<B: I2cBus>(sup: &mut Supervisor<B>) -> anyhow::Result<()> {
    let mut last = None;
    while !interrupt::interrupted() {
        let level = sup.int_level()?;
        if last != Some(level) {
            println!("INT {}", if level { "high" } else { "low" });
            last = Some(level);
        }
    }
    Ok(())
}
