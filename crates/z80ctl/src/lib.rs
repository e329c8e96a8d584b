//! Command-line surface of the z80ctl bus supervisor.

mod commands;
mod console;
mod hexdump;
mod interrupt;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub use commands::run;

#[derive(Parser)]
#[command(
    name = "z80ctl",
    version,
    about = "Bus supervisor for a Z80 single-board computer"
)]
pub struct Cli {
    /// I2C bus device the expander chips hang off.
    #[arg(long, global = true, default_value = "/dev/i2c-1")]
    pub i2c_dev: PathBuf,

    /// First of the three consecutive chip addresses (data, control,
    /// address).
    #[arg(long, global = true, default_value = "0x21", value_parser = parse_byte)]
    pub i2c_base: u8,

    /// Log the protocol chatter to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pulse the target's RESET line.
    Reset,
    /// Hex/ASCII dump of a memory range.
    Memdump {
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Read a memory range and emit it as an Intel HEX image.
    Savehex {
        #[command(flatten)]
        range: RangeArgs,
        /// Output file; stdout when absent.
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Write an Intel HEX image into memory.
    Loadhex {
        /// Input file; stdin when absent.
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Pulse RESET while the bus is still held, so the target restarts
        /// into the loaded image.
        #[arg(short, long)]
        reset: bool,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Read one memory byte.
    Peek {
        #[arg(short = 'A', long, value_parser = parse_word)]
        addr: u16,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Write one memory byte.
    Poke {
        #[arg(short = 'A', long, value_parser = parse_word)]
        addr: u16,
        #[arg(short = 'V', long, value_parser = parse_byte)]
        value: u8,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Read one IO port.
    Ioread {
        #[arg(short = 'A', long, value_parser = parse_word)]
        addr: u16,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Write one IO port.
    Iowrite {
        #[arg(short = 'A', long, value_parser = parse_word)]
        addr: u16,
        #[arg(short = 'V', long, value_parser = parse_byte)]
        value: u8,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Re-read an IO port until interrupted, printing every change.
    Iowatch {
        #[arg(short = 'A', long, value_parser = parse_word)]
        addr: u16,
        #[command(flatten)]
        bus: BusArgs,
    },
    /// Drive the clock from the host at a fixed rate until interrupted.
    Slowclock {
        /// Square-wave frequency in Hz.
        #[arg(short = 'R', long, default_value_t = 10)]
        rate: u32,
    },
    /// Step instructions continuously at a fixed rate until interrupted.
    Autostep {
        /// Instruction rate in Hz.
        #[arg(short = 'R', long, default_value_t = 10)]
        rate: u32,
    },
    /// Step one instruction per keypress.
    Singlestep,
    /// Print INT line transitions until interrupted.
    Showint,
}

#[derive(Args)]
pub struct RangeArgs {
    /// Start address.
    #[arg(short = 'A', long, default_value_t = 0, value_parser = parse_word)]
    pub addr: u16,
    /// Number of bytes.
    #[arg(short = 'C', long, default_value_t = 0x10000, value_parser = parse_count)]
    pub count: u32,
}

#[derive(Args)]
pub struct BusArgs {
    /// Memory bank to select on the paged RAM/ROM board before any
    /// access.
    #[arg(short = 'B', long, value_parser = parse_byte)]
    pub bank: Option<u8>,
    /// Keep the bus held on exit, for chained invocations.
    #[arg(short = 'n', long)]
    pub no_release: bool,
}

pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|_| format!("invalid number `{s}`"))
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let n = parse_number(s)?;
    u8::try_from(n).map_err(|_| format!("`{s}` does not fit in 8 bits"))
}

fn parse_word(s: &str) -> Result<u16, String> {
    let n = parse_number(s)?;
    u16::try_from(n).map_err(|_| format!("`{s}` does not fit in 16 bits"))
}

fn parse_count(s: &str) -> Result<u32, String> {
    let n = parse_number(s)?;
    if n > 0x10000 {
        return Err(format!("`{s}` exceeds the 64 KiB address space"));
    }
    Ok(n as u32)
}
