//! Intel HEX memory images.
//!
//! `savehex` and `loadhex` exchange memory ranges with the retro
//! toolchain as Intel HEX text: `:LLAAAATT<data>CC` records, where LL is
//! the payload length, AAAA the 16-bit load address, TT the record type
//! and CC a two's-complement checksum over every preceding byte. Only
//! data (00) and end-of-file (01) records are produced or accepted, which
//! covers the full 64 KiB space of the target.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Payload bytes per emitted data record.
const RECORD_LEN: usize = 16;

const TYPE_DATA: u8 = 0x00;
const TYPE_EOF: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexFileError {
    #[error("line {line}: record does not start with ':'")]
    MissingStartCode { line: usize },

    #[error("line {line}: invalid hex digit")]
    BadHexDigit { line: usize },

    #[error("line {line}: record truncated")]
    Truncated { line: usize },

    #[error("line {line}: length field does not match record size")]
    LengthMismatch { line: usize },

    #[error("line {line}: checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    BadChecksum { line: usize, expected: u8, found: u8 },

    #[error("line {line}: unsupported record type {kind:#04x}")]
    UnsupportedType { line: usize, kind: u8 },

    #[error("line {line}: record at {found:#06x} is not contiguous with {expected:#06x}")]
    AddressGap { line: usize, expected: u16, found: u16 },

    #[error("line {line}: data after the end-of-file record")]
    DataAfterEof { line: usize },

    #[error("missing end-of-file record")]
    MissingEof,
}

/// A contiguous run of bytes with its load address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexImage {
    pub base: u16,
    pub data: Vec<u8>,
}

impl HexImage {
    pub fn new(base: u16) -> Self {
        Self {
            base,
            data: Vec::new(),
        }
    }

    /// Append the next sequential byte, as `savehex` streams them in.
    pub fn push(&mut self, byte: u8) {
        self.data.push(byte);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for HexImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.data.chunks(RECORD_LEN).enumerate() {
            let addr = self.base.wrapping_add((i * RECORD_LEN) as u16);
            write_record(f, addr, TYPE_DATA, chunk)?;
        }
        write_record(f, 0, TYPE_EOF, &[])
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, addr: u16, kind: u8, data: &[u8]) -> fmt::Result {
    write!(f, ":{:02X}{:04X}{:02X}", data.len(), addr, kind)?;
    let mut sum = (data.len() as u8)
        .wrapping_add((addr >> 8) as u8)
        .wrapping_add(addr as u8)
        .wrapping_add(kind);
    for &byte in data {
        write!(f, "{byte:02X}")?;
        sum = sum.wrapping_add(byte);
    }
    writeln!(f, "{:02X}", sum.wrapping_neg())
}

struct Record {
    addr: u16,
    kind: u8,
    data: Vec<u8>,
}

impl Record {
    fn parse(text: &str, line: usize) -> Result<Self, HexFileError> {
        let body = text
            .strip_prefix(':')
            .ok_or(HexFileError::MissingStartCode { line })?;
        if body.len() % 2 != 0 {
            return Err(HexFileError::Truncated { line });
        }
        let bytes: Vec<u8> = (0..body.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&body[i..i + 2], 16))
            .collect::<Result<_, _>>()
            .map_err(|_| HexFileError::BadHexDigit { line })?;
        // Length, address, type and checksum fields at minimum.
        if bytes.len() < 5 {
            return Err(HexFileError::Truncated { line });
        }
        if bytes[0] as usize != bytes.len() - 5 {
            return Err(HexFileError::LengthMismatch { line });
        }
        let sum: u8 = bytes[..bytes.len() - 1]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        let expected = sum.wrapping_neg();
        let found = bytes[bytes.len() - 1];
        if found != expected {
            return Err(HexFileError::BadChecksum {
                line,
                expected,
                found,
            });
        }
        Ok(Record {
            addr: u16::from(bytes[1]) << 8 | u16::from(bytes[2]),
            kind: bytes[3],
            data: bytes[4..bytes.len() - 1].to_vec(),
        })
    }
}

impl FromStr for HexImage {
    type Err = HexFileError;

    /// Parse an image. Data records must be contiguous and ascending: the
    /// loader writes bytes sequentially from the base address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut image: Option<HexImage> = None;
        let mut saw_eof = false;
        for (idx, raw) in s.lines().enumerate() {
            let line = idx + 1;
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }
            if saw_eof {
                return Err(HexFileError::DataAfterEof { line });
            }
            let record = Record::parse(text, line)?;
            match record.kind {
                TYPE_DATA => {
                    let image = image.get_or_insert_with(|| HexImage::new(record.addr));
                    let expected = image.base.wrapping_add(image.data.len() as u16);
                    if record.addr != expected {
                        return Err(HexFileError::AddressGap {
                            line,
                            expected,
                            found: record.addr,
                        });
                    }
                    image.data.extend_from_slice(&record.data);
                }
                TYPE_EOF => saw_eof = true,
                kind => return Err(HexFileError::UnsupportedType { line, kind }),
            }
        }
        if !saw_eof {
            return Err(HexFileError::MissingEof);
        }
        Ok(image.unwrap_or_else(|| HexImage::new(0)))
    }
}
