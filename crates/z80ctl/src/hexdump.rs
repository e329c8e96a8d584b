//! Hex/ASCII row formatting for `memdump`.

pub const ROW_LEN: usize = 16;

/// Format one dump row: a `SSSS:EEEE` range header, the bytes in hex, and
/// an ASCII column for the printable ones. Short rows are padded with
/// blanks so the ASCII column lines up across rows.
pub fn format_row(start: u16, bytes: &[u8]) -> String {
    debug_assert!(bytes.len() <= ROW_LEN);
    let end = u32::from(start) + bytes.len() as u32;
    let mut row = format!("{start:04X}:{end:04X} ");
    for byte in bytes {
        row.push_str(&format!(" {byte:02X}"));
    }
    for _ in bytes.len()..ROW_LEN {
        row.push_str("   ");
    }
    row.push_str("  ");
    for &byte in bytes {
        row.push(if (0x20..=0x7E).contains(&byte) {
            byte as char
        } else {
            '.'
        });
    }
    row
}
