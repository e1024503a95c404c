//! C8 — the output formatter.
//!
//! Turns an assembled [`Program`](crate::program::Program)'s byte buffer
//! into either a raw binary image or a minimal Intel-HEX file (`spec.md`
//! §4.8, §6). Written in the teacher's byte-by-byte `std::io::Write` style
//! (`examples/renshyle-eelf/src/builder/elf32.rs`).

use std::io::{self, Write};

use crate::program::Program;

/// Raw binary: the program's byte buffer (already zero-padded to its
/// relocation offset by [`Program::assemble`]) written verbatim.
pub fn write_raw<W: Write>(program: &Program, mut target: W) -> io::Result<Vec<u8>> {
    let bytes = program
        .to_bytes()
        .map_err(|e| io::Error::other(e.to_string()))?;
    target.write_all(bytes)?;
    Ok(bytes.to_vec())
}

/// Minimal Intel-HEX: one data record holding every assembled byte at
/// address `offset`, followed by the EOF record (`spec.md` §4.8).
pub fn write_ihex<W: Write>(program: &Program, mut target: W) -> io::Result<()> {
    let bytes = program
        .to_bytes()
        .map_err(|e| io::Error::other(e.to_string()))?;
    let data = &bytes[program.offset()..];
    write_record(&mut target, program.offset() as u16, 0x00, data)?;
    write_record(&mut target, 0, 0x01, &[])
}

fn write_record<W: Write>(target: &mut W, address: u16, record_type: u8, data: &[u8]) -> io::Result<()> {
    let data_len = u8::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "a single Intel-HEX data record cannot hold more than 255 bytes",
        )
    })?;
    let mut checksum: u8 = 0;
    let mut line = Vec::with_capacity(data.len() * 2 + 16);
    line.push(b':');

    let mut push_byte = |line: &mut Vec<u8>, byte: u8| {
        checksum = checksum.wrapping_add(byte);
        write!(line, "{byte:02X}").expect("writing to a Vec<u8> never fails");
    };

    push_byte(&mut line, data_len);
    push_byte(&mut line, (address >> 8) as u8);
    push_byte(&mut line, (address & 0xFF) as u8);
    push_byte(&mut line, record_type);
    for &byte in data {
        push_byte(&mut line, byte);
    }
    let checksum = (!checksum).wrapping_add(1);
    write!(line, "{checksum:02X}")?;
    target.write_all(&line)?;
    writeln!(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CpuSpec;
    use crate::dispatch::Call;

    fn assembled() -> Program {
        let mut p = Program::new(CpuSpec::load_named("AT89S8253").expect("bundled catalog loads"));
        p.emit("nop", Call::Positional(&[])).unwrap();
        p.assemble().unwrap();
        p
    }

    #[test]
    fn raw_format_matches_program_bytes() {
        let program = assembled();
        let mut out = Vec::new();
        let bytes = write_raw(&program, &mut out).unwrap();
        assert_eq!(out, bytes);
        assert_eq!(out, vec![0x00]);
    }

    #[test]
    fn ihex_format_has_data_and_eof_record() {
        let program = assembled();
        let mut out = Vec::new();
        write_ihex(&program, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), ":0100000000FF");
        assert_eq!(lines.next().unwrap(), ":00000001FF");
        assert!(lines.next().is_none());
    }
}
