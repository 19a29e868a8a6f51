//! Human-readable VM state dumps.
//!
//! Everything here goes through the VM's public introspection accessors, so
//! the renderer could live outside the crate entirely; it ships with the VM
//! because the `dumpmem` word and the host's fatal-error path both want it.

use core::fmt::{self, Write};

use crate::{vm::Forth, word::CELLS, Mode};

/// Render registers, both stacks, the dictionary, and every nonzero row of
/// the arena.
pub fn write_dump<W: Write>(out: &mut W, forth: &Forth) -> fmt::Result {
    let here = forth.here().unwrap_or(0);
    let latest = forth.latest().unwrap_or(0);
    let mode = match forth.mode() {
        Ok(Mode::Compile) => "compile",
        Ok(Mode::Run) => "run",
        Err(_) => "?",
    };
    writeln!(
        out,
        "dump: ip={:x} w={:x} here={:x} latest={:x} mode={} {{",
        forth.ip(),
        forth.w(),
        here,
        latest,
        mode,
    )?;

    let rstack = forth.return_stack_contents().unwrap_or_default();
    write!(out, "  r [{:x}] :", rstack.len())?;
    for val in rstack.iter().take(50) {
        write!(out, " {val:x}")?;
    }
    writeln!(out)?;

    let dstack = forth.data_stack_contents().unwrap_or_default();
    write!(out, "  d [{:x}] :", dstack.len())?;
    for val in dstack.iter().take(50) {
        write!(out, " {val:x}")?;
    }
    writeln!(out)?;

    for entry in forth.dictionary_entries().unwrap_or_default() {
        writeln!(
            out,
            "  [{:4x}] {}{} {:<12} cfa={:x}",
            entry.header,
            if entry.is_immediate() { 'i' } else { '-' },
            if entry.is_hidden() { 'h' } else { '-' },
            entry.name,
            entry.cfa,
        )?;
    }

    // Nonzero 16-byte rows: printable characters, then hex, grouped by cell.
    let arena = forth.arena();
    for row in (0..arena.len()).step_by(16) {
        let bytes: Vec<u8> = (row..(row + 16).min(arena.len()))
            .map(|addr| arena.read_byte(addr as crate::word::UCell).unwrap_or(0))
            .collect();
        if bytes.iter().all(|b| *b == 0) {
            continue;
        }
        write!(out, "  [{row:6x}] ")?;
        for (i, b) in bytes.iter().enumerate() {
            let c = if (32..=126).contains(b) { *b as char } else { '~' };
            write!(out, "{c}")?;
            if (i + 1) % CELLS as usize == 0 {
                write!(out, " ")?;
            }
        }
        write!(out, "  ")?;
        for (i, b) in bytes.iter().enumerate() {
            write!(out, "{b:02x}")?;
            if (i + 1) % CELLS as usize == 0 {
                write!(out, " ")?;
            }
        }
        writeln!(out)?;
    }
    writeln!(out, "}}")
}

#[cfg(test)]
pub mod test {
    use super::write_dump;
    use crate::vm::{Forth, ForthParams};

    #[test]
    fn dump_renders_state() {
        let mut forth = Forth::new(ForthParams::default()).unwrap();
        forth.input.push_text(": double dup + ; 21 double");
        forth.interpret().unwrap();

        let mut text = String::new();
        write_dump(&mut text, &forth).unwrap();
        assert!(text.contains("mode=run"));
        assert!(text.contains("double"));
        // 42 on the data stack, rendered in hex.
        assert!(text.contains("d [1] : 2a"));
    }
}
