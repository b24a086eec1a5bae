use std::cell::RefCell;

use colored::Colorize;

use crate::runtime::{FinalState, Flags, TraceEntry};

/// Inner width of the register table.
const TABLE_WIDTH: usize = 37;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    /// Final machine state, to stdout
    Normal,
    /// Executed instructions, to stderr
    Trace,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    /// Minimal output never contains color or box drawing.
    pub fn set_minimal(new_value: bool) -> bool {
        if new_value {
            colored::control::set_override(false);
        } else {
            colored::control::unset_override();
        }
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }

    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => print!("{string}"),
            Self::Trace => eprint!("{string}"),
        }
    }

    pub fn print_registers(&self, state: &FinalState) {
        self.print_str(&registers(state));
    }

    pub fn print_trace(&self, entry: &TraceEntry) {
        if Self::is_minimal() {
            self.print_str(&format!("{entry}\n"));
        } else {
            self.print_str(&format!("{}\n", entry.to_string().blue()));
        }
    }
}

/// Registers, stack pointer, program counter and flags of `state`.
pub fn registers(state: &FinalState) -> String {
    if Output::is_minimal() {
        let mut out = String::new();
        for (i, val) in state.gr.iter().enumerate() {
            out.push_str(&format!("GR{i} {}\n", *val as i16));
        }
        out.push_str(&format!("SP {}\n", state.sp));
        out.push_str(&format!("PC {}\n", state.pc));
        out.push_str(&format!("FR {:03b}\n", flag_bits(state.flags)));
        return out;
    }

    let mut out = String::new();
    out.push_str(&format!("{}\n", format!("┌{}┐", "─".repeat(TABLE_WIDTH)).dimmed()));
    out.push_str(&format!(
        "{}{}{}\n",
        "│".dimmed(),
        format!("{:<TABLE_WIDTH$}", "       hex     uint     int  char")
            .italic()
            .dimmed(),
        "│".dimmed()
    ));
    for (i, val) in state.gr.iter().enumerate() {
        out.push_str(&row(&format!("GR{i}"), &integer(*val)));
    }
    out.push_str(&row("SP", &format!("0x{:04X}", state.sp)));
    out.push_str(&row("PC", &format!("0x{:04X}", state.pc)));
    out.push_str(&row("FR", &state.flags.to_string()));
    out.push_str(&format!("{}\n", format!("└{}┘", "─".repeat(TABLE_WIDTH)).dimmed()));
    out
}

fn row(name: &str, body: &str) -> String {
    format!(
        "{} {} {:<width$}{}\n",
        "│".dimmed(),
        format!("{name:<3}").bold(),
        body,
        "│".dimmed(),
        width = TABLE_WIDTH - 5
    )
}

/// OF, SF and ZF as three bits.
fn flag_bits(flags: Flags) -> u8 {
    (flags.of as u8) << 2 | (flags.sf as u8) << 1 | flags.zf as u8
}

/// Hex, unsigned, signed and character views of a word.
fn integer(value: u16) -> String {
    format!(
        "0x{value:04X}  {value:>6}  {:>6}  {}",
        value as i16,
        char_display(value)
    )
}

/// Always three characters wide.
fn char_display(value: u16) -> String {
    match value {
        // ASCII control characters which are arbitrarily considered significant
        0x00 => "NUL".into(),
        0x08 => "BS ".into(),
        0x09 => "HT ".into(),
        0x0a => "LF ".into(),
        0x0d => "CR ".into(),
        0x1b => "ESC".into(),
        0x7f => "DEL".into(),
        0x20 => "[_]".into(),
        0x21..=0x7e => format!("{:<3}", value as u8 as char),
        0x00..=0x7f => "───".into(),
        0x0080.. => "┄┄┄".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assemble, runtime::run};

    fn sum_state() -> FinalState {
        let image = assemble("LD GR1,A\nADDA GR1,B\nST GR1,C\nA DC 3\nB DC 5\nC DS 1").unwrap();
        run(&image, 0, 100).unwrap()
    }

    #[test]
    fn minimal_registers() {
        Output::set_minimal(true);
        let out = registers(&sum_state());
        assert_eq!(
            out,
            "GR0 0\nGR1 8\nGR2 0\nGR3 0\nGR4 0\nGR5 0\nGR6 0\nGR7 0\nSP 65535\nPC 9\nFR 000\n"
        );
    }

    #[test]
    fn register_table_rows_line_up() {
        Output::set_minimal(true);
        Output::IS_MINIMAL.with(|value| value.replace(false));
        let out = registers(&sum_state());
        let widths: Vec<_> = out.lines().map(|line| line.chars().count()).collect();
        assert_eq!(widths.len(), 14);
        assert!(widths.iter().all(|&w| w == TABLE_WIDTH + 2), "{out}");
        assert!(out.contains("│ GR1 0x0008       8       8  BS "));
        assert!(out.contains("│ FR  OF=0 SF=0 ZF=0"));
    }

    #[test]
    fn flag_bit_order() {
        let flags = Flags {
            of: true,
            sf: false,
            zf: true,
        };
        assert_eq!(flag_bits(flags), 0b101);
    }

    #[test]
    fn char_display_width() {
        for value in [0x00, 0x01, 0x0a, 0x20, b'A' as u16, 0x7f, 0x1234] {
            assert_eq!(char_display(value).chars().count(), 3, "{value:04X}");
        }
        assert_eq!(char_display(b'A' as u16), "A  ");
    }
}
