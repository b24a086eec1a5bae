/// Operand shape of an instruction. Determines both how it is encoded and how it executes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Format {
    /// `r1, r2` or `r, adr[, x]`
    RegOrMem,
    /// `r, adr[, x]`
    RegMem,
    /// `adr[, x]`
    Mem,
    /// `r`
    Reg,
    NoOperand,
    /// `DC`
    DefineConstant,
    /// `DS`
    DefineStorage,
    /// `START` and `END`
    Directive,
}

impl Format {
    /// Formats that are followed by an address word.
    pub fn has_address_word(self) -> bool {
        matches!(self, Format::RegOrMem | Format::RegMem | Format::Mem)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrKind {
    Start,
    End,
    Ds,
    Dc,
    Nop,
    Ld,
    St,
    Lad,
    Adda,
    Suba,
    Addl,
    Subl,
    And,
    Or,
    Xor,
    Cpa,
    Cpl,
    Sla,
    Sra,
    Sll,
    Srl,
    Jump,
    Jpl,
    Jmi,
    Jnz,
    Jze,
    Jov,
    Push,
    Pop,
    Call,
    Ret,
    Svc,
    Halt,
}

/// Static description of a single mnemonic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Descriptor {
    pub mnemonic: &'static str,
    /// Meaningless for directives.
    pub opcode: u8,
    pub format: Format,
    /// Words emitted by one instance. Variable for `DC` and `DS`, which are sized by their
    /// operands.
    pub words: u16,
    pub kind: InstrKind,
}

impl Descriptor {
    /// Whether the interpreter can execute this row.
    pub fn is_machine(&self) -> bool {
        !matches!(
            self.format,
            Format::DefineConstant | Format::DefineStorage | Format::Directive
        )
    }
}

const fn row(
    mnemonic: &'static str,
    opcode: u8,
    format: Format,
    words: u16,
    kind: InstrKind,
) -> Descriptor {
    Descriptor {
        mnemonic,
        opcode,
        format,
        words,
        kind,
    }
}

use Format::*;
use InstrKind::*;

#[rustfmt::skip]
pub const CATALOG: &[Descriptor] = &[
    // Directives
    row("START", 0x00, Directive,      0, Start),
    row("END",   0x00, Directive,      0, End),
    row("DS",    0x00, DefineStorage,  0, Ds),
    row("DC",    0x00, DefineConstant, 1, Dc),
    // Data transfer
    row("NOP",   0x00, NoOperand,      1, Nop),
    row("LD",    0x10, RegOrMem,       2, Ld),
    row("ST",    0x11, RegMem,         2, St),
    row("LAD",   0x12, RegMem,         2, Lad),
    // Arithmetic
    row("ADDA",  0x20, RegOrMem,       2, Adda),
    row("SUBA",  0x21, RegOrMem,       2, Suba),
    row("ADDL",  0x22, RegOrMem,       2, Addl),
    row("SUBL",  0x23, RegOrMem,       2, Subl),
    // Logical
    row("AND",   0x30, RegOrMem,       2, And),
    row("OR",    0x31, RegOrMem,       2, Or),
    row("XOR",   0x32, RegOrMem,       2, Xor),
    // Compare
    row("CPA",   0x40, RegOrMem,       2, Cpa),
    row("CPL",   0x41, RegOrMem,       2, Cpl),
    // Shift
    row("SLA",   0x50, RegOrMem,       2, Sla),
    row("SRA",   0x51, RegOrMem,       2, Sra),
    row("SLL",   0x52, RegOrMem,       2, Sll),
    row("SRL",   0x53, RegOrMem,       2, Srl),
    // Branch
    row("JUMP",  0x60, Mem,            2, Jump),
    row("JPL",   0x61, Mem,            2, Jpl),
    row("JMI",   0x62, Mem,            2, Jmi),
    row("JNZ",   0x63, Mem,            2, Jnz),
    row("JZE",   0x64, Mem,            2, Jze),
    row("JOV",   0x65, Mem,            2, Jov),
    // Stack
    row("PUSH",  0x70, Mem,            2, Push),
    row("POP",   0x71, Reg,            1, Pop),
    // Subroutine
    row("CALL",  0x80, Mem,            2, Call),
    row("RET",   0x81, NoOperand,      1, Ret),
    // Other
    row("SVC",   0x90, Mem,            2, Svc),
    row("HALT",  0xFF, NoOperand,      1, Halt),
];

pub fn lookup(mnemonic: &str) -> Option<&'static Descriptor> {
    CATALOG.iter().find(|desc| desc.mnemonic == mnemonic)
}

/// Reverse lookup used by the decoder. Only machine instructions have an opcode.
pub fn by_opcode(opcode: u8) -> Option<&'static Descriptor> {
    CATALOG
        .iter()
        .find(|desc| desc.is_machine() && desc.opcode == opcode)
}
