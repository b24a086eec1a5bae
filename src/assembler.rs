use std::fmt;

use crate::{
    air::{first_pass, Air, AirStmt},
    catalog::Format,
    error::{AsmError, AsmErrorKind},
    image::{Image, NO_MEMORY},
    parser::{statements, Arg, Operand, Statement},
    symbol::{Register, SymbolTable},
};

/// Result of assembling a program, with everything needed to produce a listing.
#[derive(Clone, Debug)]
pub struct Assembly {
    pub image: Image,
    pub symbols: SymbolTable,
    air: Air,
}

impl Assembly {
    pub fn new(src: &str) -> Result<Self, AsmError> {
        let (air, symbols) = first_pass(statements(src))?;
        let image = second_pass(&air, &symbols)?;
        Ok(Assembly {
            image,
            symbols,
            air,
        })
    }

    pub fn air(&self) -> &Air {
        &self.air
    }

    /// Per statement: address, emitted words and source text.
    pub fn listing(&self) -> Listing<'_> {
        Listing(self)
    }
}

pub struct Listing<'a>(&'a Assembly);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self.0.image.words();
        for stmt in self.0.air.iter() {
            let start = stmt.addr as usize;
            let emitted = &words[start..start + stmt.size as usize];
            // Long DS/DC blocks only show their first two words
            let shown: Vec<_> = emitted.iter().take(2).map(|w| format!("{w:04X}")).collect();
            let more = if emitted.len() > 2 { "+" } else { " " };
            writeln!(
                f,
                "{:>4} {:04X} {:<9}{more} {}",
                stmt.stmt.line,
                stmt.addr,
                shown.join(" "),
                stmt.stmt.source
            )?;
        }
        Ok(())
    }
}

/// Assemble `src` into a machine image. No image is produced if any statement fails.
pub fn assemble(src: &str) -> Result<Image, AsmError> {
    Assembly::new(src).map(|asm| asm.image)
}

/// Encode every statement with its labels resolved.
pub fn second_pass(air: &Air, symbols: &SymbolTable) -> Result<Image, AsmError> {
    let mut words = Vec::with_capacity(air.end() as usize);
    for stmt in air {
        debug_assert_eq!(words.len(), stmt.addr as usize);
        let enc = Encoder {
            stmt: &stmt.stmt,
            symbols,
        };
        enc.encode(&mut words)?;
        debug_assert_eq!(words.len(), (stmt.addr + stmt.size) as usize);
    }
    let entry = entry_point(air, symbols)?;
    Ok(Image::new(words, entry))
}

/// Operand of `START` if given, else the address of `START`, else 0.
fn entry_point(air: &Air, symbols: &SymbolTable) -> Result<u16, AsmError> {
    let Some(AirStmt { addr, stmt, .. }) = air.start() else {
        return Ok(0);
    };
    match stmt.args.first() {
        Some(arg) => Encoder { stmt, symbols }.address(arg),
        None => Ok(*addr),
    }
}

#[inline]
fn instr_word(opcode: u8, r: u16, x: u16) -> u16 {
    (opcode as u16) << 8 | (r & 0xF) << 4 | (x & 0xF)
}

struct Encoder<'a> {
    stmt: &'a Statement,
    symbols: &'a SymbolTable,
}

impl Encoder<'_> {
    fn encode(&self, out: &mut Vec<u16>) -> Result<(), AsmError> {
        let desc = self.stmt.desc;
        let args = &self.stmt.args;
        match desc.format {
            Format::RegOrMem | Format::RegMem => {
                let r = self.register(&args[0])?;
                match (&args[1].operand, desc.format) {
                    (Operand::Register(r2), Format::RegOrMem) => {
                        if let Some(extra) = args.get(2) {
                            return Err(self.unsupported(
                                extra,
                                "register to register form takes no index register",
                            ));
                        }
                        out.push(instr_word(desc.opcode, r.index(), r2.index()));
                        out.push(NO_MEMORY);
                    }
                    _ => {
                        let addr = self.address(&args[1])?;
                        if desc.format == Format::RegOrMem && addr == NO_MEMORY {
                            return Err(self.unsupported(
                                &args[1],
                                "address #FFFF is reserved to mark the register form",
                            ));
                        }
                        let x = self.index(args.get(2))?;
                        out.push(instr_word(desc.opcode, r.index(), x));
                        out.push(addr);
                    }
                }
            }
            Format::Mem => {
                let addr = self.address(&args[0])?;
                let x = self.index(args.get(1))?;
                out.push(instr_word(desc.opcode, 0, x));
                out.push(addr);
            }
            Format::Reg => {
                let r = self.register(&args[0])?;
                out.push(instr_word(desc.opcode, r.index(), 0));
            }
            Format::NoOperand => out.push(instr_word(desc.opcode, 0, 0)),
            Format::DefineConstant => {
                for arg in args {
                    match &arg.operand {
                        Operand::Chars(chars) => out.extend(chars.chars().map(|c| c as u16)),
                        _ => out.push(self.address(arg)?),
                    }
                }
            }
            Format::DefineStorage => {
                if let Operand::Integer(len) = args[0].operand {
                    out.resize(out.len() + len as usize, 0);
                }
            }
            Format::Directive => {}
        }
        Ok(())
    }

    /// Value of an address or constant operand.
    fn address(&self, arg: &Arg) -> Result<u16, AsmError> {
        match &arg.operand {
            Operand::Integer(val) => Ok(*val as u16),
            Operand::Symbol(name) => self.symbols.get(name).ok_or_else(|| {
                AsmError::new(
                    AsmErrorKind::UndefinedSymbol(name.clone()),
                    self.stmt.line,
                    arg.span,
                )
            }),
            Operand::Register(_) => {
                Err(self.unsupported(arg, "expected an address, found a register"))
            }
            Operand::Chars(_) => {
                Err(self.unsupported(arg, "character constants are only allowed in DC"))
            }
        }
    }

    fn register(&self, arg: &Arg) -> Result<Register, AsmError> {
        match arg.operand {
            Operand::Register(reg) => Ok(reg),
            _ => Err(self.unsupported(arg, "expected a register")),
        }
    }

    /// Index register field, 0 when absent.
    fn index(&self, arg: Option<&Arg>) -> Result<u16, AsmError> {
        let Some(arg) = arg else {
            return Ok(0);
        };
        match self.register(arg)? {
            Register::GR0 => {
                Err(self.unsupported(arg, "GR0 cannot be used as an index register"))
            }
            reg => Ok(reg.index()),
        }
    }

    fn unsupported(&self, arg: &Arg, reason: &str) -> AsmError {
        AsmError::unsupported(&arg.text, reason, self.stmt.line, arg.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUM: &str = "
PGM     START
        LD    GR1,A      ; Load value at address A into GR1
        ADDA  GR1,B      ; Add value at address B to GR1
        ST    GR1,C      ; Store the result from GR1 into address C
A       DC    3
B       DC    5
C       DS    1
        END
";

    #[test]
    fn encodes_sum_program() {
        let image = assemble(SUM).unwrap();
        assert_eq!(
            image.words(),
            [0x1010, 0x0006, 0x2010, 0x0007, 0x1110, 0x0008, 0x0003, 0x0005, 0x0000]
        );
        assert_eq!(image.entry(), 0);
    }

    #[test]
    fn deterministic() {
        assert_eq!(assemble(SUM).unwrap(), assemble(SUM).unwrap());
    }

    #[test]
    fn labels_match_word_offsets() {
        let asm = Assembly::new(SUM).unwrap();
        for stmt in asm.air() {
            if let Some((label, _)) = &stmt.stmt.label {
                assert_eq!(asm.symbols.get(label), Some(stmt.addr));
            }
        }
        // Labels on DC point at their constant
        assert_eq!(asm.image.words()[asm.symbols.get("B").unwrap() as usize], 5);
    }

    #[test]
    fn register_to_register() {
        let image = assemble("LD GR1,GR2\nSUBA GR3,GR0").unwrap();
        assert_eq!(image.words(), [0x1012, NO_MEMORY, 0x2130, NO_MEMORY]);
    }

    #[test]
    fn index_registers() {
        let image = assemble("L LD GR1,L,GR2\nJUMP 16,GR7\nPUSH 0,GR3\nLAD GR1,-1").unwrap();
        assert_eq!(
            image.words(),
            [0x1012, 0x0000, 0x6007, 0x0010, 0x7003, 0x0000, 0x1210, 0xFFFF]
        );
    }

    #[test]
    fn single_word_forms() {
        let image = assemble("POP GR5\nRET\nNOP\nHALT").unwrap();
        assert_eq!(image.words(), [0x7150, 0x8100, 0x0000, 0xFF00]);
    }

    #[test]
    fn define_constant() {
        let image = assemble("X DC 1, -1, #ABCD, X, 'AB'").unwrap();
        assert_eq!(image.words(), [1, 0xFFFF, 0xABCD, 0, 'A' as u16, 'B' as u16]);
    }

    #[test]
    fn define_storage_is_zeroed() {
        let image = assemble("DC 7\nBUF DS 3\nDC 9").unwrap();
        assert_eq!(image.words(), [7, 0, 0, 0, 9]);
    }

    #[test]
    fn entry_point() {
        assert_eq!(assemble("NOP\nP START\nNOP").unwrap().entry(), 1);
        assert_eq!(assemble("P START GO\nDC 0\nGO NOP").unwrap().entry(), 1);
        let err = assemble("P START NOWHERE\nNOP").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UndefinedSymbol("NOWHERE".into()));
    }

    #[test]
    fn undefined_symbol() {
        let err = assemble("LOOP NOP\n     JUMP LOOPX\n     END").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UndefinedSymbol("LOOPX".into()));
        assert_eq!(err.line, 2);
        assert_eq!(err.span.len(), 5);
    }

    #[test]
    fn unsupported_operands() {
        for src in [
            "ST GR1,GR2",
            "LAD GR1,GR2",
            "JUMP GR1",
            "LD A,GR1\nA DC 0",
            "LD GR1,A,GR0\nA DC 0",
            "LD GR1,A,5\nA DC 0",
            "LD GR1,GR2,GR3",
            "POP 1",
            "DC GR1",
            "LD GR1,'A'",
            "LD GR1,#FFFF",
        ] {
            let err = assemble(src).unwrap_err();
            assert!(
                matches!(err.kind, AsmErrorKind::UnsupportedOperand { .. }),
                "{src}: {err}"
            );
        }
    }

    #[test]
    fn listing() {
        let asm = Assembly::new("A DC 1, 2, 3\n  LD GR1,A ; x\n").unwrap();
        assert_eq!(
            asm.listing().to_string(),
            "   1 0000 0001 0002+ A DC 1, 2, 3\n   2 0003 1010 0000  LD GR1,A\n"
        );
    }
}
