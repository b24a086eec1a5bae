use crate::{
    catalog::{Format, InstrKind},
    error::{AsmError, AsmErrorKind},
    parser::{Operand, Statement},
    symbol::SymbolTable,
};

/// Highest location counter a program may reach. Address `0xFFFF` is not addressable.
const ADDR_LIMIT: u32 = 0xFFFF;

/// Assembly intermediate representation: every statement up to `END` with its address.
#[derive(Clone, Default, Debug)]
pub struct Air {
    /// Index of the `START` statement, if any
    start: Option<usize>,
    stmts: Vec<AirStmt>,
    /// Location counter after the last statement
    end: u16,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AirStmt {
    pub addr: u16,
    /// Words this statement occupies in the image
    pub size: u16,
    pub stmt: Statement,
}

impl Air {
    pub fn new() -> Self {
        Air::default()
    }

    /// Set the `START` statement for the program. Error if set twice.
    fn set_start(&mut self, stmt: &Statement) -> Result<(), AsmError> {
        if self.start.is_some() {
            return Err(AsmError::syntax(
                "START set twice",
                stmt.line,
                stmt.mnemonic_span,
            ));
        }
        self.start = Some(self.stmts.len());
        Ok(())
    }

    pub fn start(&self) -> Option<&AirStmt> {
        self.start.map(|idx| &self.stmts[idx])
    }

    pub fn get(&self, idx: usize) -> &AirStmt {
        &self.stmts[idx]
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Total words of the program.
    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AirStmt> {
        self.stmts.iter()
    }
}

impl<'a> IntoIterator for &'a Air {
    type Item = &'a AirStmt;
    type IntoIter = std::slice::Iter<'a, AirStmt>;

    fn into_iter(self) -> Self::IntoIter {
        self.stmts.iter()
    }
}

/// Assign an address to every statement and collect label definitions. Statements after
/// `END` are never pulled from `stmts`.
pub fn first_pass<I>(stmts: I) -> Result<(Air, SymbolTable), AsmError>
where
    I: IntoIterator<Item = Result<Statement, AsmError>>,
{
    let mut air = Air::new();
    let mut symbols = SymbolTable::new();
    let mut counter: u32 = 0;

    for stmt in stmts {
        let stmt = stmt?;
        check_arity(&stmt)?;
        let size = footprint(&stmt)?;
        let addr = counter as u16;

        if let Some((label, span)) = &stmt.label {
            if !symbols.define(label, addr) {
                return Err(AsmError::new(
                    AsmErrorKind::DuplicateLabel(label.clone()),
                    stmt.line,
                    *span,
                ));
            }
        }

        counter += size as u32;
        if counter > ADDR_LIMIT {
            return Err(AsmError::syntax(
                "program does not fit in memory",
                stmt.line,
                stmt.mnemonic_span,
            ));
        }

        let kind = stmt.desc.kind;
        if kind == InstrKind::Start {
            air.set_start(&stmt)?;
        }
        air.stmts.push(AirStmt { addr, size, stmt });
        if kind == InstrKind::End {
            break;
        }
    }

    air.end = counter as u16;
    Ok((air, symbols))
}

/// Words emitted for `stmt`.
fn footprint(stmt: &Statement) -> Result<u16, AsmError> {
    match stmt.desc.format {
        Format::DefineStorage => {
            let arg = &stmt.args[0];
            match arg.operand {
                Operand::Integer(len) if len >= 0 => Ok(len as u16),
                _ => Err(AsmError::unsupported(
                    &arg.text,
                    "DS expects a non-negative decimal length",
                    stmt.line,
                    arg.span,
                )),
            }
        }
        Format::DefineConstant => {
            let words: usize = stmt
                .args
                .iter()
                .map(|arg| match &arg.operand {
                    Operand::Chars(chars) => chars.chars().count(),
                    _ => 1,
                })
                .sum();
            u16::try_from(words).map_err(|_| {
                AsmError::syntax("too many constants", stmt.line, stmt.mnemonic_span)
            })
        }
        _ => Ok(stmt.desc.words),
    }
}

/// Operand count per format. Operand kinds are checked by the encoders.
fn check_arity(stmt: &Statement) -> Result<(), AsmError> {
    let (min, max, expected) = match (stmt.desc.format, stmt.desc.kind) {
        (Format::RegOrMem | Format::RegMem, _) => (2, 3, "2 or 3"),
        (Format::Mem, _) => (1, 2, "1 or 2"),
        (Format::Reg, _) => (1, 1, "1"),
        (Format::NoOperand, _) | (Format::Directive, InstrKind::End) => (0, 0, "no"),
        (Format::Directive, _) => (0, 1, "at most 1"),
        (Format::DefineStorage, _) => (1, 1, "1"),
        (Format::DefineConstant, _) => (1, usize::MAX, "at least 1"),
    };
    let found = stmt.args.len();
    if found < min || found > max {
        return Err(AsmError::syntax(
            format!("`{}` expects {expected} operands, found {found}", stmt.mnemonic()),
            stmt.line,
            stmt.mnemonic_span,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::statements;

    fn pass(src: &str) -> Result<(Air, SymbolTable), AsmError> {
        first_pass(statements(src))
    }

    #[test]
    fn assigns_addresses() {
        let (air, symbols) = pass(
            "PGM START
                 LD   GR1,A
                 POP  GR2
                 RET
             A   DC   3
             B   DC   5
             C   DS   1
                 END",
        )
        .unwrap();
        let addrs: Vec<_> = air.iter().map(|s| s.addr).collect();
        assert_eq!(addrs, [0, 0, 2, 3, 4, 5, 6, 7]);
        assert_eq!(symbols.get("PGM"), Some(0));
        assert_eq!(symbols.get("A"), Some(4));
        assert_eq!(symbols.get("B"), Some(5));
        assert_eq!(symbols.get("C"), Some(6));
        assert_eq!(air.end(), 7);
        assert_eq!(air.start().unwrap().stmt.mnemonic(), "START");
    }

    #[test]
    fn ds_advances_by_length() {
        let (air, symbols) = pass("X DS 10\nY DS 0\nZ DC 1, 2, 3\nW NOP").unwrap();
        assert_eq!(symbols.get("Y"), Some(10));
        assert_eq!(symbols.get("Z"), Some(10));
        assert_eq!(symbols.get("W"), Some(13));
        assert_eq!(air.get(2).size, 3);
    }

    #[test]
    fn dc_chars_take_a_word_each() {
        let (air, symbols) = pass("S DC 'HELLO', 0\nE NOP").unwrap();
        assert_eq!(air.get(0).size, 6);
        assert_eq!(symbols.get("E"), Some(6));
    }

    #[test]
    fn stops_at_end() {
        // Garbage after END is never parsed
        let (air, symbols) = pass("NOP\nEND\nX NOP\n?? what").unwrap();
        assert_eq!(air.len(), 2);
        assert_eq!(symbols.get("X"), None);
    }

    #[test]
    fn duplicate_label() {
        let err = pass("A DC 1\nB DC 2\nA DC 3").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::DuplicateLabel("A".into()));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn start_twice() {
        let err = pass("P START\nQ START").unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::Syntax(_)));
    }

    #[test]
    fn bad_ds_length() {
        for src in ["DS -1", "DS A", "DS GR1"] {
            let err = pass(src).unwrap_err();
            assert!(matches!(err.kind, AsmErrorKind::UnsupportedOperand { .. }), "{src}");
        }
    }

    #[test]
    fn operand_counts() {
        for src in ["LD GR1", "JUMP", "POP", "RET GR1", "DC", "END X", "START A, B", "NOP 1"] {
            let err = pass(src).unwrap_err();
            assert!(matches!(err.kind, AsmErrorKind::Syntax(_)), "{src}");
        }
    }

    #[test]
    fn program_too_large() {
        let err = pass("A DS 65000\nB DS 536").unwrap_err();
        assert_eq!(
            err.kind,
            AsmErrorKind::Syntax("program does not fit in memory".into())
        );
        assert!(pass("A DS 65000\nB DS 535\nEND").is_ok());
    }
}
