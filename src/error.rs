use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::symbol::Span;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AsmErrorKind {
    /// Malformed line
    Syntax(String),
    /// Mnemonic absent from the catalog
    UnknownOpcode(String),
    /// Label defined more than once
    DuplicateLabel(String),
    /// Operand names a label that is never defined
    UndefinedSymbol(String),
    /// Operand of the wrong kind for its position, or not an operand at all
    UnsupportedOperand { operand: String, reason: String },
}

/// Assembly failure. Reports the first offending line and token.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    /// 1-based source line
    pub line: usize,
    pub span: Span,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, line: usize, span: Span) -> Self {
        AsmError { kind, line, span }
    }

    pub fn syntax(msg: impl Into<String>, line: usize, span: Span) -> Self {
        Self::new(AsmErrorKind::Syntax(msg.into()), line, span)
    }

    pub fn unsupported(
        operand: impl Into<String>,
        reason: impl Into<String>,
        line: usize,
        span: Span,
    ) -> Self {
        Self::new(
            AsmErrorKind::UnsupportedOperand {
                operand: operand.into(),
                reason: reason.into(),
            },
            line,
            span,
        )
    }

    /// Diagnostic for display against the full program text.
    pub fn report(&self, src: &str) -> Report {
        let report = match &self.kind {
            AsmErrorKind::Syntax(msg) => miette!(
                severity = Severity::Error,
                code = "parse::syntax",
                help = "each line is `[label] mnemonic [operand, ...]`",
                labels = vec![LabeledSpan::at(self.span, "malformed statement")],
                "Syntax error on line {}: {msg}",
                self.line,
            ),
            AsmErrorKind::UnknownOpcode(mnemonic) => miette!(
                severity = Severity::Error,
                code = "parse::unknown_opcode",
                help = "check the list of available instructions in the documentation.",
                labels = vec![LabeledSpan::at(self.span, "unknown opcode")],
                "Encountered an unknown opcode `{mnemonic}`",
            ),
            AsmErrorKind::DuplicateLabel(label) => miette!(
                severity = Severity::Error,
                code = "parse::duplicate_label",
                help = "labels are only allowed once per program",
                labels = vec![LabeledSpan::at(self.span, "duplicate label")],
                "Duplicate label `{label}`",
            ),
            AsmErrorKind::UndefinedSymbol(name) => miette!(
                severity = Severity::Error,
                code = "asm::undefined_symbol",
                help = "define the label somewhere before `END`",
                labels = vec![LabeledSpan::at(self.span, "undefined label")],
                "Reference to undefined label `{name}`",
            ),
            AsmErrorKind::UnsupportedOperand { operand, reason } => miette!(
                severity = Severity::Error,
                code = "asm::unsupported_operand",
                help = "check the operands for this instruction",
                labels = vec![LabeledSpan::at(self.span, "unsupported operand")],
                "Unsupported operand `{operand}`: {reason}",
            ),
        };
        report.with_source_code(src.to_string())
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            AsmErrorKind::Syntax(msg) => write!(f, "syntax error: {msg}"),
            AsmErrorKind::UnknownOpcode(mnemonic) => write!(f, "unknown opcode `{mnemonic}`"),
            AsmErrorKind::DuplicateLabel(label) => write!(f, "duplicate label `{label}`"),
            AsmErrorKind::UndefinedSymbol(name) => write!(f, "undefined label `{name}`"),
            AsmErrorKind::UnsupportedOperand { operand, reason } => {
                write!(f, "unsupported operand `{operand}`: {reason}")
            }
        }
    }
}

impl std::error::Error for AsmError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SrcOffset;

    #[test]
    fn report_carries_code_and_label() {
        let src = "A DC 1\nA DC 2\n";
        let err = AsmError::new(
            AsmErrorKind::DuplicateLabel("A".into()),
            2,
            Span::new(SrcOffset(7), 1),
        );
        let report = err.report(src);
        assert_eq!(report.code().unwrap().to_string(), "parse::duplicate_label");
        let label = report.labels().unwrap().next().unwrap();
        assert_eq!(label.offset(), 7);
        assert_eq!(label.len(), 1);
    }

    #[test]
    fn display_names_line_and_token() {
        let err = AsmError::unsupported("@X", "not an operand", 4, Span::dummy());
        assert_eq!(err.to_string(), "line 4: unsupported operand `@X`: not an operand");
    }
}
