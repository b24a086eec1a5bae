use crate::{
    catalog::{self, Descriptor},
    error::{AsmError, AsmErrorKind},
    symbol::{Register, Span, SrcOffset},
};

/// Operand classified once when the line is read.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Register(Register),
    Symbol(String),
    /// Within -32768..=65535. Wrapped into 16 bits when encoded.
    Integer(i32),
    /// `'...'` constant, only meaningful for `DC`
    Chars(String),
}

/// An operand along with where it was written.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Arg {
    pub operand: Operand,
    pub text: String,
    pub span: Span,
}

/// Single source statement. Has optional label.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Statement {
    pub label: Option<(String, Span)>,
    pub desc: &'static Descriptor,
    pub mnemonic_span: Span,
    pub args: Vec<Arg>,
    /// 1-based
    pub line: usize,
    /// Statement text without comment or surrounding whitespace
    pub source: String,
}

impl Statement {
    pub fn mnemonic(&self) -> &'static str {
        self.desc.mnemonic
    }
}

/// Lazily parse every line of `src`. Blank and comment-only lines are skipped.
pub fn statements(src: &str) -> impl Iterator<Item = Result<Statement, AsmError>> + '_ {
    let mut offs = 0;
    src.split_inclusive('\n')
        .enumerate()
        .filter_map(move |(idx, raw)| {
            let start = offs;
            offs += raw.len();
            let line = raw.trim_end_matches(['\n', '\r']);
            parse_line(line, idx + 1, start).transpose()
        })
}

/// Parse one line starting at byte `offs` of the program. `Ok(None)` for lines without a
/// statement.
pub fn parse_line(line: &str, line_no: usize, offs: usize) -> Result<Option<Statement>, AsmError> {
    let code = &line[..comment_start(line)];
    let Some((first_start, first)) = next_word(code, 0) else {
        return Ok(None);
    };
    let span_at = |start: usize, len: usize| Span::new(SrcOffset(offs + start), len);

    let (label, mnemonic_start, mnemonic) = match catalog::lookup(first) {
        Some(_) => (None, first_start, first),
        None => {
            let label_span = span_at(first_start, first.len());
            if !is_label(first) {
                return Err(AsmError::syntax(
                    format!("invalid label `{first}`"),
                    line_no,
                    label_span,
                ));
            }
            let Some((start, mnemonic)) = next_word(code, first_start + first.len()) else {
                return Err(AsmError::syntax("missing instruction", line_no, label_span));
            };
            (Some((first.to_string(), label_span)), start, mnemonic)
        }
    };

    let mnemonic_span = span_at(mnemonic_start, mnemonic.len());
    let Some(desc) = catalog::lookup(mnemonic) else {
        return Err(AsmError::new(
            AsmErrorKind::UnknownOpcode(mnemonic.to_string()),
            line_no,
            mnemonic_span,
        ));
    };

    let operands_start = mnemonic_start + mnemonic.len();
    let mut args = Vec::new();
    if !code[operands_start..].trim().is_empty() {
        for (start, end) in split_operands(code, operands_start) {
            let raw = &code[start..end];
            let trimmed_start = start + (raw.len() - raw.trim_start().len());
            let text = raw.trim();
            let span = span_at(trimmed_start, text.len());
            if text.is_empty() {
                return Err(AsmError::syntax("empty operand", line_no, span_at(start, raw.len())));
            }
            let operand = classify(text)
                .map_err(|reason| AsmError::unsupported(text, reason, line_no, span))?;
            args.push(Arg {
                operand,
                text: text.to_string(),
                span,
            });
        }
    }

    Ok(Some(Statement {
        label,
        desc,
        mnemonic_span,
        args,
        line: line_no,
        source: code.trim().to_string(),
    }))
}

/// Byte index of the `;` starting a comment, or the line length.
fn comment_start(line: &str) -> usize {
    let mut quoted = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            ';' if !quoted => return idx,
            _ => {}
        }
    }
    line.len()
}

/// Next whitespace-delimited word at or after `from`, with its starting index.
fn next_word(s: &str, from: usize) -> Option<(usize, &str)> {
    let rest = &s[from..];
    let start = from + (rest.len() - rest.trim_start().len());
    let word = s[start..].split_whitespace().next()?;
    Some((start, word))
}

/// Ranges of comma separated operands from `from` to the end of `s`. Commas inside a
/// character constant do not split.
fn split_operands(s: &str, from: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut quoted = false;
    let mut start = from;
    for (idx, ch) in s[from..].char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                ranges.push((start, from + idx));
                start = from + idx + 1;
            }
            _ => {}
        }
    }
    ranges.push((start, s.len()));
    ranges
}

fn is_label(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
        && s.parse::<Register>().is_err()
}

fn classify(text: &str) -> Result<Operand, &'static str> {
    if let Ok(reg) = text.parse::<Register>() {
        return Ok(Operand::Register(reg));
    }
    if let Some(hex) = text.strip_prefix('#') {
        if hex.is_empty() || hex.len() > 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("hex literals are `#` followed by 1 to 4 hex digits");
        }
        return u16::from_str_radix(hex, 16)
            .map(|val| Operand::Integer(val as i32))
            .map_err(|_| "invalid hex literal");
    }
    if let Some(inner) = text.strip_prefix('\'') {
        return chars_literal(inner).map(Operand::Chars);
    }
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.starts_with(|c: char| c.is_ascii_digit()) {
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err("not a decimal literal");
        }
        return match text.parse::<i32>() {
            Ok(val) if (-32768..=65535).contains(&val) => Ok(Operand::Integer(val)),
            _ => Err("ranges from -32,768 to 32,767 or 0 to 65,535 are allowed"),
        };
    }
    if is_label(text) {
        return Ok(Operand::Symbol(text.to_string()));
    }
    Err("expected a register, literal or label")
}

/// Body of a character constant after the opening quote. `''` stands for one quote.
fn chars_literal(inner: &str) -> Result<String, &'static str> {
    let Some(body) = inner.strip_suffix('\'') else {
        return Err("unterminated character constant");
    };
    let mut res = String::new();
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' && chars.next_if_eq(&'\'').is_none() {
            return Err("a quote inside a character constant must be doubled");
        }
        if ch as u32 > 0xFFFF {
            return Err("character does not fit in one word");
        }
        res.push(ch);
    }
    if res.is_empty() {
        return Err("empty character constant");
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<Statement>, AsmError> {
        parse_line(line, 1, 0)
    }

    fn operands(line: &str) -> Vec<Operand> {
        parse(line)
            .unwrap()
            .unwrap()
            .args
            .into_iter()
            .map(|arg| arg.operand)
            .collect()
    }

    #[test]
    fn blank_and_comment_lines() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("    \t").unwrap(), None);
        assert_eq!(parse("   ; just a comment").unwrap(), None);
    }

    #[test]
    fn unlabeled_statement() {
        let stmt = parse("        LD    GR1,A      ; load").unwrap().unwrap();
        assert_eq!(stmt.label, None);
        assert_eq!(stmt.mnemonic(), "LD");
        assert_eq!(stmt.source, "LD    GR1,A");
        assert_eq!(
            stmt.args.iter().map(|a| &a.operand).collect::<Vec<_>>(),
            [&Operand::Register(Register::GR1), &Operand::Symbol("A".into())]
        );
        assert_eq!(stmt.args[1].span.range(), 18..19);
    }

    #[test]
    fn labeled_statement() {
        let stmt = parse("A       DC    3").unwrap().unwrap();
        assert_eq!(stmt.label.as_ref().map(|(l, _)| l.as_str()), Some("A"));
        assert_eq!(stmt.mnemonic(), "DC");
        assert_eq!(stmt.mnemonic_span.range(), 8..10);
    }

    #[test]
    fn no_operands_is_empty_list() {
        let stmt = parse("  RET  ").unwrap().unwrap();
        assert!(stmt.args.is_empty());
        let stmt = parse("PGM START ; entry").unwrap().unwrap();
        assert!(stmt.args.is_empty());
    }

    #[test]
    fn operands_are_trimmed() {
        assert_eq!(
            operands("LD GR1 ,  BUF , GR2"),
            [
                Operand::Register(Register::GR1),
                Operand::Symbol("BUF".into()),
                Operand::Register(Register::GR2),
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(
            operands("DC 10, -1, #00FF, 65535, +7"),
            [
                Operand::Integer(10),
                Operand::Integer(-1),
                Operand::Integer(0xFF),
                Operand::Integer(65535),
                Operand::Integer(7),
            ]
        );
        assert_eq!(
            operands("DC 'A;B', 'IT''S'"),
            [Operand::Chars("A;B".into()), Operand::Chars("IT'S".into())]
        );
        // Anything in the basic multilingual plane takes one word
        assert_eq!(operands("DC '\u{FFFD}'"), [Operand::Chars("\u{FFFD}".into())]);
    }

    #[test]
    fn missing_instruction() {
        let err = parse("LOOP").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::Syntax("missing instruction".into()));
        let err = parse("LOOP   ; comment").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::Syntax("missing instruction".into()));
    }

    #[test]
    fn unknown_opcode() {
        let err = parse("LOOP MOV GR1,GR2").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownOpcode("MOV".into()));
        assert_eq!(err.span.range(), 5..8);
    }

    #[test]
    fn invalid_label() {
        assert!(matches!(parse("1X LD GR1,A").unwrap_err().kind, AsmErrorKind::Syntax(_)));
        assert!(matches!(parse("GR1 NOP").unwrap_err().kind, AsmErrorKind::Syntax(_)));
    }

    #[test]
    fn bad_operands() {
        for line in [
            "DC 70000",
            "DC -32769",
            "DC #12345",
            "DC #XY",
            "DC 'AB",
            "DC 12AB",
            "LD GR1,@A",
            "DC '\u{1F600}'",
        ] {
            assert!(
                matches!(
                    parse(line).unwrap_err().kind,
                    AsmErrorKind::UnsupportedOperand { .. }
                ),
                "{line}"
            );
        }
        assert!(matches!(parse("LD GR1,,A").unwrap_err().kind, AsmErrorKind::Syntax(_)));
    }

    #[test]
    fn statements_track_lines_and_offsets() {
        let src = "; header\n\nA DC 1\r\n  NOP\n";
        let stmts: Vec<_> = statements(src).collect::<Result<_, _>>().unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].line, 3);
        assert_eq!(stmts[1].line, 4);
        assert_eq!(stmts[1].mnemonic_span.offs(), src.find("NOP").unwrap());
    }
}
