use std::{fmt, ops::Range, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Label -> address, in order of definition.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct SymbolTable {
    table: FxMap<String, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Bind `label` to `addr`. Returns false and leaves the table untouched if the label is
    /// already defined.
    pub fn define(&mut self, label: &str, addr: u16) -> bool {
        if self.table.contains_key(label) {
            return false;
        }
        self.table.insert(label.to_string(), addr);
        true
    }

    pub fn get(&self, label: &str) -> Option<u16> {
        self.table.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.table.iter().map(|(label, addr)| (label.as_str(), *addr))
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Debug)]
pub struct SrcOffset(pub usize);

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn dummy() -> Self {
        Span {
            offs: SrcOffset(0),
            len: 0,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.offs.0..self.offs.0 + self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

/// General purpose registers GR0-GR7.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Register {
    /// Contributes zero when used as an index register.
    GR0 = 0,
    GR1,
    GR2,
    GR3,
    GR4,
    GR5,
    GR6,
    GR7,
}

impl Register {
    pub fn index(self) -> u16 {
        self as u16
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GR0" => Ok(Register::GR0),
            "GR1" => Ok(Register::GR1),
            "GR2" => Ok(Register::GR2),
            "GR3" => Ok(Register::GR3),
            "GR4" => Ok(Register::GR4),
            "GR5" => Ok(Register::GR5),
            "GR6" => Ok(Register::GR6),
            "GR7" => Ok(Register::GR7),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GR{}", self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_keeps_first_binding() {
        let mut table = SymbolTable::new();
        assert!(table.define("A", 6));
        assert!(!table.define("A", 9));
        assert_eq!(table.get("A"), Some(6));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn iterates_in_definition_order() {
        let mut table = SymbolTable::new();
        table.define("Z", 0);
        table.define("A", 2);
        table.define("M", 1);
        let labels: Vec<_> = table.iter().map(|(label, _)| label).collect();
        assert_eq!(labels, ["Z", "A", "M"]);
    }

    #[test]
    fn register_names() {
        assert_eq!("GR7".parse(), Ok(Register::GR7));
        assert_eq!("GR8".parse::<Register>(), Err(()));
        assert_eq!("gr1".parse::<Register>(), Err(()));
        assert_eq!(Register::GR3.to_string(), "GR3");
    }
}
