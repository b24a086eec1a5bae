use std::fmt;

/// Second word of a register to register instruction. Doubles as the one address that can
/// never be accessed, so it cannot be confused with a real operand.
pub const NO_MEMORY: u16 = 0xFFFF;

/// Number of words that may be loaded. Address `0xFFFF` is never accessible.
pub const IMAGE_MAX: usize = 0xFFFF;

/// Assembled program: words loaded from address 0, and the address execution starts at.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Image {
    words: Vec<u16>,
    entry: u16,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImageError {
    /// Missing entry address word
    Empty,
    /// Odd number of bytes
    Unaligned,
    TooLarge,
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "object file is empty"),
            Self::Unaligned => write!(f, "object file is not aligned to 16 bits"),
            Self::TooLarge => write!(f, "program is too long and cannot fit in memory"),
        }
    }
}

impl std::error::Error for ImageError {}

impl Image {
    pub(crate) fn new(words: Vec<u16>, entry: u16) -> Self {
        debug_assert!(words.len() <= IMAGE_MAX);
        Image { words, entry }
    }

    /// Build from raw words, e.g. produced by another tool.
    pub fn from_words(words: Vec<u16>, entry: u16) -> Result<Self, ImageError> {
        if words.len() > IMAGE_MAX {
            return Err(ImageError::TooLarge);
        }
        Ok(Image { words, entry })
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn entry(&self) -> u16 {
        self.entry
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Object file: entry address followed by every word, big endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        std::iter::once(self.entry)
            .chain(self.words.iter().copied())
            .flat_map(u16::to_be_bytes)
            .collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() % 2 != 0 {
            return Err(ImageError::Unaligned);
        }
        let mut words = bytes
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]));
        let entry = words.next().ok_or(ImageError::Empty)?;
        Self::from_words(words.collect(), entry)
    }
}

/// Hex dump, eight words per row.
impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entry {:04X}", self.entry)?;
        for (row, chunk) in self.words.chunks(8).enumerate() {
            write!(f, "{:04X}:", row * 8)?;
            for word in chunk {
                write!(f, " {word:04X}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_file_layout() {
        let image = Image::new(vec![0x1010, 0x0006, 0xFF00], 0x0002);
        assert_eq!(
            image.to_bytes(),
            [0x00, 0x02, 0x10, 0x10, 0x00, 0x06, 0xFF, 0x00]
        );
        assert_eq!(Image::from_bytes(&image.to_bytes()), Ok(image));
    }

    #[test]
    fn bad_object_files() {
        assert_eq!(Image::from_bytes(&[]), Err(ImageError::Empty));
        assert_eq!(Image::from_bytes(&[0x00, 0x01, 0x02]), Err(ImageError::Unaligned));
        let huge = vec![0u8; (IMAGE_MAX + 2) * 2];
        assert_eq!(Image::from_bytes(&huge), Err(ImageError::TooLarge));
        // Entry word only is a valid empty program
        assert!(Image::from_bytes(&[0x00, 0x00]).unwrap().is_empty());
    }

    #[test]
    fn hex_dump() {
        let image = Image::new((0..9).collect(), 0);
        assert_eq!(
            image.to_string(),
            "entry 0000\n\
             0000: 0000 0001 0002 0003 0004 0005 0006 0007\n\
             0008: 0008\n"
        );
    }
}
