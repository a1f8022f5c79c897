use std::fmt;

/// On-disk name of the fallback class.
pub const SYMBOLS: &str = "symbols";

/// Number of distinct keys: 10 digits, 26 case-folded letters, symbols.
pub const KEY_COUNT: usize = 37;

/// Classification of one record byte.
///
/// Letters are case-folded, so `A` and `a` land in the same class; digits
/// match exactly; every other byte falls into `Symbols`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShardKey {
    /// Lowercase ASCII letter or ASCII digit.
    Alnum(u8),
    Symbols,
}

impl ShardKey {
    #[inline]
    pub fn classify(byte: u8) -> ShardKey {
        if byte.is_ascii_alphanumeric() {
            ShardKey::Alnum(byte.to_ascii_lowercase())
        } else {
            ShardKey::Symbols
        }
    }

    /// Does `byte` belong to this class at its position?
    #[inline]
    pub fn accepts(self, byte: u8) -> bool {
        ShardKey::classify(byte) == self
    }

    /// All keys in bootstrap order: digits, letters, then symbols.
    pub fn all() -> impl Iterator<Item = ShardKey> {
        (b'0'..=b'9')
            .chain(b'a'..=b'z')
            .map(ShardKey::Alnum)
            .chain(std::iter::once(ShardKey::Symbols))
    }

    pub fn file_name(self) -> String {
        match self {
            ShardKey::Alnum(c) => (c as char).to_string(),
            ShardKey::Symbols => SYMBOLS.to_string(),
        }
    }

    /// Parse a node name back into a key. Uppercase names are rejected so
    /// that a single canonical file exists per class.
    pub fn from_file_name(name: &str) -> Option<ShardKey> {
        match name.as_bytes() {
            [c] if c.is_ascii_digit() || c.is_ascii_lowercase() => Some(ShardKey::Alnum(*c)),
            _ if name == SYMBOLS => Some(ShardKey::Symbols),
            _ => None,
        }
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardKey::Alnum(c) => write!(f, "{}", *c as char),
            ShardKey::Symbols => f.write_str(SYMBOLS),
        }
    }
}

/// Sequence of keys addressing one leaf, outermost directory first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ShardAddress(Vec<ShardKey>);

impl ShardAddress {
    pub fn new(keys: Vec<ShardKey>) -> Self {
        ShardAddress(keys)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True iff every position of the address accepts the record's byte at
    /// that position. Bytes past the address are unconstrained; a record
    /// shorter than the address never matches.
    #[inline]
    pub fn matches(&self, record: &[u8]) -> bool {
        record.len() >= self.0.len()
            && self
                .0
                .iter()
                .zip(record)
                .all(|(key, &byte)| key.accepts(byte))
    }
}

impl fmt::Display for ShardAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}
