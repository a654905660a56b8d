//! # Byte Order Handling
//!
//! Multi-byte numerics travel in one of four word/byte arrangements, named
//! with ABCD notation where A is the most significant byte of the value.
//!
//! For 32-bit value `0x12345678`:
//! - `Abcd`: \[0x12, 0x34, 0x56, 0x78\]
//! - `Badc`: \[0x34, 0x12, 0x78, 0x56\]
//! - `Cdab`: \[0x56, 0x78, 0x12, 0x34\]
//! - `Dcba`: \[0x78, 0x56, 0x34, 0x12\]
//!
//! The reverse-bytes flag is a separate knob. It reverses the whole
//! arranged value after the format is applied, so the two compose freely.
//! Every arrangement is its own inverse, which keeps encode and decode
//! symmetric.

use std::fmt;

/// Word/byte arrangement of multi-byte numerics.
///
/// ```rust
/// use modbus_batch::EndianFormat;
///
/// let fmt = EndianFormat::from_str("CDAB").unwrap();
/// assert_eq!(fmt, EndianFormat::Cdab);
/// assert!(fmt.has_word_swap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndianFormat {
    /// Big-endian, network order.
    #[default]
    Abcd,
    /// Bytes swapped inside each word.
    Badc,
    /// Words swapped, bytes big-endian.
    Cdab,
    /// Fully little-endian.
    Dcba,
}

impl EndianFormat {
    /// Parse the ABCD notation or a common alias (`BE`, `LE`, `BIG_ENDIAN_SWAP`, ...).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "ABCD" | "AB" | "BE" | "BIGENDIAN" | "ABCDEFGH" => Some(Self::Abcd),
            "BADC" | "BA" | "LITTLEENDIANSWAP" | "BADCFEHG" => Some(Self::Badc),
            "CDAB" | "BIGENDIANSWAP" | "GHEFCDAB" => Some(Self::Cdab),
            "DCBA" | "LE" | "LITTLEENDIAN" | "HGFEDCBA" => Some(Self::Dcba),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abcd => "ABCD",
            Self::Badc => "BADC",
            Self::Cdab => "CDAB",
            Self::Dcba => "DCBA",
        }
    }

    /// Whether 16-bit words appear in reverse order.
    #[inline]
    pub fn has_word_swap(&self) -> bool {
        matches!(self, Self::Cdab | Self::Dcba)
    }

    /// Whether the two bytes of each word are swapped.
    #[inline]
    pub fn has_byte_swap(&self) -> bool {
        matches!(self, Self::Badc | Self::Dcba)
    }

    /// Rearrange `bytes` in place. Lengths other than 2, 4 and 8 are left alone.
    pub fn arrange(&self, bytes: &mut [u8]) {
        match bytes.len() {
            2 => {
                if self.has_byte_swap() {
                    bytes.swap(0, 1);
                }
            }
            4 | 8 => {
                if self.has_word_swap() {
                    let words = bytes.len() / 2;
                    for i in 0..words / 2 {
                        let (a, b) = (i * 2, (words - 1 - i) * 2);
                        bytes.swap(a, b);
                        bytes.swap(a + 1, b + 1);
                    }
                }
                if self.has_byte_swap() {
                    for word in bytes.chunks_exact_mut(2) {
                        word.swap(0, 1);
                    }
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for EndianFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte handling applied to every multi-byte numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteLayout {
    pub format: EndianFormat,
    pub reverse: bool,
}

impl ByteLayout {
    pub fn new(format: EndianFormat, reverse: bool) -> Self {
        Self { format, reverse }
    }

    /// Big-endian value bytes to wire order.
    pub fn to_wire(&self, mut be: Vec<u8>) -> Vec<u8> {
        self.format.arrange(&mut be);
        if self.reverse {
            be.reverse();
        }
        be
    }

    /// Wire bytes back to big-endian value order.
    pub fn from_wire(&self, wire: &[u8]) -> Vec<u8> {
        let mut bytes = wire.to_vec();
        if self.reverse {
            bytes.reverse();
        }
        self.format.arrange(&mut bytes);
        bytes
    }
}
