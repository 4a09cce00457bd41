//! IDA-style wildcard byte signatures

use std::{fmt, str::FromStr};

/// Errors produced while building a [`Signature`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// octets must be separated by exactly one space
    #[error("expected a single space between octets at offset {offset}, e.g. \"01-??-23\" must be \"01 ?? 23\"")]
    Separator {
        /// byte offset of the offending separator
        offset: usize,
    },
    /// text stopped in the middle of an octet
    #[error("pattern ends in the middle of an octet")]
    Truncated,
    /// token is neither two hex digits nor a two character wildcard
    #[error("invalid octet at offset {offset}. octets must be two of a-f, A-F, 0-9, or a wildcard such as ??")]
    InvalidOctet {
        /// byte offset of the offending token
        offset: usize,
    },
    /// fewer than two concrete bytes cannot be searched selectively
    #[error("pattern has {found} concrete byte(s), at least 2 are required")]
    TooFewBytes {
        /// how many concrete bytes were found
        found: usize,
    },
    /// span is longer than a pattern may be
    #[error("pattern spans {len} octets, at most {} are allowed", Signature::MAX_LEN)]
    TooLong {
        /// the span of the rejected pattern
        len: usize,
    },
    /// mask is invalid
    #[error("mask is invalid. mask must be x or ? for wildcards")]
    Mask,
    /// mask and data differ in length
    #[error("mask is {mask} long but data is {data} long")]
    MaskLength {
        /// data length
        data: usize,
        /// mask length
        mask: usize,
    },
}

/// A parsed byte signature.
///
/// Only the concrete (non-wildcard) octets are kept, as `(position, value)` pairs
/// in ascending position order, together with the total span of the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    len: usize,
    concrete: Vec<(usize, u8)>,
}

impl Signature {
    /// Longest span a signature may have, in octets
    pub const MAX_LEN: usize = u16::MAX as usize;

    /// Parse an IDA-style pattern
    ///
    /// Octets are two hex digits separated by a single space. Any token made of
    /// two printable non-hex characters is a wildcard.
    ///
    /// # Example
    ///
    /// ```
    /// use sigindex::Signature;
    ///
    /// let sig = Signature::parse("48 8B 05 ?? ?? ?? ?? FF D0").unwrap();
    /// assert_eq!(sig.len(), 9);
    /// assert_eq!(sig.concrete().len(), 5);
    /// ```
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        if text.is_empty() {
            return Err(ParseError::TooFewBytes { found: 0 });
        }

        let bytes = text.as_bytes();

        let mut concrete = Vec::new();
        let mut len = 0;
        let mut at = 0;

        loop {
            let Some(&[hi, lo]) = bytes.get(at..at + 2) else {
                return Err(ParseError::Truncated);
            };

            match (hex_value(hi), hex_value(lo)) {
                (Some(hi), Some(lo)) => concrete.push((len, hi << 4 | lo)),
                (None, None) if hi.is_ascii_graphic() && lo.is_ascii_graphic() => (),
                _ => return Err(ParseError::InvalidOctet { offset: at }),
            }

            len += 1;
            at += 2;

            match bytes.get(at) {
                None => break,
                Some(b' ') => at += 1,
                Some(_) => return Err(ParseError::Separator { offset: at }),
            }
        }

        Self::from_parts(len, concrete)
    }

    /// Build a signature from raw data and a mask
    ///
    /// Use `x` in the mask for a known byte and `?` for an unknown byte.
    ///
    /// ```
    /// use sigindex::Signature;
    ///
    /// let sig = Signature::from_bytes_with_mask(&[0x48, 0x00, 0x05], "x?x").unwrap();
    /// assert_eq!(sig.to_string(), "48 ?? 05");
    /// ```
    pub fn from_bytes_with_mask(data: &[u8], mask: &str) -> Result<Self, ParseError> {
        if mask.len() != data.len() {
            return Err(ParseError::MaskLength {
                data: data.len(),
                mask: mask.len(),
            });
        }

        let mut concrete = Vec::with_capacity(data.len());

        for (pos, (sym, &byte)) in mask.chars().zip(data).enumerate() {
            match sym {
                'x' => concrete.push((pos, byte)),
                '?' => (),
                _ => return Err(ParseError::Mask),
            }
        }

        Self::from_parts(data.len(), concrete)
    }

    fn from_parts(len: usize, concrete: Vec<(usize, u8)>) -> Result<Self, ParseError> {
        if len > Self::MAX_LEN {
            return Err(ParseError::TooLong { len });
        }

        if concrete.len() < 2 {
            return Err(ParseError::TooFewBytes {
                found: concrete.len(),
            });
        }

        Ok(Self { len, concrete })
    }

    /// Total span of the pattern in octets, wildcards included
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// The concrete `(position, value)` pairs, ordered by position
    pub fn concrete(&self) -> &[(usize, u8)] {
        &self.concrete
    }

    /// Check the pattern directly against `buf` at `offset`, without an index.
    ///
    /// The whole span must fit inside `buf`.
    pub fn matches_at(&self, buf: &[u8], offset: usize) -> bool {
        let Some(end) = offset.checked_add(self.len) else {
            return false;
        };

        let Some(window) = buf.get(offset..end) else {
            return false;
        };

        self.concrete.iter().all(|&(pos, value)| window[pos] == value)
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 0xA),
        b'A'..=b'F' => Some(c - b'A' + 0xA),
        _ => None,
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut concrete = self.concrete.iter().peekable();

        for pos in 0..self.len {
            if pos > 0 {
                f.write_str(" ")?;
            }

            match concrete.next_if(|&&(p, _)| p == pos) {
                Some((_, value)) => write!(f, "{value:02X}")?,
                None => f.write_str("??")?,
            }
        }

        Ok(())
    }
}

impl FromStr for Signature {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Signature {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = ParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let concrete = value.iter().copied().enumerate().collect();
        Self::from_parts(value.len(), concrete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_concrete_and_wildcards() {
        let sig = Signature::parse("48 8b 05 ?? ?? ?? ?? FF D0").unwrap();

        assert_eq!(sig.len(), 9);
        assert_eq!(
            sig.concrete(),
            &[(0, 0x48), (1, 0x8B), (2, 0x05), (7, 0xFF), (8, 0xD0)]
        );
    }

    #[test]
    fn any_two_non_hex_characters_are_a_wildcard() {
        let sig = Signature::parse("01 ** xx 02").unwrap();

        assert_eq!(sig.len(), 4);
        assert_eq!(sig.concrete(), &[(0, 0x01), (3, 0x02)]);
    }

    #[test]
    fn rejects_single_concrete_byte() {
        assert_eq!(
            Signature::parse("?? 01 ??"),
            Err(ParseError::TooFewBytes { found: 1 })
        );
        assert_eq!(
            Signature::parse("01"),
            Err(ParseError::TooFewBytes { found: 1 })
        );
        assert_eq!(Signature::parse(""), Err(ParseError::TooFewBytes { found: 0 }));
    }

    #[test]
    fn rejects_bad_separators() {
        assert_eq!(
            Signature::parse("01-??-23"),
            Err(ParseError::Separator { offset: 2 })
        );
        assert_eq!(Signature::parse("01  23"), Err(ParseError::InvalidOctet { offset: 3 }));
        assert_eq!(Signature::parse("0123"), Err(ParseError::Separator { offset: 2 }));
    }

    #[test]
    fn rejects_truncated_text() {
        assert_eq!(Signature::parse("01 23 4"), Err(ParseError::Truncated));
        assert_eq!(Signature::parse("01 23 "), Err(ParseError::Truncated));
    }

    #[test]
    fn rejects_half_hex_tokens() {
        assert_eq!(
            Signature::parse("01 4? 23"),
            Err(ParseError::InvalidOctet { offset: 3 })
        );
        assert_eq!(
            Signature::parse("01 \t\t 23"),
            Err(ParseError::InvalidOctet { offset: 3 })
        );
    }

    #[test]
    fn rejects_overlong_span() {
        let text = vec!["AA"; Signature::MAX_LEN + 1].join(" ");

        assert_eq!(
            Signature::parse(&text),
            Err(ParseError::TooLong {
                len: Signature::MAX_LEN + 1
            })
        );
    }

    #[test]
    fn displays_canonical_form() {
        let sig: Signature = "7a ?? 75 ?? b9".parse().unwrap();
        assert_eq!(sig.to_string(), "7A ?? 75 ?? B9");
    }

    #[test]
    fn builds_from_mask() {
        let sig = Signature::from_bytes_with_mask(&[0xAB, 0x00, 0xCD, 0x00], "x?x?").unwrap();
        assert_eq!(sig.len(), 4);
        assert_eq!(sig.concrete(), &[(0, 0xAB), (2, 0xCD)]);

        assert_eq!(
            Signature::from_bytes_with_mask(&[0xAB, 0xCD], "x"),
            Err(ParseError::MaskLength { data: 2, mask: 1 })
        );
        assert_eq!(
            Signature::from_bytes_with_mask(&[0xAB, 0xCD], "xz"),
            Err(ParseError::Mask)
        );
        assert_eq!(
            Signature::from_bytes_with_mask(&[0xAB, 0xCD], "x?"),
            Err(ParseError::TooFewBytes { found: 1 })
        );
    }

    #[test]
    fn builds_from_plain_bytes() {
        let sig = Signature::try_from(&[0x24u8, 0xEE, 0x48][..]).unwrap();
        assert_eq!(sig.to_string(), "24 EE 48");
    }

    #[test]
    fn matches_at_respects_buffer_end() {
        let sig = Signature::parse("01 02 ??").unwrap();
        let buf = [0x00, 0x01, 0x02, 0x01, 0x02];

        assert!(sig.matches_at(&buf, 1));
        assert!(!sig.matches_at(&buf, 3));
        assert!(!sig.matches_at(&buf, 0));
        assert!(!sig.matches_at(&buf, usize::MAX));
    }
}
