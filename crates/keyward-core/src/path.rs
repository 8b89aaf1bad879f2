//! BIP32/SLIP-0010 derivation path parsing and rendering
//!
//! Paths follow the conventional `m/44'/0'/0/1` notation: a leading
//! `m` names the master node and a trailing apostrophe marks a
//! hardened segment. Parsing is strict; anything a derivation engine
//! could misread is rejected rather than coerced.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Index offset for hardened children (top bit of the u32 index)
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// A single derivation-tree index with its hardened flag packed into
/// the top bit, as both BIP32 and SLIP-0010 serialize it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildNumber(u32);

impl ChildNumber {
    /// A non-hardened component; `index` must be below 2^31.
    pub fn normal(index: u32) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(Error::InvalidPath(format!(
                "index {} out of range for a path component",
                index
            )));
        }
        Ok(Self(index))
    }

    /// A hardened component; `index` must be below 2^31.
    pub fn hardened(index: u32) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(Error::InvalidPath(format!(
                "index {} out of range for a path component",
                index
            )));
        }
        Ok(Self(index | HARDENED_OFFSET))
    }

    /// Wrap a raw u32 whose top bit already encodes the hardened flag.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw value used in derivation (hardened flag included).
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// The index without the hardened flag.
    pub fn index(&self) -> u32 {
        self.0 & !HARDENED_OFFSET
    }

    /// Whether this component selects the hardened branch.
    pub fn is_hardened(&self) -> bool {
        self.0 & HARDENED_OFFSET != 0
    }
}

impl fmt::Display for ChildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hardened() {
            write!(f, "{}'", self.index())
        } else {
            write!(f, "{}", self.index())
        }
    }
}

impl FromStr for ChildNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (digits, hardened) = match s.strip_suffix('\'') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidPath(format!("bad path segment {:?}", s)));
        }
        let index: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidPath(format!("segment {:?} overflows u32", s)))?;
        if hardened {
            Self::hardened(index)
        } else {
            Self::normal(index)
        }
    }
}

/// An ordered sequence of derivation indices (e.g. `m/44'/60'/0'/0`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivationPath {
    pub components: Vec<ChildNumber>,
}

impl DerivationPath {
    /// Create a path from components.
    pub fn new(components: Vec<ChildNumber>) -> Self {
        Self { components }
    }

    /// The empty path, naming the master node itself.
    pub fn master() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChildNumber> {
        self.components.iter()
    }

    /// Extend the path by one component.
    pub fn child(&self, component: ChildNumber) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self { components }
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    /// Accepts absolute (`m/44'/0`) and relative (`44'/0`) notation.
    /// A bare `m` anywhere but the first position is rejected, as are
    /// empty segments (so `m//0` and trailing slashes fail).
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidPath("empty path".to_string()));
        }
        let mut segments = s.split('/').peekable();
        if segments.peek() == Some(&"m") {
            segments.next();
            // "m" alone is the master path
            if segments.peek().is_none() {
                return Ok(Self::master());
            }
        }
        let mut components = Vec::new();
        for segment in segments {
            if segment == "m" {
                return Err(Error::InvalidPath(
                    "master segment only allowed at the start".to_string(),
                ));
            }
            components.push(segment.parse()?);
        }
        Ok(Self { components })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_number_values() {
        let normal = ChildNumber::normal(7).unwrap();
        assert_eq!(normal.raw(), 7);
        assert!(!normal.is_hardened());

        let hardened = ChildNumber::hardened(7).unwrap();
        assert_eq!(hardened.raw(), 7 | HARDENED_OFFSET);
        assert_eq!(hardened.index(), 7);
        assert!(hardened.is_hardened());
    }

    #[test]
    fn test_child_number_range_checks() {
        assert!(ChildNumber::normal(HARDENED_OFFSET).is_err());
        assert!(ChildNumber::hardened(HARDENED_OFFSET).is_err());
        assert!(ChildNumber::normal(HARDENED_OFFSET - 1).is_ok());
    }

    #[test]
    fn test_parse_absolute_path() {
        let path: DerivationPath = "m/44'/4218'/0'/0'/0'".parse().unwrap();
        assert_eq!(path.len(), 5);
        assert!(path.components.iter().all(|c| c.is_hardened()));
        assert_eq!(path.components[1].index(), 4218);
    }

    #[test]
    fn test_parse_relative_path() {
        let path: DerivationPath = "44'/0/1".parse().unwrap();
        assert_eq!(path.len(), 3);
        assert!(!path.components[1].is_hardened());
    }

    #[test]
    fn test_parse_master_only() {
        let path: DerivationPath = "m".parse().unwrap();
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "m");
    }

    #[test]
    fn test_reject_misplaced_master_segment() {
        assert!("m/44'/m/0".parse::<DerivationPath>().is_err());
        assert!("44'/m".parse::<DerivationPath>().is_err());
        assert!("m/m".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn test_reject_malformed_segments() {
        assert!("".parse::<DerivationPath>().is_err());
        assert!("m/".parse::<DerivationPath>().is_err());
        assert!("m//0".parse::<DerivationPath>().is_err());
        assert!("m/44'/".parse::<DerivationPath>().is_err());
        assert!("m/4x".parse::<DerivationPath>().is_err());
        assert!("m/-4".parse::<DerivationPath>().is_err());
        assert!("m/ 4".parse::<DerivationPath>().is_err());
        assert!("m/''".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn test_reject_out_of_range_indices() {
        // 2^31 cannot appear as a bare index or under a hardened marker
        assert!("m/2147483648".parse::<DerivationPath>().is_err());
        assert!("m/2147483648'".parse::<DerivationPath>().is_err());
        assert!("m/4294967296".parse::<DerivationPath>().is_err());
        assert!("m/2147483647'".parse::<DerivationPath>().is_ok());
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["m", "m/0", "m/44'/60'/0'/0/1", "m/2147483647'"] {
            let path: DerivationPath = s.parse().unwrap();
            assert_eq!(path.to_string(), s);
            let reparsed: DerivationPath = path.to_string().parse().unwrap();
            assert_eq!(reparsed, path);
        }
    }
}
