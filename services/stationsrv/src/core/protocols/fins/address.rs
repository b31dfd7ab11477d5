//! W-area bit addresses
//!
//! Textual form is `W<word>.<bit>`, for example `W511.11`. The leading `W` is
//! optional and case-insensitive.

use std::fmt;
use std::str::FromStr;

use errors::{StationError, StationResult};

/// Highest word that fits the three hex digits of a HostLink address field
pub const MAX_WORD: u16 = 0x0FFF;

/// Highest bit within a word
pub const MAX_BIT: u8 = 15;

/// One bit of the W area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitAddress {
    pub word: u16,
    pub bit: u8,
}

impl BitAddress {
    pub fn new(word: u16, bit: u8) -> StationResult<Self> {
        if word > MAX_WORD {
            return Err(invalid(
                &format!("W{word}.{bit}"),
                format!("word {word} exceeds {MAX_WORD}"),
            ));
        }
        if bit > MAX_BIT {
            return Err(invalid(
                &format!("W{word}.{bit}"),
                format!("bit {bit} outside 0-{MAX_BIT}"),
            ));
        }
        Ok(Self { word, bit })
    }

    /// Parse `W511.11`, `w511.11` or `511.11`
    pub fn parse(text: &str) -> StationResult<Self> {
        let normalized = text.trim().to_ascii_uppercase();
        let body = normalized.strip_prefix('W').unwrap_or(&normalized);

        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() != 2 {
            return Err(invalid(text, "expected <word>.<bit>".to_string()));
        }

        let word: u16 = parts[0]
            .parse()
            .map_err(|_| invalid(text, format!("word '{}' is not a number", parts[0])))?;
        let bit: u8 = parts[1]
            .parse()
            .map_err(|_| invalid(text, format!("bit '{}' is not a number", parts[1])))?;

        Self::new(word, bit).map_err(|e| match e {
            StationError::InvalidAddress { reason, .. } => invalid(text, reason),
            other => other,
        })
    }
}

impl FromStr for BitAddress {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BitAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}.{:02}", self.word, self.bit)
    }
}

fn invalid(address: &str, reason: String) -> StationError {
    StationError::InvalidAddress {
        address: address.to_string(),
        reason,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_prefix() {
        let addr = BitAddress::parse("W511.11").unwrap();
        assert_eq!(addr, BitAddress { word: 511, bit: 11 });
    }

    #[test]
    fn test_parse_is_case_insensitive_and_prefix_optional() {
        assert_eq!(
            BitAddress::parse("w511.11").unwrap(),
            BitAddress::parse("511.11").unwrap()
        );
        assert_eq!(
            " W100.0 ".parse::<BitAddress>().unwrap(),
            BitAddress { word: 100, bit: 0 }
        );
    }

    #[test]
    fn test_bit_out_of_range() {
        let err = BitAddress::parse("511.16").unwrap_err();
        assert!(matches!(err, StationError::InvalidAddress { .. }));
        assert!(err.to_string().contains("511.16"));
        assert!(BitAddress::parse("W511.15").is_ok());
    }

    #[test]
    fn test_malformed_addresses() {
        assert!(BitAddress::parse("W").is_err());
        assert!(BitAddress::parse("").is_err());
        assert!(BitAddress::parse("W511").is_err());
        assert!(BitAddress::parse("W511.1.2").is_err());
        assert!(BitAddress::parse("Wabc.1").is_err());
        assert!(BitAddress::parse("W-1.1").is_err());
        assert!(BitAddress::parse("W4096.0").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(BitAddress::new(511, 1).unwrap().to_string(), "W511.01");
    }
}
