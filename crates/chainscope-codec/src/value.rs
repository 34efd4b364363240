//! The canonical decoded-value representation.

use serde::{Deserialize, Serialize};

/// A decoded ABI value, normalized so consumers never deal with
/// chain-level encodings.
///
/// Integers that fit native widths use the fast-path variants; anything
/// wider is carried as a decimal string, so arbitrary-precision values
/// survive the trip through JSON. Addresses render as canonical lowercase
/// hex, byte payloads as `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParsedValue {
    Uint(u128),
    /// Unsigned values wider than u128, as a decimal string.
    BigUint(String),
    Int(i128),
    /// Signed values wider than i128, as a decimal string.
    BigInt(String),
    Bool(bool),
    /// `0x`-prefixed hex of fixed or dynamic byte payloads.
    Bytes(String),
    Str(String),
    /// Canonical lowercase `0x`-prefixed hex.
    Address(String),
    Array(Vec<ParsedValue>),
    Tuple(Vec<(String, ParsedValue)>),
    Null,
}

impl ParsedValue {
    /// Coerce to u128 if this is a small unsigned value.
    pub fn as_uint(&self) -> Option<u128> {
        match self {
            ParsedValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the inner string if this is an address.
    pub fn as_address(&self) -> Option<&str> {
        match self {
            ParsedValue::Address(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_shape_is_tagged() {
        let json = serde_json::to_value(ParsedValue::Uint(42)).unwrap();
        assert_eq!(json["type"], "uint");
        assert_eq!(json["value"], 42);
    }

    #[test]
    fn coercions() {
        assert_eq!(ParsedValue::Uint(7).as_uint(), Some(7));
        assert_eq!(ParsedValue::Bool(true).as_uint(), None);
        assert_eq!(
            ParsedValue::Address("0xab".into()).as_address(),
            Some("0xab")
        );
    }
}
