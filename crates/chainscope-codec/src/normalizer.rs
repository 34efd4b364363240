//! Converts alloy `DynSolValue` decoding output into [`ParsedValue`].

use alloy_dyn_abi::DynSolValue;

use crate::value::ParsedValue;

/// Convert a decoded `DynSolValue` into a `ParsedValue`.
pub fn normalize(val: DynSolValue) -> ParsedValue {
    match val {
        DynSolValue::Bool(b) => ParsedValue::Bool(b),

        DynSolValue::Int(i, bits) => {
            if bits <= 128 {
                match i128::try_from(i) {
                    Ok(v) => ParsedValue::Int(v),
                    Err(_) => ParsedValue::BigInt(i.to_string()),
                }
            } else {
                ParsedValue::BigInt(i.to_string())
            }
        }

        DynSolValue::Uint(u, bits) => {
            if bits <= 128 {
                match u128::try_from(u) {
                    Ok(v) => ParsedValue::Uint(v),
                    Err(_) => ParsedValue::BigUint(u.to_string()),
                }
            } else {
                ParsedValue::BigUint(u.to_string())
            }
        }

        DynSolValue::FixedBytes(bytes, size) => {
            ParsedValue::Bytes(format!("0x{}", hex::encode(&bytes[..size])))
        }

        DynSolValue::Bytes(b) => ParsedValue::Bytes(format!("0x{}", hex::encode(b))),

        DynSolValue::String(s) => ParsedValue::Str(s),

        // Canonical lowercase hex, the normalization applied at every boundary.
        DynSolValue::Address(a) => ParsedValue::Address(format!("{a:#x}")),

        DynSolValue::Function(f) => ParsedValue::Bytes(format!("0x{}", hex::encode(f))),

        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            ParsedValue::Array(vals.into_iter().map(normalize).collect())
        }

        DynSolValue::Tuple(fields) => {
            // Unnamed tuple fields get positional names.
            ParsedValue::Tuple(
                fields
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), normalize(v)))
                    .collect(),
            )
        }
    }
}
