//! chainscope-codec — ABI parsing and payload decoding for the read path.
//!
//! A [`ContractDecoder`] is built from a stored ABI template and decodes
//! three payload shapes:
//! - function calldata, selected by the leading 4-byte selector;
//! - constructor arguments, the trailing blob after the deploy bytecode;
//! - event logs, selected by `topics[0]`.
//!
//! Decoded values normalize into [`ParsedValue`], a single canonical value
//! enum, so consumers never touch ABI-level representations. Unknown
//! selectors and topics are not errors: they decode to an empty signature
//! with no parameters.

mod decoder;
mod normalizer;
mod value;

pub use decoder::{ContractDecoder, DecodedInput, DecodedLog};
pub use value::ParsedValue;

use thiserror::Error;

/// Errors from building a decoder or decoding a payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The ABI string is not valid JSON or not a valid ABI. The message is
    /// the underlying parser error, verbatim.
    #[error("{0}")]
    InvalidAbi(String),

    /// A matched payload failed to decode against its ABI types.
    #[error("abi decode failed: {reason}")]
    AbiDecode { reason: String },
}
