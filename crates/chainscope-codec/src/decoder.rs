//! Decodes transaction calldata and event logs against a stored ABI.
//!
//! Selection rules:
//! - function: first 4 bytes of calldata = `keccak256(signature)[..4]`;
//! - event: `topics[0]` = `keccak256(signature)`;
//! - constructor: the transaction created a contract; the arguments are the
//!   trailing `32 × n_inputs` bytes after the deploy bytecode (static
//!   argument convention — dynamic constructor arguments cannot be located
//!   without the bytecode length).
//!
//! Payloads that match nothing in the ABI are not errors: they produce an
//! empty signature and no parameters, so the read path degrades gracefully
//! for contracts with partial templates.

use std::collections::BTreeMap;

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::Bytes;

use chainscope_core::types::{Event, Transaction};

use crate::normalizer::normalize;
use crate::value::ParsedValue;
use crate::DecodeError;

/// Decoded calldata: signature, selector and named parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedInput {
    /// Human-readable signature with parameter names, e.g.
    /// `set(uint256 _x)` or `constructor(uint256 _initVal)`. Empty when the
    /// payload matched nothing.
    pub sig: String,
    /// The 4-byte selector; empty for constructors and unmatched payloads.
    pub func4_bytes: Bytes,
    pub parsed_data: BTreeMap<String, ParsedValue>,
}

/// Decoded event log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedLog {
    /// e.g. `event valueSet(uint256 _value)`; empty when `topics[0]`
    /// matched nothing.
    pub sig: String,
    pub parsed_data: BTreeMap<String, ParsedValue>,
}

/// A decoder built from one contract's ABI JSON.
#[derive(Debug)]
pub struct ContractDecoder {
    abi: JsonAbi,
}

impl ContractDecoder {
    /// Build a decoder from standard Ethereum ABI JSON.
    ///
    /// The error message is the underlying parser error, verbatim, so the
    /// read API can return it to callers unchanged.
    pub fn from_abi_json(abi_json: &str) -> Result<Self, DecodeError> {
        let abi: JsonAbi =
            serde_json::from_str(abi_json).map_err(|e| DecodeError::InvalidAbi(e.to_string()))?;
        Ok(Self { abi })
    }

    /// Decode a transaction's payload: constructor arguments for a
    /// creation, function calldata otherwise.
    pub fn decode_transaction(&self, tx: &Transaction) -> Result<DecodedInput, DecodeError> {
        if tx.is_contract_creation() {
            self.decode_constructor(tx.payload())
        } else {
            self.decode_call(tx.payload())
        }
    }

    /// Decode function calldata (selector + ABI-encoded inputs tuple).
    pub fn decode_call(&self, calldata: &[u8]) -> Result<DecodedInput, DecodeError> {
        if calldata.len() < 4 {
            return Ok(DecodedInput::default());
        }
        let selector: [u8; 4] = calldata[..4].try_into().unwrap_or_default();
        let func = match self.abi.functions().find(|f| f.selector().0 == selector) {
            Some(f) => f,
            None => return Ok(DecodedInput::default()),
        };

        let (names, types) = function_inputs(func)?;
        let parsed_data = decode_named_tuple(&calldata[4..], &types, &names)?;

        Ok(DecodedInput {
            sig: function_signature(func),
            func4_bytes: Bytes::copy_from_slice(&selector),
            parsed_data,
        })
    }

    /// Decode constructor arguments from deploy data.
    pub fn decode_constructor(&self, data: &[u8]) -> Result<DecodedInput, DecodeError> {
        let constructor = match self.abi.constructor() {
            Some(c) => c,
            None => return Ok(DecodedInput::default()),
        };

        let names: Vec<String> = constructor
            .inputs
            .iter()
            .enumerate()
            .map(|(i, p)| param_name(&p.name, i))
            .collect();
        let types: Vec<DynSolType> = constructor
            .inputs
            .iter()
            .map(|p| {
                p.resolve()
                    .map_err(|e| DecodeError::AbiDecode { reason: e.to_string() })
            })
            .collect::<Result<_, _>>()?;

        let args_len = 32 * types.len();
        if data.len() < args_len {
            return Ok(DecodedInput::default());
        }
        let blob = &data[data.len() - args_len..];
        let parsed_data = decode_named_tuple(blob, &types, &names)?;

        let params: Vec<(String, String)> = constructor
            .inputs
            .iter()
            .map(|p| (p.selector_type().into_owned(), p.name.clone()))
            .collect();
        Ok(DecodedInput {
            sig: render_signature("constructor", &params),
            func4_bytes: Bytes::new(),
            parsed_data,
        })
    }

    /// Decode an event log against the ABI, selected by `topics[0]`.
    pub fn decode_event(&self, event: &Event) -> Result<DecodedLog, DecodeError> {
        let topic0 = match event.topics.first() {
            Some(t) => *t,
            None => return Ok(DecodedLog::default()),
        };
        let abi_event = match self.abi.events().find(|e| e.selector() == topic0) {
            Some(e) => e,
            None => return Ok(DecodedLog::default()),
        };

        let mut parsed_data = BTreeMap::new();

        // Indexed inputs come from topics[1..] in declaration order.
        let mut topic_cursor = 1usize;
        for (i, param) in abi_event.inputs.iter().enumerate() {
            if !param.indexed {
                continue;
            }
            let ty = param
                .resolve()
                .map_err(|e| DecodeError::AbiDecode { reason: e.to_string() })?;
            let topic = match event.topics.get(topic_cursor) {
                Some(t) => t,
                None => break,
            };
            topic_cursor += 1;
            parsed_data.insert(param_name(&param.name, i), decode_topic(&ty, topic.as_slice())?);
        }

        // Non-indexed inputs are ABI-encoded together in the data payload.
        let mut names = Vec::new();
        let mut types = Vec::new();
        for (i, param) in abi_event.inputs.iter().enumerate() {
            if param.indexed {
                continue;
            }
            names.push(param_name(&param.name, i));
            types.push(
                param
                    .resolve()
                    .map_err(|e| DecodeError::AbiDecode { reason: e.to_string() })?,
            );
        }
        parsed_data.extend(decode_named_tuple(&event.data, &types, &names)?);

        let params: Vec<(String, String)> = abi_event
            .inputs
            .iter()
            .map(|p| (p.selector_type().into_owned(), p.name.clone()))
            .collect();
        Ok(DecodedLog {
            sig: format!("event {}", render_signature(&abi_event.name, &params)),
            parsed_data,
        })
    }
}

/// Decode one indexed topic word.
///
/// Value types are ABI-encoded directly into the 32-byte word. Reference
/// types (string, bytes, arrays, tuples) are stored as the keccak hash of
/// their encoding — the original value is unrecoverable, so the raw word is
/// returned as bytes.
fn decode_topic(ty: &DynSolType, word: &[u8]) -> Result<ParsedValue, DecodeError> {
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(ParsedValue::Bytes(format!("0x{}", hex::encode(word)))),
        _ => ty
            .abi_decode(word)
            .map(normalize)
            .map_err(|e| DecodeError::AbiDecode { reason: format!("topic decode: {e}") }),
    }
}

/// ABI-decode `data` as a tuple of `types` and pair with `names`.
fn decode_named_tuple(
    data: &[u8],
    types: &[DynSolType],
    names: &[String],
) -> Result<BTreeMap<String, ParsedValue>, DecodeError> {
    if types.is_empty() {
        return Ok(BTreeMap::new());
    }
    let tuple = DynSolType::Tuple(types.to_vec());
    let decoded = tuple
        .abi_decode_params(data)
        .map_err(|e| DecodeError::AbiDecode { reason: e.to_string() })?;
    let values = match decoded {
        DynSolValue::Tuple(vals) => vals,
        other => vec![other],
    };
    Ok(names
        .iter()
        .cloned()
        .zip(values.into_iter().map(normalize))
        .collect())
}

fn function_inputs(func: &Function) -> Result<(Vec<String>, Vec<DynSolType>), DecodeError> {
    let names = func
        .inputs
        .iter()
        .enumerate()
        .map(|(i, p)| param_name(&p.name, i))
        .collect();
    let types = func
        .inputs
        .iter()
        .map(|p| {
            p.resolve()
                .map_err(|e| DecodeError::AbiDecode { reason: e.to_string() })
        })
        .collect::<Result<_, _>>()?;
    Ok((names, types))
}

fn function_signature(func: &Function) -> String {
    let params: Vec<(String, String)> = func
        .inputs
        .iter()
        .map(|p| (p.selector_type().into_owned(), p.name.clone()))
        .collect();
    render_signature(&func.name, &params)
}

fn param_name(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("arg{index}")
    } else {
        name.to_string()
    }
}

/// `name(type name, type name)` — the human form with parameter names.
fn render_signature(name: &str, params: &[(String, String)]) -> String {
    let rendered: Vec<String> = params
        .iter()
        .map(|(ty, name)| {
            if name.is_empty() {
                ty.clone()
            } else {
                format!("{ty} {name}")
            }
        })
        .collect();
    format!("{}({})", name, rendered.join(", "))
}
