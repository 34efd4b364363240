//! Wire request and response shapes for the `reporting.*` namespace.
//!
//! Addresses arrive as strings and are parsed at this boundary, so a bad
//! hex string is a validation error rather than a deserialization failure.

use std::collections::BTreeMap;

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

use chainscope_codec::ParsedValue;
use chainscope_core::options::{PageOptions, QueryOptions};
use chainscope_core::types::{Event, Transaction};

/// `addAddress` request: an address with an optional starting block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressWithOptionalBlock {
    pub address: Option<String>,
    pub block_number: Option<u64>,
}

/// `addABI` / `addStorageLayout` request: an address with a raw payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressWithData {
    pub address: Option<String>,
    pub data: String,
}

/// Paginated index query request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressWithOptions {
    pub address: Option<String>,
    pub options: QueryOptions,
}

/// Storage-range query request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageRangeRequest {
    pub address: Option<String>,
    pub options: PageOptions,
}

/// `addTemplate` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateRequest {
    pub name: String,
    pub abi: String,
    pub storage_layout: String,
}

/// `assignTemplate` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignTemplateRequest {
    pub address: Option<String>,
    pub name: String,
}

/// A transaction with its payload decoded against the assigned template.
/// `sig`, `func4_bytes` and `parsed_data` stay empty when no template is
/// assigned or the payload matches nothing in the ABI.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    #[serde(flatten)]
    pub tx: Transaction,
    pub sig: String,
    pub func4_bytes: Bytes,
    pub parsed_data: BTreeMap<String, ParsedValue>,
    pub parsed_events: Vec<ParsedEvent>,
}

/// An event with its topics and data decoded against the emitting
/// contract's template.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub sig: String,
    pub parsed_data: BTreeMap<String, ParsedValue>,
}

/// Paginated events response.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<ParsedEvent>,
}
