//! chainscope-rpc — the `reporting.*` read API surface.
//!
//! [`RpcApis`] is a thin translation layer: string-typed wire requests are
//! validated and normalized here, then forwarded to the storage façade; the
//! wire server binding that carries the JSON lives outside this crate.
//! Transaction and event payloads are decoded on the fly against the ABI
//! template assigned to the contract involved.

pub mod apis;
pub mod types;

pub use apis::RpcApis;
pub use types::{
    AddressWithData, AddressWithOptionalBlock, AddressWithOptions, AssignTemplateRequest,
    EventsResponse, ParsedEvent, ParsedTransaction, StorageRangeRequest, TemplateRequest,
};
