//! The `reporting.*` API methods.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use tokio::sync::mpsc;

use chainscope_codec::ContractDecoder;
use chainscope_core::database::Database;
use chainscope_core::error::StoreError;
use chainscope_core::options::QueryOptions;
use chainscope_core::types::{AccountState, Block, Event, RangeResult, Template};
use chainscope_monitor::filter::BackfillRequest;

use crate::types::{
    AddressWithData, AddressWithOptionalBlock, AddressWithOptions, AssignTemplateRequest,
    EventsResponse, ParsedEvent, ParsedTransaction, StorageRangeRequest, TemplateRequest,
};

/// The read API service. One instance serves all requests concurrently;
/// every method is a thin validation + translation over the storage façade.
pub struct RpcApis<DB> {
    db: Arc<DB>,
    backfill: Option<mpsc::Sender<BackfillRequest>>,
}

impl<DB> RpcApis<DB>
where
    DB: Database + 'static,
{
    pub fn new(db: Arc<DB>) -> Self {
        Self { db, backfill: None }
    }

    /// Wire up the backfill queue so late registrations catch up on
    /// already-persisted blocks.
    pub fn with_backfill(mut self, sender: mpsc::Sender<BackfillRequest>) -> Self {
        self.backfill = Some(sender);
        self
    }

    // ─── Address registry ─────────────────────────────────────────────────

    pub async fn add_address(&self, req: &AddressWithOptionalBlock) -> Result<(), StoreError> {
        let address = parse_address(req.address.as_deref())?;
        match req.block_number {
            Some(from) => {
                self.db.add_address_from(address, from).await?;
                if let Some(queue) = &self.backfill {
                    if queue.try_send(BackfillRequest { address, from }).is_err() {
                        tracing::warn!(address = %address, "backfill queue full, catch-up deferred");
                    }
                }
            }
            None => self.db.add_addresses(vec![address]).await?,
        }
        Ok(())
    }

    pub async fn add_addresses(&self, addresses: &[String]) -> Result<(), StoreError> {
        let parsed = addresses
            .iter()
            .map(|s| parse_address(Some(s)))
            .collect::<Result<Vec<_>, _>>()?;
        self.db.add_addresses(parsed).await
    }

    pub async fn delete_address(&self, address: Option<&str>) -> Result<(), StoreError> {
        self.db.delete_address(parse_address(address)?).await
    }

    pub async fn get_addresses(&self) -> Result<Vec<String>, StoreError> {
        let mut addresses: Vec<String> = self
            .db
            .get_addresses()
            .await?
            .into_iter()
            .map(|a| format!("{a:#x}"))
            .collect();
        addresses.sort();
        Ok(addresses)
    }

    /// The highest block whose effects on `address` are committed — the
    /// freshness measure for every other query.
    pub async fn get_last_filtered(&self, address: Option<&str>) -> Result<u64, StoreError> {
        self.db.get_last_filtered(parse_address(address)?).await
    }

    // ─── Templates ────────────────────────────────────────────────────────

    pub async fn add_template(&self, req: &TemplateRequest) -> Result<(), StoreError> {
        validate_abi(&req.abi)?;
        self.db
            .add_template(&req.name, &req.abi, &req.storage_layout)
            .await
    }

    pub async fn assign_template(&self, req: &AssignTemplateRequest) -> Result<(), StoreError> {
        let address = parse_address(req.address.as_deref())?;
        self.db.assign_template(address, &req.name).await
    }

    pub async fn get_templates(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.db.get_templates().await?;
        names.sort();
        Ok(names)
    }

    pub async fn get_template_details(&self, name: &str) -> Result<Template, StoreError> {
        self.db.get_template_details(name).await
    }

    pub async fn add_abi(&self, req: &AddressWithData) -> Result<(), StoreError> {
        let address = parse_address(req.address.as_deref())?;
        validate_abi(&req.data)?;
        self.db.add_contract_abi(address, &req.data).await
    }

    pub async fn get_abi(&self, address: Option<&str>) -> Result<String, StoreError> {
        self.db.get_contract_abi(parse_address(address)?).await
    }

    pub async fn add_storage_layout(&self, req: &AddressWithData) -> Result<(), StoreError> {
        let address = parse_address(req.address.as_deref())?;
        self.db.add_storage_layout(address, &req.data).await
    }

    pub async fn get_storage_layout(&self, address: Option<&str>) -> Result<String, StoreError> {
        self.db.get_storage_layout(parse_address(address)?).await
    }

    // ─── Raw chain data ───────────────────────────────────────────────────

    pub async fn get_block(&self, number: u64) -> Result<Block, StoreError> {
        self.db.read_block(number).await
    }

    pub async fn get_last_persisted_block_number(&self) -> Result<u64, StoreError> {
        self.db.get_last_persisted_block_number().await
    }

    /// A transaction with its payload and events decoded against the
    /// templates assigned to the contracts involved.
    pub async fn get_transaction(&self, hash: Option<&str>) -> Result<ParsedTransaction, StoreError> {
        let hash = parse_hash(hash)?;
        let tx = self.db.read_transaction(hash).await?;

        let mut parsed = ParsedTransaction {
            sig: String::new(),
            func4_bytes: Default::default(),
            parsed_data: BTreeMap::new(),
            parsed_events: Vec::new(),
            tx: tx.clone(),
        };

        let contract = tx.created_contract.or(tx.to);
        if let Some(contract) = contract {
            if let Some(decoder) = self.decoder_for(contract).await? {
                match decoder.decode_transaction(&tx) {
                    Ok(decoded) => {
                        parsed.sig = decoded.sig;
                        parsed.func4_bytes = decoded.func4_bytes;
                        parsed.parsed_data = decoded.parsed_data;
                    }
                    Err(e) => {
                        tracing::warn!(tx = %tx.hash, error = %e, "payload decode failed");
                    }
                }
            }
        }

        for event in &tx.events {
            parsed.parsed_events.push(self.parse_event(event).await?);
        }
        Ok(parsed)
    }

    pub async fn get_contract_creation_transaction(
        &self,
        address: Option<&str>,
    ) -> Result<B256, StoreError> {
        self.db
            .get_contract_creation_transaction(parse_address(address)?)
            .await
    }

    // ─── Index queries ────────────────────────────────────────────────────

    pub async fn get_all_transactions_to_address(
        &self,
        req: &AddressWithOptions,
    ) -> Result<Vec<B256>, StoreError> {
        let (address, options) = validate_query(req)?;
        self.db.get_all_transactions_to_address(address, options).await
    }

    pub async fn get_transactions_to_address_total(
        &self,
        req: &AddressWithOptions,
    ) -> Result<u64, StoreError> {
        let (address, options) = validate_query(req)?;
        self.db.get_transactions_to_address_total(address, options).await
    }

    pub async fn get_all_transactions_internal_to_address(
        &self,
        req: &AddressWithOptions,
    ) -> Result<Vec<B256>, StoreError> {
        let (address, options) = validate_query(req)?;
        self.db
            .get_all_transactions_internal_to_address(address, options)
            .await
    }

    pub async fn get_transactions_internal_to_address_total(
        &self,
        req: &AddressWithOptions,
    ) -> Result<u64, StoreError> {
        let (address, options) = validate_query(req)?;
        self.db
            .get_transactions_internal_to_address_total(address, options)
            .await
    }

    pub async fn get_all_events_from_address(
        &self,
        req: &AddressWithOptions,
    ) -> Result<EventsResponse, StoreError> {
        let (address, options) = validate_query(req)?;
        let events = self.db.get_all_events_from_address(address, options).await?;
        let mut parsed = Vec::with_capacity(events.len());
        for event in &events {
            parsed.push(self.parse_event(event).await?);
        }
        Ok(EventsResponse { events: parsed })
    }

    pub async fn get_events_from_address_total(
        &self,
        req: &AddressWithOptions,
    ) -> Result<u64, StoreError> {
        let (address, options) = validate_query(req)?;
        self.db.get_events_from_address_total(address, options).await
    }

    // ─── Storage ──────────────────────────────────────────────────────────

    pub async fn get_storage(
        &self,
        address: Option<&str>,
        block_number: u64,
    ) -> Result<AccountState, StoreError> {
        self.db.get_storage(parse_address(address)?, block_number).await
    }

    pub async fn get_storage_ranges(
        &self,
        req: &StorageRangeRequest,
    ) -> Result<Vec<RangeResult>, StoreError> {
        let address = parse_address(req.address.as_deref())?;
        if let (Some(begin), Some(end)) = (
            req.options.begin_block_number,
            req.options.end_block_number,
        ) {
            if end < begin {
                return Err(StoreError::validation(
                    "endBlockNumber is less than beginBlockNumber",
                ));
            }
        }
        self.db.get_storage_ranges(address, &req.options).await
    }

    // ─── Decoding helpers ─────────────────────────────────────────────────

    /// Build a decoder for the template assigned to `address`, if there is
    /// one and it parses into a usable ABI.
    async fn decoder_for(&self, address: Address) -> Result<Option<ContractDecoder>, StoreError> {
        let abi = match self.db.get_contract_abi(address).await {
            Ok(abi) => abi,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        if abi.is_empty() {
            return Ok(None);
        }
        match ContractDecoder::from_abi_json(&abi) {
            Ok(decoder) => Ok(Some(decoder)),
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "stored ABI is unusable");
                Ok(None)
            }
        }
    }

    async fn parse_event(&self, event: &Event) -> Result<ParsedEvent, StoreError> {
        let mut parsed = ParsedEvent {
            event: event.clone(),
            sig: String::new(),
            parsed_data: BTreeMap::new(),
        };
        if let Some(decoder) = self.decoder_for(event.address).await? {
            match decoder.decode_event(event) {
                Ok(decoded) => {
                    parsed.sig = decoded.sig;
                    parsed.parsed_data = decoded.parsed_data;
                }
                Err(e) => {
                    tracing::warn!(tx = %event.tx_hash, log = event.log_index, error = %e, "event decode failed");
                }
            }
        }
        Ok(parsed)
    }
}

// ─── Validation ───────────────────────────────────────────────────────────

fn parse_address(address: Option<&str>) -> Result<Address, StoreError> {
    let raw = address.ok_or_else(|| StoreError::validation("address not provided"))?;
    if raw.is_empty() {
        return Err(StoreError::validation("address not provided"));
    }
    raw.parse()
        .map_err(|_| StoreError::validation("invalid address"))
}

fn parse_hash(hash: Option<&str>) -> Result<B256, StoreError> {
    let raw = hash.ok_or_else(|| StoreError::validation("transaction hash not provided"))?;
    raw.parse()
        .map_err(|_| StoreError::validation("invalid transaction hash"))
}

/// ABI strings must be well-formed JSON; the parser error is surfaced
/// verbatim. Whether the JSON is a usable ABI is decided at decode time.
fn validate_abi(abi: &str) -> Result<(), StoreError> {
    serde_json::from_str::<serde_json::Value>(abi)
        .map(|_| ())
        .map_err(|e| StoreError::validation(e.to_string()))
}

fn validate_query(req: &AddressWithOptions) -> Result<(Address, &QueryOptions), StoreError> {
    let address = parse_address(req.address.as_deref())?;
    if let (Some(begin), Some(end)) = (
        req.options.begin_block_number,
        req.options.end_block_number,
    ) {
        if end < begin {
            return Err(StoreError::validation(
                "endBlockNumber is less than beginBlockNumber",
            ));
        }
    }
    Ok((address, &req.options))
}
