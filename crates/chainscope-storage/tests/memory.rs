//! End-to-end coverage of the in-memory backend against the storage
//! contract: lifecycle, indexing, pagination, snapshots and rollback.

use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};
use chainscope_core::{
    AccountState, Block, BlockWithTransactions, Event, InternalCall, PageOptions, QueryOptions,
    Transaction,
};
use chainscope_core::database::{
    AddressStore, BlockStore, IndexStore, TemplateStore, TransactionStore,
};
use chainscope_storage::MemoryDatabase;

const SIMPLE_ABI: &str = r#"[
    { "type": "function", "name": "balance", "constant": true },
    { "type": "function", "name": "send", "constant": false,
      "inputs": [ { "name": "amount", "type": "uint256" } ] }
]"#;

fn addr(byte: u8) -> Address {
    Address::with_last_byte(byte)
}

fn hash(byte: u8) -> B256 {
    B256::with_last_byte(byte)
}

/// Block 1 fixture: a deployment creating `watched`, an internal call into
/// it from a transaction addressed elsewhere, and a direct call emitting two
/// events (one of them from another contract).
fn fixture(watched: Address) -> (Block, Vec<Transaction>) {
    let deploy = Transaction {
        hash: hash(0x11),
        block_number: 1,
        index: 0,
        from: addr(9),
        to: None,
        value: U256::from(666),
        created_contract: Some(watched),
        ..Default::default()
    };
    let internal = Transaction {
        hash: hash(0x12),
        block_number: 1,
        index: 1,
        from: addr(9),
        to: Some(addr(2)),
        value: U256::from(666),
        internal_calls: vec![InternalCall {
            call_type: "CALL".into(),
            to: Some(watched),
            ..Default::default()
        }],
        ..Default::default()
    };
    let direct = Transaction {
        hash: hash(0x13),
        block_number: 1,
        index: 2,
        from: addr(10),
        to: Some(watched),
        value: U256::from(666),
        events: vec![
            Event {
                address: addr(7), // emitted by a different contract
                log_index: 0,
                block_number: 1,
                tx_hash: hash(0x13),
                ..Default::default()
            },
            Event {
                address: watched,
                log_index: 1,
                block_number: 1,
                tx_hash: hash(0x13),
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let block = Block {
        number: 1,
        hash: hash(0xb1),
        transactions: vec![deploy.hash, internal.hash, direct.hash],
        ..Default::default()
    };
    (block, vec![deploy, internal, direct])
}

fn with_txs(block: &Block, txs: &[Transaction]) -> BlockWithTransactions {
    BlockWithTransactions::new(block, txs.to_vec())
}

#[tokio::test]
async fn full_lifecycle() {
    let db = MemoryDatabase::new();
    let watched = addr(1);
    let (block, txs) = fixture(watched);

    // Register and read back.
    db.add_addresses(vec![watched]).await.unwrap();
    assert_eq!(db.get_addresses().await.unwrap().len(), 1);

    // Template handling.
    db.add_template("simple storage", SIMPLE_ABI, "layout")
        .await
        .unwrap();
    db.assign_template(watched, "simple storage").await.unwrap();
    assert_eq!(db.get_templates().await.unwrap().len(), 1);
    assert_eq!(db.get_contract_abi(watched).await.unwrap(), SIMPLE_ABI);
    assert_eq!(db.get_storage_layout(watched).await.unwrap(), "layout");

    // Raw writes.
    db.write_transactions(txs.clone()).await.unwrap();
    let read = db.read_transaction(hash(0x11)).await.unwrap();
    assert_eq!(read.from, addr(9));
    assert_eq!(db.get_last_persisted_block_number().await.unwrap(), 0);
    db.write_blocks(vec![block.clone()]).await.unwrap();
    assert_eq!(db.read_block(1).await.unwrap().hash, block.hash);
    assert_eq!(db.get_last_persisted_block_number().await.unwrap(), 1);

    // Index and verify every sequence plus the watermark.
    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 0);
    let mut snapshots = HashMap::new();
    snapshots.insert(
        watched,
        AccountState {
            root: hash(0xaa),
            storage: [(hash(0), "2a".to_string()), (hash(1), "2b".to_string())]
                .into_iter()
                .collect(),
        },
    );
    db.index_storage(&snapshots, 1).await.unwrap();
    db.index_blocks(&[watched], &[with_txs(&block, &txs)])
        .await
        .unwrap();
    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 1);

    let opts = QueryOptions::default();
    let to = db.get_all_transactions_to_address(watched, &opts).await.unwrap();
    // Creation and direct call, newest (highest tx index) first.
    assert_eq!(to, vec![hash(0x13), hash(0x11)]);
    assert_eq!(
        db.get_transactions_to_address_total(watched, &opts).await.unwrap(),
        2
    );

    let internal = db
        .get_all_transactions_internal_to_address(watched, &opts)
        .await
        .unwrap();
    assert_eq!(internal, vec![hash(0x12)]);
    assert_eq!(
        db.get_transactions_internal_to_address_total(watched, &opts)
            .await
            .unwrap(),
        1
    );

    let events = db.get_all_events_from_address(watched, &opts).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].address, watched);

    // Storage lookup: exact block only; anything else is the empty snapshot.
    let state = db.get_storage(watched, 1).await.unwrap();
    assert_eq!(state.storage.len(), 2);
    let unknown = db.get_storage(watched, 2).await.unwrap();
    assert!(unknown.storage.is_empty());
    assert_eq!(unknown.root, B256::ZERO);

    // Delete cascades; raw data survives.
    db.delete_address(watched).await.unwrap();
    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 0);
    assert!(db
        .get_all_transactions_to_address(watched, &opts)
        .await
        .unwrap()
        .is_empty());
    assert!(db.read_block(1).await.is_ok());
    assert!(db.read_transaction(hash(0x11)).await.is_ok());
}

#[tokio::test]
async fn reindexing_is_idempotent() {
    let db = MemoryDatabase::new();
    let watched = addr(1);
    let (block, txs) = fixture(watched);
    db.add_addresses(vec![watched]).await.unwrap();
    db.write_transactions(txs.clone()).await.unwrap();
    db.write_blocks(vec![block.clone()]).await.unwrap();

    let bwt = with_txs(&block, &txs);
    db.index_blocks(&[watched], &[bwt.clone()]).await.unwrap();
    db.index_blocks(&[watched], &[bwt]).await.unwrap();

    let opts = QueryOptions::default();
    assert_eq!(
        db.get_transactions_to_address_total(watched, &opts).await.unwrap(),
        2
    );
    assert_eq!(
        db.get_events_from_address_total(watched, &opts).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn registration_is_idempotent_and_keeps_watermark() {
    let db = MemoryDatabase::new();
    let watched = addr(1);

    db.add_address_from(watched, 100).await.unwrap();
    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 99);

    // Re-registration must not reset the watermark.
    db.add_addresses(vec![watched]).await.unwrap();
    db.add_address_from(watched, 5).await.unwrap();
    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 99);
}

#[tokio::test]
async fn watermark_advances_on_untouching_blocks() {
    let db = MemoryDatabase::new();
    let watched = addr(1);
    db.add_addresses(vec![watched]).await.unwrap();

    let block = Block {
        number: 7,
        hash: hash(0xb7),
        ..Default::default()
    };
    db.write_blocks(vec![block.clone()]).await.unwrap();
    db.index_blocks(&[watched], &[with_txs(&block, &[])])
        .await
        .unwrap();

    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 7);
    assert_eq!(
        db.get_transactions_to_address_total(watched, &QueryOptions::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn creation_transactions_require_registration() {
    let db = MemoryDatabase::new();
    let registered = addr(0x21);
    let unregistered = addr(0x22);
    db.add_addresses(vec![registered]).await.unwrap();

    let mut creations = HashMap::new();
    creations.insert(hash(0x31), vec![registered, unregistered]);
    db.set_contract_creation_transaction(creations).await.unwrap();

    assert_eq!(
        db.get_contract_creation_transaction(registered).await.unwrap(),
        hash(0x31)
    );
    let err = db
        .get_contract_creation_transaction(unregistered)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "address is not registered");
}

#[tokio::test]
async fn deprecated_abi_ops_synthesize_address_template() {
    let db = MemoryDatabase::new();
    let watched = addr(1);
    db.add_addresses(vec![watched]).await.unwrap();

    let err = db.add_contract_abi(watched, "hello").await.unwrap_err();
    assert!(matches!(
        err,
        chainscope_core::StoreError::Validation(_)
    ));

    db.add_contract_abi(watched, SIMPLE_ABI).await.unwrap();
    db.add_storage_layout(watched, "layout").await.unwrap();

    assert_eq!(db.get_contract_abi(watched).await.unwrap(), SIMPLE_ABI);
    assert_eq!(db.get_storage_layout(watched).await.unwrap(), "layout");
    let name = db.get_contract_template(watched).await.unwrap();
    assert_eq!(name, format!("{watched:#x}"));
}

#[tokio::test]
async fn storage_ranges_count_every_snapshot() {
    let db = MemoryDatabase::new();
    let contract = addr(0x5f);
    db.add_address_from(contract, 0).await.unwrap();

    // The same root at every odd block 1, 3, ..., 4499: 2,250 snapshots,
    // every one of them counted regardless of root equality.
    let root: B256 = "0x73607aa4f228bd19dc95575d08adacede9550df70b9ca9253cb3abf7d8115990"
        .parse()
        .unwrap();
    for n in (1u64..4500).step_by(2) {
        let mut snapshots = HashMap::new();
        snapshots.insert(
            contract,
            AccountState {
                root,
                storage: Default::default(),
            },
        );
        db.index_storage(&snapshots, n).await.unwrap();
    }

    let cases: Vec<(u64, u64, Vec<(u64, u64, u64)>)> = vec![
        // begin == end with no snapshot there: a single zero-count range.
        (0, 0, vec![(0, 0, 0)]),
        (0, 800, vec![(0, 800, 400)]),
        (0, 1500, vec![(0, 1500, 750)]),
        (
            0,
            4499,
            vec![(2501, 4499, 1000), (501, 2500, 1000), (0, 500, 250)],
        ),
        (1300, 3500, vec![(1501, 3500, 1000), (1300, 1500, 100)]),
    ];
    for (begin, end, expected) in cases {
        let ranges = db
            .get_storage_ranges(
                contract,
                &PageOptions {
                    begin_block_number: Some(begin),
                    end_block_number: Some(end),
                },
            )
            .await
            .unwrap();
        let got: Vec<(u64, u64, u64)> = ranges
            .iter()
            .map(|r| (r.start, r.end, r.result_count))
            .collect();
        assert_eq!(got, expected, "window [{begin}, {end}]");
    }
}

#[tokio::test]
async fn repeated_roots_still_count() {
    let db = MemoryDatabase::new();
    let contract = addr(0x5f);
    db.add_address_from(contract, 0).await.unwrap();

    let same = AccountState {
        root: hash(0xcc),
        storage: Default::default(),
    };
    let changed = AccountState {
        root: hash(0xdd),
        storage: Default::default(),
    };
    for (n, state) in [(1, &same), (3, &same), (5, &changed)] {
        let mut snapshots = HashMap::new();
        snapshots.insert(contract, state.clone());
        db.index_storage(&snapshots, n).await.unwrap();
    }

    let ranges = db
        .get_storage_ranges(
            contract,
            &PageOptions {
                begin_block_number: Some(0),
                end_block_number: Some(5),
            },
        )
        .await
        .unwrap();
    assert_eq!(ranges.len(), 1);
    assert_eq!((ranges[0].start, ranges[0].end), (0, 5));
    assert_eq!(ranges[0].result_count, 3);
}

#[tokio::test]
async fn pagination_slices_descending_sequences() {
    let db = MemoryDatabase::new();
    let watched = addr(1);
    db.add_addresses(vec![watched]).await.unwrap();

    let mut blocks = Vec::new();
    let mut bwts = Vec::new();
    for n in 1..=25u64 {
        let tx = Transaction {
            hash: B256::from(U256::from(n)),
            block_number: n,
            index: 0,
            to: Some(watched),
            ..Default::default()
        };
        let block = Block {
            number: n,
            hash: B256::from(U256::from(0x1000 + n)),
            transactions: vec![tx.hash],
            ..Default::default()
        };
        db.write_transactions(vec![tx.clone()]).await.unwrap();
        bwts.push(with_txs(&block, &[tx]));
        blocks.push(block);
    }
    db.write_blocks(blocks).await.unwrap();
    db.index_blocks(&[watched], &bwts).await.unwrap();

    let page = db
        .get_all_transactions_to_address(
            watched,
            &QueryOptions {
                page_size: 10,
                page_number: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // Second page of a 25-long descending sequence: blocks 15..=6.
    assert_eq!(page.len(), 10);
    assert_eq!(page[0], B256::from(U256::from(15u64)));
    assert_eq!(page[9], B256::from(U256::from(6u64)));

    let windowed = db
        .get_transactions_to_address_total(
            watched,
            &QueryOptions {
                begin_block_number: Some(10),
                end_block_number: Some(20),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(windowed, 11);
}

#[tokio::test]
async fn rollback_drops_everything_above_ancestor() {
    let db = MemoryDatabase::new();
    let watched = addr(1);
    db.add_addresses(vec![watched]).await.unwrap();

    for n in 1..=10u64 {
        let tx = Transaction {
            hash: B256::from(U256::from(n)),
            block_number: n,
            index: 0,
            to: Some(watched),
            ..Default::default()
        };
        let block = Block {
            number: n,
            hash: B256::from(U256::from(0x1000 + n)),
            transactions: vec![tx.hash],
            ..Default::default()
        };
        db.write_transactions(vec![tx.clone()]).await.unwrap();
        db.write_blocks(vec![block.clone()]).await.unwrap();
        db.index_blocks(&[watched], &[with_txs(&block, &[tx])])
            .await
            .unwrap();
        let mut snapshots = HashMap::new();
        snapshots.insert(
            watched,
            AccountState {
                root: B256::from(U256::from(n)),
                storage: Default::default(),
            },
        );
        db.index_storage(&snapshots, n).await.unwrap();
    }
    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 10);

    db.rollback_to(8).await.unwrap();

    assert_eq!(db.get_last_persisted_block_number().await.unwrap(), 8);
    assert_eq!(db.get_last_filtered(watched).await.unwrap(), 8);
    assert!(db.read_block(9).await.is_err());
    assert!(db.read_transaction(B256::from(U256::from(9u64))).await.is_err());
    assert_eq!(
        db.get_transactions_to_address_total(watched, &QueryOptions::default())
            .await
            .unwrap(),
        8
    );
    let snapshot = db.get_storage(watched, 9).await.unwrap();
    assert_eq!(snapshot.root, B256::ZERO);
}
