mod common;

use common::*;
use safe_app::*;
use safe_core::{
    Amount, EngineKind, Hash256, Hashable, Height, IndexConfig, NodeConfig, ProtocolConfig,
    SafeError,
};
use safe_state::{IndexTag, MemoryEngine, SledEngine};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn app_names_are_unique_ignoring_case() {
    let store = store();
    let v = validator();
    connect(&store, 5, vec![register_app(1, "Acme", "Xadmin")]);

    for height in [5, 6, 100] {
        let reader = store.reader(Height(height));
        assert!(reader.exists_app_name("acme", false).unwrap());
        assert!(reader.exists_app_name("ACME", false).unwrap());
    }

    let second = register_app(2, "ACME", "Xother");
    let reader = store.reader(Height(6));
    assert!(matches!(
        v.validate(&second, &reader),
        Err(SafeError::DuplicateAppName(_))
    ));
}

#[test]
fn token_name_is_visible_from_its_height() {
    let store = store();
    let v = validator();
    let pool = PendingPool::default();

    let first = issue(1, "Xissuer", token("TKN", "Token"));
    assert!(v.admit(&store, &pool, Height(9), first.clone()).unwrap());
    let block = AppBlock::new(Height(10), vec![first]);
    store.connect_block(&block).unwrap();
    pool.remove_block(&block);

    assert!(!store.reader(Height(9)).exists_asset_name("token", false).unwrap());
    assert!(store.reader(Height(10)).exists_asset_name("token", false).unwrap());

    let again = issue(2, "Xother", token("TKN2", "TOKEN"));
    assert!(matches!(
        v.admit(&store, &pool, Height(10), again),
        Err(SafeError::DuplicateAssetName(_))
    ));

    let short_clash = issue(3, "Xother", token("tkn", "Other"));
    assert!(matches!(
        v.admit(&store, &pool, Height(10), short_clash),
        Err(SafeError::DuplicateShortName(_))
    ));
}

#[test]
fn in_flight_issues_block_each_other() {
    let store = store();
    let v = validator();
    let pool = PendingPool::default();

    assert!(v
        .admit(&store, &pool, Height(1), issue(1, "Xa", token("AAA", "Alpha")))
        .unwrap());
    let reader = store.reader(Height(1)).with_pending(&pool);
    assert!(reader.exists_asset_name("alpha", true).unwrap());
    assert!(!reader.exists_asset_name("alpha", false).unwrap());
    drop(reader);

    assert!(matches!(
        v.admit(&store, &pool, Height(1), issue(2, "Xb", token("BBB", "ALPHA"))),
        Err(SafeError::DuplicateAssetName(_))
    ));

    pool.remove(&out(1).txid);
    assert!(v
        .admit(&store, &pool, Height(1), issue(2, "Xb", token("BBB", "ALPHA")))
        .unwrap());
}

#[test]
fn disconnect_restores_exact_index_state() {
    let store = store();
    let asset = token("TKN", "Token");
    let asset_id = asset.id();
    connect(&store, 10, vec![register_app(1, "Acme", "Xadmin"), issue(2, "Xissuer", asset)]);
    connect(&store, 20, vec![put_candy(3, "Xissuer", asset_id, 100, 2)]);
    let before = store.snapshot().unwrap();

    let block = AppBlock::new(
        Height(600),
        vec![
            get_candy(4, "Xa", asset_id, out(3), 40),
            get_candy(5, "Xb", asset_id, out(3), 40),
            asset_tx(
                6,
                "Xissuer",
                AppCommand::AddIssue(TransferRecord {
                    asset_id,
                    amount: Amount(100),
                    remarks: String::new(),
                }),
            ),
            register_app(7, "Beta", "Xadmin"),
        ],
    );
    let mutations = store.connect_block(&block).unwrap();
    assert!(!mutations.is_empty());
    assert!(!store.snapshot().unwrap().diff(&before).is_empty());

    store.disconnect_block(&block).unwrap();
    let after = store.snapshot().unwrap();
    assert!(after.diff(&before).is_empty());
    assert_eq!(after.root, before.root);
    assert_eq!(store.tip(), Some(Height(20)));
}

#[test]
fn failed_commit_leaves_no_partial_state() {
    let engine = Arc::new(MemoryEngine::new());
    let store = AppIndexStore::new(engine.clone(), ProtocolConfig::default()).unwrap();
    connect(&store, 1, vec![register_app(1, "Acme", "Xadmin")]);
    let before = store.snapshot().unwrap();

    engine.set_read_only(true);
    let block = AppBlock::new(
        Height(2),
        vec![register_app(2, "Beta", "Xadmin"), issue(3, "Xissuer", token("TKN", "Token"))],
    );
    let err = store.connect_block(&block).unwrap_err();
    assert!(matches!(err, SafeError::Storage(_)));
    assert!(!err.is_recoverable());

    assert_eq!(store.tip(), Some(Height(1)));
    assert!(store.snapshot().unwrap().diff(&before).is_empty());

    engine.set_read_only(false);
    store.connect_block(&block).unwrap();
    assert_eq!(store.count(IndexTag::AppInfo).unwrap(), 2);
}

#[test]
fn supply_and_destroy_rules() {
    let store = store();
    let v = validator();
    let pool = PendingPool::default();
    let asset = token("TKN", "Token");
    let asset_id = asset.id();
    connect(&store, 10, vec![issue(1, "Xissuer", asset)]);

    let add = |n: u32, sender: &str, amount: u64| {
        asset_tx(
            n,
            sender,
            AppCommand::AddIssue(TransferRecord {
                asset_id,
                amount: Amount(amount),
                remarks: String::new(),
            }),
        )
    };

    assert!(matches!(
        v.admit(&store, &pool, Height(11), add(2, "Xstranger", 10)),
        Err(SafeError::NotAssetIssuer(_))
    ));
    assert!(v.admit(&store, &pool, Height(11), add(3, "Xissuer", 300)).unwrap());
    // 500 issued plus 300 pending leaves room for 200
    assert!(matches!(
        v.admit(&store, &pool, Height(11), add(4, "Xissuer", 201)),
        Err(SafeError::ExceedsTotalAmount {
            requested: 201,
            issued: 800,
            total: 1000
        })
    ));
    assert!(v.admit(&store, &pool, Height(11), add(5, "Xissuer", 200)).unwrap());

    let block = AppBlock::new(Height(11), pool.outputs());
    store.connect_block(&block).unwrap();
    pool.remove_block(&block);
    assert!(pool.is_empty());

    let reader = store.reader(Height(11));
    assert_eq!(reader.issued_supply(&asset_id).unwrap(), Amount(1000));
    assert_eq!(
        reader
            .asset_txs(&asset_id, None, AssetTxFilter::Only(AssetTxClass::AddIssue))
            .unwrap()
            .len(),
        2
    );
    assert_eq!(store.reader(Height(10)).issued_supply(&asset_id).unwrap(), Amount(500));
    drop(reader);

    let destroy = asset_tx(
        6,
        "Xissuer",
        AppCommand::DestroyAsset(TransferRecord {
            asset_id,
            amount: Amount(1),
            remarks: String::new(),
        }),
    );
    assert!(matches!(
        v.admit(&store, &pool, Height(12), destroy),
        Err(SafeError::DestroyDisabled(_))
    ));
}

#[test]
fn transfers_are_listed_by_address_and_class() {
    let store = store();
    let asset = token("TKN", "Token");
    let asset_id = asset.id();
    let transfer = |n: u32, to: &str, amount: u64| {
        asset_tx(
            n,
            to,
            AppCommand::TransferAsset(TransferRecord {
                asset_id,
                amount: Amount(amount),
                remarks: String::new(),
            }),
        )
    };
    connect(&store, 10, vec![issue(1, "Xissuer", asset)]);
    connect(
        &store,
        11,
        vec![transfer(2, "Xa", 10), transfer(3, "Xa", 5).with_lock(), transfer(4, "Xb", 7)],
    );

    let reader = store.reader(Height(11));
    let xa = addr("Xa");
    assert_eq!(reader.asset_txs(&asset_id, Some(&xa), AssetTxFilter::All).unwrap().len(), 2);
    assert_eq!(
        reader
            .asset_txs(&asset_id, Some(&xa), AssetTxFilter::Unlocked)
            .unwrap()
            .len(),
        1
    );
    assert_eq!(reader.asset_txs(&asset_id, None, AssetTxFilter::All).unwrap().len(), 4);
    assert!(reader.assets_by_address(&xa).unwrap().contains(&asset_id));
    assert!(store
        .reader(Height(10))
        .assets_by_address(&xa)
        .unwrap()
        .is_empty());
}

#[test]
fn virtual_accounts() {
    let store = store();
    let v = validator();
    let pool = PendingPool::default();
    let account = |n: u32, name: &str, address: &str| {
        let profile = VirtualAccountProfile {
            safe_address: addr(address),
            name: name.into(),
            owner: addr("Xowner"),
            active: addr("Xactive"),
        };
        let message = AppMessage::new(1, profile.id(), AppCommand::RegisterAccount(profile));
        AppTxOut::new(out(n), addr(address), addr(address), message)
    };

    assert!(v.admit(&store, &pool, Height(1), account(1, "alice", "Xalice")).unwrap());
    assert!(matches!(
        v.admit(&store, &pool, Height(1), account(2, "ALICE", "Xother")),
        Err(SafeError::DuplicateAccountName(_))
    ));
    assert!(matches!(
        v.admit(&store, &pool, Height(1), account(3, "bob", "Xalice")),
        Err(SafeError::DuplicateAccountAddress(_))
    ));

    let block = AppBlock::new(Height(2), pool.outputs());
    store.connect_block(&block).unwrap();
    pool.remove_block(&block);

    let reader = store.reader(Height(2));
    assert!(reader.exists_virtual_account_name("Alice", false).unwrap());
    let found = reader.virtual_account_by_address(&addr("Xalice")).unwrap().unwrap();
    assert_eq!(found.profile.name, "alice");
    assert_eq!(reader.list_virtual_accounts().unwrap().len(), 1);
    assert!(store
        .reader(Height(1))
        .virtual_account_by_address(&addr("Xalice"))
        .unwrap()
        .is_none());
}

#[test]
fn sled_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let config = NodeConfig {
        data_dir: tmp.path().to_path_buf(),
        index: IndexConfig {
            engine: EngineKind::Sled,
            ..IndexConfig::default()
        },
        ..NodeConfig::default()
    };
    let asset = token("TKN", "Token");
    let asset_id = asset.id();

    {
        let store = AppIndexStore::open(&config).unwrap();
        connect(&store, 10, vec![issue(1, "Xissuer", asset)]);
        store.flush().unwrap();
    }

    let store = AppIndexStore::open(&config).unwrap();
    assert_eq!(store.tip(), Some(Height(10)));
    let reader = store.tip_reader();
    assert_eq!(reader.asset_id_by_short_name("tkn").unwrap(), Some(asset_id));
    assert_eq!(reader.issued_supply(&asset_id).unwrap(), Amount(500));
}

#[test]
fn sled_and_memory_engines_agree() {
    let tmp = TempDir::new().unwrap();
    let sled = SledEngine::open(tmp.path(), &IndexConfig::default()).unwrap();
    let on_disk = AppIndexStore::new(Arc::new(sled), ProtocolConfig::default()).unwrap();
    let in_memory = store();

    for store in [&on_disk, &in_memory] {
        connect(store, 3, vec![register_app(1, "Acme", "Xadmin")]);
        connect(store, 4, vec![issue(2, "Xissuer", token("TKN", "Token"))]);
    }
    assert_eq!(on_disk.snapshot().unwrap().root, in_memory.snapshot().unwrap().root);
    assert_ne!(on_disk.snapshot().unwrap().root, Hash256::ZERO);
}
