#![allow(dead_code)]

use safe_app::*;
use safe_core::{Address, Amount, Hash256, Hashable, Height, OutPoint, ProtocolConfig};

pub fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

pub fn out(n: u32) -> OutPoint {
    let mut txid = [0u8; 32];
    txid[..4].copy_from_slice(&n.to_be_bytes());
    OutPoint::new(Hash256(txid), 0)
}

pub fn store() -> AppIndexStore {
    AppIndexStore::in_memory(ProtocolConfig::default())
}

pub fn validator() -> CommandValidator {
    CommandValidator::new(ProtocolConfig::default())
}

pub fn app_profile(name: &str) -> AppProfile {
    AppProfile {
        name: name.into(),
        description: "scenario app".into(),
        developer_type: DeveloperType::Company,
        developer_name: "Scenario Labs".into(),
        web_url: "https://example.org".into(),
        logo_url: "https://example.org/logo.png".into(),
        cover_url: "https://example.org/cover.png".into(),
    }
}

pub fn register_app(n: u32, name: &str, admin: &str) -> AppTxOut {
    let profile = app_profile(name);
    let message = AppMessage::new(
        1,
        profile.id(),
        AppCommand::RegisterApp {
            admin: addr(admin),
            profile,
        },
    );
    AppTxOut::new(out(n), addr(admin), addr(admin), message)
}

pub fn token(short_name: &str, name: &str) -> AssetProfile {
    AssetProfile {
        short_name: short_name.into(),
        name: name.into(),
        description: "scenario token".into(),
        unit: "tk".into(),
        total_amount: Amount(1000),
        first_issue_amount: Amount(500),
        first_actual_amount: Amount(500),
        decimals: 4,
        destroyable: false,
        pays_candy: false,
        candy_amount: Amount::ZERO,
        candy_expired_months: 0,
        remarks: String::new(),
    }
}

pub fn asset_tx(n: u32, sender: &str, command: AppCommand) -> AppTxOut {
    AppTxOut::new(out(n), addr(sender), addr(sender), AppMessage::asset(1, command))
}

pub fn issue(n: u32, issuer: &str, profile: AssetProfile) -> AppTxOut {
    asset_tx(n, issuer, AppCommand::IssueAsset(profile))
}

pub fn put_candy(n: u32, issuer: &str, asset_id: Hash256, amount: u64, months: u16) -> AppTxOut {
    asset_tx(
        n,
        issuer,
        AppCommand::PutCandy(CandyOffer {
            asset_id,
            amount: Amount(amount),
            expired_months: months,
            remarks: String::new(),
        }),
    )
}

pub fn get_candy(
    n: u32,
    claimant: &str,
    asset_id: Hash256,
    source: OutPoint,
    amount: u64,
) -> AppTxOut {
    asset_tx(
        n,
        claimant,
        AppCommand::GetCandy(CandyClaim {
            asset_id,
            amount: Amount(amount),
            remarks: String::new(),
        }),
    )
    .claiming(source)
}

pub fn connect(store: &AppIndexStore, height: u32, outputs: Vec<AppTxOut>) -> BlockMutations {
    store
        .connect_block(&AppBlock::new(Height(height), outputs))
        .unwrap()
}
