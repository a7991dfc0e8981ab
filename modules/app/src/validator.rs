//! Admission checks for application commands
//!
//! Structural checks need nothing but the command. Index checks run against
//! a height-gated reader, which also consults the in-flight pool when one is
//! attached.

use safe_core::{
    Address, Amount, Hash256, Hashable, Height, OutPoint, ProtocolConfig, SafeError, SafeResult,
};
use tracing::debug;

use crate::codec::AppCommand;
use crate::entity::{safe_asset_app_id, safe_pay_app_id, AuthSetType};
use crate::index::AppIndexStore;
use crate::indexer::AppTxOut;
use crate::mempool::{Headroom, PendingPool};
use crate::query::IndexReader;
use crate::records::{AssetInfoRecord, AuthAction};

/// Validates commands before they enter the pending pool
#[derive(Debug, Clone)]
pub struct CommandValidator {
    protocol: ProtocolConfig,
}

impl CommandValidator {
    pub fn new(protocol: ProtocolConfig) -> Self {
        Self { protocol }
    }

    /// Checks that need no index access
    pub fn check_structure(&self, tx: &AppTxOut) -> SafeResult<()> {
        let header = &tx.message.header;
        if header.version != self.protocol.header_version {
            return Err(SafeError::InvalidField {
                field: "header version",
                reason: format!("{} != {}", header.version, self.protocol.header_version),
            });
        }
        if header.code != tx.command().code() {
            return Err(SafeError::MalformedPayload(format!(
                "header code {} does not match payload",
                header.code.as_u32()
            )));
        }
        self.check_header_app_id(tx)?;

        match tx.command() {
            AppCommand::RegisterApp { profile, .. } => profile.validate(),
            AppCommand::GrantAuth { admin, grant } | AppCommand::RevokeAuth { admin, grant } => {
                grant.validate()?;
                let expected = match tx.command() {
                    AppCommand::GrantAuth { .. } => AuthSetType::Grant,
                    _ => AuthSetType::Revoke,
                };
                if grant.set_type != expected {
                    return Err(SafeError::InvalidField {
                        field: "auth set type",
                        reason: format!("{:?} in {:?} command", grant.set_type, header.code),
                    });
                }
                if grant.address == *admin {
                    return Err(SafeError::InvalidField {
                        field: "grantee address",
                        reason: "administrator cannot grant to itself".into(),
                    });
                }
                Ok(())
            }
            AppCommand::Extend(p) => p.validate(),
            AppCommand::IssueAsset(p) => p.validate(),
            AppCommand::AddIssue(r)
            | AppCommand::TransferAsset(r)
            | AppCommand::DestroyAsset(r)
            | AppCommand::ChangeAsset(r) => r.validate(),
            AppCommand::PutCandy(p) => p.validate(),
            AppCommand::GetCandy(p) => {
                p.validate()?;
                if tx.candy_source.is_none() {
                    return Err(SafeError::MalformedPayload(
                        "get-candy spends no candy output".into(),
                    ));
                }
                Ok(())
            }
            AppCommand::TransferSafe(p) => p.validate(),
            AppCommand::RegisterAccount(p) => p.validate(),
        }
    }

    fn check_header_app_id(&self, tx: &AppTxOut) -> SafeResult<()> {
        let app_id = tx.message.header.app_id;
        let ok = match tx.command() {
            AppCommand::RegisterApp { profile, .. } => app_id.is_zero() || app_id == profile.id(),
            AppCommand::RegisterAccount(profile) => app_id.is_zero() || app_id == profile.id(),
            AppCommand::GrantAuth { .. }
            | AppCommand::RevokeAuth { .. }
            | AppCommand::Extend(_) => !app_id.is_zero(),
            AppCommand::TransferSafe(_) => app_id == safe_pay_app_id(),
            _ => app_id == safe_asset_app_id(),
        };
        if ok {
            Ok(())
        } else {
            Err(SafeError::InvalidField {
                field: "header app id",
                reason: format!("{} not valid for {:?}", app_id, tx.message.header.code),
            })
        }
    }

    /// Checks against the index as seen by `reader`
    pub fn check_against_index(&self, tx: &AppTxOut, reader: &IndexReader<'_>) -> SafeResult<()> {
        let app_id = tx.message.header.app_id;
        match tx.command() {
            AppCommand::RegisterApp { admin, profile } => {
                if *admin != tx.sender {
                    return Err(SafeError::NotAppAdmin(tx.sender.to_string()));
                }
                if reader.exists_app_name(&profile.name, true)? {
                    return Err(SafeError::DuplicateAppName(profile.name.clone()));
                }
                let id = profile.id();
                if reader.exists_app_id(&id, true)? {
                    return Err(SafeError::DuplicateAppId(id.to_hex()));
                }
                Ok(())
            }
            AppCommand::GrantAuth { admin, grant } | AppCommand::RevokeAuth { admin, grant } => {
                let info = reader
                    .app_info(&app_id)?
                    .ok_or_else(|| SafeError::NonexistentAppId(app_id.to_hex()))?;
                if info.admin != *admin || info.admin != tx.sender {
                    return Err(SafeError::NotAppAdmin(tx.sender.to_string()));
                }
                let pending_change = reader
                    .pending()
                    .is_some_and(|p| p.has_auth_change(&app_id, &grant.address, grant.auth));
                let state = reader.auth_state(&app_id, &grant.address, grant.auth)?;
                match grant.set_type {
                    AuthSetType::Grant if pending_change || state == Some(AuthAction::Grant) => {
                        Err(SafeError::AuthAlreadyGranted {
                            address: grant.address.to_string(),
                            auth: grant.auth,
                        })
                    }
                    AuthSetType::Revoke if pending_change || state != Some(AuthAction::Grant) => {
                        Err(SafeError::NonexistentAuth {
                            address: grant.address.to_string(),
                            auth: grant.auth,
                        })
                    }
                    _ => Ok(()),
                }
            }
            AppCommand::Extend(p) => {
                if reader.app_info(&app_id)?.is_none() {
                    return Err(SafeError::NonexistentAppId(app_id.to_hex()));
                }
                if !reader.has_auth(&app_id, &tx.sender, p.required_auth)? {
                    return Err(SafeError::InsufficientAuth {
                        address: tx.sender.to_string(),
                        required: p.required_auth,
                    });
                }
                Ok(())
            }
            AppCommand::IssueAsset(profile) => {
                if reader.exists_short_name(&profile.short_name, true)? {
                    return Err(SafeError::DuplicateShortName(profile.short_name.clone()));
                }
                if reader.exists_asset_name(&profile.name, true)? {
                    return Err(SafeError::DuplicateAssetName(profile.name.clone()));
                }
                let id = profile.id();
                if reader.exists_asset_id(&id, true)? {
                    return Err(SafeError::DuplicateAssetId(id.to_hex()));
                }
                Ok(())
            }
            AppCommand::AddIssue(r) => {
                let info = existing_asset(reader, &r.asset_id)?;
                check_issuer(&info, &tx.sender)?;
                let pending = reader
                    .pending()
                    .map(|p| p.pending_issue(&r.asset_id))
                    .unwrap_or_default();
                let issued = reader.issued_supply(&r.asset_id)?.saturating_add(pending);
                let total = info.profile.total_amount;
                if issued.checked_add(r.amount).map_or(true, |after| after > total) {
                    return Err(SafeError::ExceedsTotalAmount {
                        requested: r.amount.0,
                        issued: issued.0,
                        total: total.0,
                    });
                }
                Ok(())
            }
            AppCommand::TransferAsset(r) | AppCommand::ChangeAsset(r) => {
                existing_asset(reader, &r.asset_id).map(|_| ())
            }
            AppCommand::DestroyAsset(r) => {
                let info = existing_asset(reader, &r.asset_id)?;
                if !info.profile.destroyable {
                    return Err(SafeError::DestroyDisabled(r.asset_id.to_hex()));
                }
                Ok(())
            }
            AppCommand::PutCandy(offer) => {
                let info = existing_asset(reader, &offer.asset_id)?;
                check_issuer(&info, &tx.sender)?;
                let pending = reader
                    .pending()
                    .map(|p| p.pending_offers(&offer.asset_id))
                    .unwrap_or(0);
                let live = reader.live_candy_offers(&offer.asset_id)? + pending;
                if live >= self.protocol.max_live_candy_offers {
                    return Err(SafeError::CandyOfferLimitReached {
                        asset: offer.asset_id.to_hex(),
                        live,
                    });
                }
                Ok(())
            }
            AppCommand::GetCandy(claim) => {
                let source = tx.candy_source.ok_or_else(|| {
                    SafeError::MalformedPayload("get-candy spends no candy output".into())
                })?;
                self.check_claim(reader, &claim.asset_id, source, &tx.address, claim.amount)
            }
            AppCommand::TransferSafe(_) => Ok(()),
            AppCommand::RegisterAccount(profile) => {
                if reader.exists_virtual_account_name(&profile.name, true)? {
                    return Err(SafeError::DuplicateAccountName(profile.name.clone()));
                }
                if reader.exists_virtual_account_address(&profile.safe_address, true)? {
                    return Err(SafeError::DuplicateAccountAddress(
                        profile.safe_address.to_string(),
                    ));
                }
                if reader.virtual_account_info(&profile.id())?.is_some() {
                    return Err(SafeError::DuplicateAccountName(profile.name.clone()));
                }
                Ok(())
            }
        }
    }

    fn check_claim(
        &self,
        reader: &IndexReader<'_>,
        asset_id: &Hash256,
        source: OutPoint,
        claimant: &Address,
        amount: Amount,
    ) -> SafeResult<()> {
        let offer = reader
            .candy_offer(asset_id, &source)?
            .ok_or_else(|| SafeError::NonexistentCandyOffer(source.to_string()))?;
        let height = reader.height();
        if offer.is_expired(height, self.protocol.blocks_per_month) {
            return Err(SafeError::CandyExpired(source.to_string()));
        }
        if !offer.is_claimable(height, self.protocol.candy_claim_delay_blocks) {
            return Err(SafeError::CandyNotClaimable(source.to_string()));
        }

        let pool = reader.pending();
        if reader.candy_claim(asset_id, &source, claimant)?.is_some()
            || pool.is_some_and(|p| p.has_claimant(asset_id, &source, claimant))
        {
            return Err(SafeError::CandyAlreadyClaimed {
                address: claimant.to_string(),
                offer: source.to_string(),
            });
        }

        let pending = pool
            .map(|p| p.pending_claim_total(asset_id, &source))
            .unwrap_or_default();
        let claimed = reader.claimed_total(asset_id, &source)?.saturating_add(pending);
        let remaining = offer.amount.saturating_sub(claimed);
        if amount > remaining {
            return Err(SafeError::CandyBudgetExceeded {
                requested: amount.0,
                remaining: remaining.0,
            });
        }
        Ok(())
    }

    /// Confirmed limits the pool re-checks pending totals against
    pub fn headroom(&self, tx: &AppTxOut, reader: &IndexReader<'_>) -> SafeResult<Headroom> {
        match tx.command() {
            AppCommand::AddIssue(r) => {
                let info = existing_asset(reader, &r.asset_id)?;
                Ok(Headroom::Supply {
                    issued: reader.issued_supply(&r.asset_id)?,
                    total: info.profile.total_amount,
                })
            }
            AppCommand::PutCandy(offer) => Ok(Headroom::Offers {
                live: reader.live_candy_offers(&offer.asset_id)?,
                max: self.protocol.max_live_candy_offers,
            }),
            AppCommand::GetCandy(claim) => {
                let Some(source) = tx.candy_source else {
                    return Ok(Headroom::Unbounded);
                };
                let offer = reader
                    .candy_offer(&claim.asset_id, &source)?
                    .ok_or_else(|| SafeError::NonexistentCandyOffer(source.to_string()))?;
                Ok(Headroom::Claim {
                    offered: offer.amount,
                    claimed: reader.claimed_total(&claim.asset_id, &source)?,
                })
            }
            _ => Ok(Headroom::Unbounded),
        }
    }

    pub fn validate(&self, tx: &AppTxOut, reader: &IndexReader<'_>) -> SafeResult<()> {
        self.check_structure(tx)?;
        self.check_against_index(tx, reader)
    }

    /// Validate at `height` and add to the pool. `Ok(false)` means the pool is full.
    pub fn admit(
        &self,
        store: &AppIndexStore,
        pool: &PendingPool,
        height: Height,
        tx: AppTxOut,
    ) -> SafeResult<bool> {
        self.check_structure(&tx)?;
        // Held until the insert so no block connects in between
        let reader = store.pending_reader(height, pool);
        self.check_against_index(&tx, &reader)?;
        let headroom = self.headroom(&tx, &reader)?;

        let txid = tx.txid();
        let code = tx.message.header.code;
        let added = pool.add(tx, headroom)?;
        drop(reader);
        if added {
            debug!(txid = %txid, code = code.as_u32(), "Admitted application command");
        }
        Ok(added)
    }
}

fn existing_asset(reader: &IndexReader<'_>, asset_id: &Hash256) -> SafeResult<AssetInfoRecord> {
    reader
        .asset_info(asset_id)?
        .ok_or_else(|| SafeError::NonexistentAssetId(asset_id.to_hex()))
}

fn check_issuer(info: &AssetInfoRecord, sender: &Address) -> SafeResult<()> {
    if info.issuer != *sender {
        return Err(SafeError::NotAssetIssuer(sender.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AppMessage;
    use crate::entity::*;
    use crate::indexer::AppBlock;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn out(n: u8) -> OutPoint {
        OutPoint::new(Hash256([n; 32]), 0)
    }

    fn profile(name: &str) -> AppProfile {
        AppProfile {
            name: name.into(),
            description: "validator test".into(),
            developer_type: DeveloperType::Personal,
            developer_name: "dev".into(),
            web_url: String::new(),
            logo_url: String::new(),
            cover_url: String::new(),
        }
    }

    fn register(n: u8, name: &str, admin: &str) -> AppTxOut {
        let profile = profile(name);
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

    fn grant(
        n: u8,
        app_id: Hash256,
        sender: &str,
        grantee: &str,
        set_type: AuthSetType,
    ) -> AppTxOut {
        let payload = AuthGrant {
            set_type,
            address: addr(grantee),
            auth: 1000,
        };
        let command = match set_type {
            AuthSetType::Grant => AppCommand::GrantAuth {
                admin: addr(sender),
                grant: payload,
            },
            AuthSetType::Revoke => AppCommand::RevokeAuth {
                admin: addr(sender),
                grant: payload,
            },
        };
        AppTxOut::new(out(n), addr(sender), addr(sender), AppMessage::new(1, app_id, command))
    }

    fn store() -> AppIndexStore {
        AppIndexStore::in_memory(ProtocolConfig::default())
    }

    #[test]
    fn test_structure_checks() {
        let v = CommandValidator::new(ProtocolConfig::default());
        assert!(v.check_structure(&register(1, "Acme", "Xadmin")).is_ok());

        let mut bad_version = register(1, "Acme", "Xadmin");
        bad_version.message.header.version = 2;
        assert!(matches!(
            v.check_structure(&bad_version),
            Err(SafeError::InvalidField { field: "header version", .. })
        ));

        let mut reserved = register(1, "SafePay", "Xadmin");
        reserved.message.header.app_id = Hash256::ZERO;
        assert!(matches!(v.check_structure(&reserved), Err(SafeError::ReservedName(_))));

        let app_id = profile("Acme").id();
        let mismatched = {
            let mut tx = grant(2, app_id, "Xadmin", "Xuser", AuthSetType::Grant);
            if let AppCommand::GrantAuth { grant, .. } = &mut tx.message.command {
                grant.set_type = AuthSetType::Revoke;
            }
            tx
        };
        assert!(v.check_structure(&mismatched).is_err());
        assert!(v
            .check_structure(&grant(3, app_id, "Xadmin", "Xadmin", AuthSetType::Grant))
            .is_err());
    }

    #[test]
    fn test_asset_command_needs_asset_app_id() {
        let v = CommandValidator::new(ProtocolConfig::default());
        let message = AppMessage::new(
            1,
            Hash256::ZERO,
            AppCommand::TransferAsset(TransferRecord {
                asset_id: Hash256([1; 32]),
                amount: Amount(5),
                remarks: String::new(),
            }),
        );
        let tx = AppTxOut::new(out(1), addr("Xa"), addr("Xa"), message);
        assert!(matches!(
            v.check_structure(&tx),
            Err(SafeError::InvalidField { field: "header app id", .. })
        ));
    }

    #[test]
    fn test_admit_rejects_pending_duplicate() {
        let v = CommandValidator::new(ProtocolConfig::default());
        let store = store();
        let pool = PendingPool::default();
        assert!(v.admit(&store, &pool, Height(1), register(1, "Acme", "Xadmin")).unwrap());
        assert!(matches!(
            v.admit(&store, &pool, Height(1), register(2, "ACME", "Xother")),
            Err(SafeError::DuplicateAppName(_))
        ));
    }

    #[test]
    fn test_grant_and_revoke_lifecycle() {
        let v = CommandValidator::new(ProtocolConfig::default());
        let store = store();
        let app_id = profile("Acme").id();
        store
            .connect_block(&AppBlock::new(Height(10), vec![register(1, "Acme", "Xadmin")]))
            .unwrap();

        let revoke_first = grant(2, app_id, "Xadmin", "Xuser", AuthSetType::Revoke);
        assert!(matches!(
            v.validate(&revoke_first, &store.reader(Height(10))),
            Err(SafeError::NonexistentAuth { .. })
        ));

        let by_stranger = grant(3, app_id, "Xstranger", "Xuser", AuthSetType::Grant);
        assert!(matches!(
            v.validate(&by_stranger, &store.reader(Height(10))),
            Err(SafeError::NotAppAdmin(_))
        ));

        let first = grant(4, app_id, "Xadmin", "Xuser", AuthSetType::Grant);
        v.validate(&first, &store.reader(Height(10))).unwrap();
        store
            .connect_block(&AppBlock::new(Height(11), vec![first]))
            .unwrap();

        let again = grant(5, app_id, "Xadmin", "Xuser", AuthSetType::Grant);
        assert!(matches!(
            v.validate(&again, &store.reader(Height(11))),
            Err(SafeError::AuthAlreadyGranted { .. })
        ));

        let unknown_app = grant(6, Hash256([7; 32]), "Xadmin", "Xuser", AuthSetType::Grant);
        assert!(matches!(
            v.validate(&unknown_app, &store.reader(Height(11))),
            Err(SafeError::NonexistentAppId(_))
        ));
    }
}
