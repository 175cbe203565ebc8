use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_core::{AccountId, BranchId};
use branchpos_events::EventEnvelope;
use branchpos_products::{ProductEvent, ProductId};

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BranchLevel {
    pub on_hand: u64,
    pub reserved: u64,
    pub available: u64,
}

/// Current stock of one product across branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevelReadModel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub branches: BTreeMap<BranchId, BranchLevel>,
    pub total_on_hand: u64,
    pub total_reserved: u64,
}

impl StockLevelReadModel {
    fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            sku: String::new(),
            name: String::new(),
            branches: BTreeMap::new(),
            total_on_hand: 0,
            total_reserved: 0,
        }
    }

    pub fn at(&self, branch_id: BranchId) -> BranchLevel {
        self.branches.get(&branch_id).copied().unwrap_or_default()
    }

    fn set_level(&mut self, branch_id: BranchId, on_hand: u64, reserved: u64) {
        if on_hand == 0 && reserved == 0 {
            self.branches.remove(&branch_id);
        } else {
            self.branches.insert(
                branch_id,
                BranchLevel {
                    on_hand,
                    reserved,
                    available: on_hand.saturating_sub(reserved),
                },
            );
        }
        self.total_on_hand = self.branches.values().map(|l| l.on_hand).sum();
        self.total_reserved = self.branches.values().map(|l| l.reserved).sum();
    }
}

/// Stock level projection fed by `products.product` events.
///
/// Uses the resulting levels carried by `StockMoved`, so the ledger
/// arithmetic is never duplicated here.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: TenantStore<ProductId, StockLevelReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> StockLevelsProjection<S>
where
    S: TenantStore<ProductId, StockLevelReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, product_id: &ProductId) -> Option<StockLevelReadModel> {
        self.store.get(account_id, product_id)
    }

    pub fn list(&self, account_id: AccountId) -> Vec<StockLevelReadModel> {
        let mut levels = self.store.list(account_id);
        levels.sort_by(|a, b| a.sku.cmp(&b.sku));
        levels
    }

    /// Products with stock (on hand or reserved) at one branch.
    pub fn list_for_branch(&self, account_id: AccountId, branch_id: BranchId) -> Vec<(StockLevelReadModel, BranchLevel)> {
        self.list(account_id)
            .into_iter()
            .filter_map(|rm| rm.branches.get(&branch_id).copied().map(|level| (rm, level)))
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let account_id = envelope.account_id();
        let event: ProductEvent = decode(envelope)?;

        match event {
            ProductEvent::Created(e) => {
                ensure_account(envelope, e.account_id)?;
                let mut rm = StockLevelReadModel::new(e.product_id);
                rm.sku = e.sku;
                rm.name = e.name;
                self.store.upsert(account_id, e.product_id, rm);
            }
            ProductEvent::DetailsUpdated(e) => {
                ensure_account(envelope, e.account_id)?;
                let mut rm = self.get_or_new(account_id, e.product_id);
                rm.sku = e.sku;
                rm.name = e.name;
                self.store.upsert(account_id, e.product_id, rm);
            }
            ProductEvent::StockMoved(e) => {
                ensure_account(envelope, e.account_id)?;
                let mut rm = self.get_or_new(account_id, e.product_id);
                rm.set_level(e.movement.branch_id(), e.on_hand_after, e.reserved_after);
                self.store.upsert(account_id, e.product_id, rm);
            }
            ProductEvent::PricingUpdated(_) | ProductEvent::Archived(_) => {}
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn clear(&self, accounts: &[AccountId]) {
        self.cursors.clear();
        for account_id in accounts {
            self.store.clear_account(*account_id);
        }
    }

    fn get_or_new(&self, account_id: AccountId, product_id: ProductId) -> StockLevelReadModel {
        self.store
            .get(account_id, &product_id)
            .unwrap_or_else(|| StockLevelReadModel::new(product_id))
    }
}
