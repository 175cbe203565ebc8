use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_core::AccountId;
use branchpos_events::EventEnvelope;
use branchpos_products::{ProductEvent, ProductId, ProductStatus};

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

/// Catalog entry (no stock; see the stock level projection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub price: u64,
    pub cost_price: u64,
    pub status: ProductStatus,
}

#[derive(Debug)]
pub struct ProductCatalogProjection<S>
where
    S: TenantStore<ProductId, ProductReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> ProductCatalogProjection<S>
where
    S: TenantStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(account_id, product_id)
    }

    pub fn list(&self, account_id: AccountId) -> Vec<ProductReadModel> {
        let mut products = self.store.list(account_id);
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.sku.cmp(&b.sku)));
        products
    }

    /// SKU lookup, case-insensitive. Used to keep SKUs unique per account.
    pub fn find_by_sku(&self, account_id: AccountId, sku: &str) -> Option<ProductReadModel> {
        let sku = sku.trim();
        self.store
            .list(account_id)
            .into_iter()
            .find(|p| p.sku.eq_ignore_ascii_case(sku))
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
                self.store.upsert(
                    account_id,
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        sku: e.sku,
                        name: e.name,
                        category: e.category,
                        price: e.pricing.price,
                        cost_price: e.pricing.cost_price,
                        status: ProductStatus::Active,
                    },
                );
            }
            ProductEvent::DetailsUpdated(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.product_id) {
                    rm.sku = e.sku;
                    rm.name = e.name;
                    rm.category = e.category;
                    self.store.upsert(account_id, e.product_id, rm);
                }
            }
            ProductEvent::PricingUpdated(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.product_id) {
                    rm.price = e.pricing.price;
                    rm.cost_price = e.pricing.cost_price;
                    self.store.upsert(account_id, e.product_id, rm);
                }
            }
            ProductEvent::Archived(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.product_id) {
                    rm.status = ProductStatus::Archived;
                    self.store.upsert(account_id, e.product_id, rm);
                }
            }
            ProductEvent::StockMoved(_) => {}
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
}
