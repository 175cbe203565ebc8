//! All read models of the system behind one routing entry point.

use std::collections::BTreeSet;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use branchpos_core::{AccountId, BranchId, UserId};
use branchpos_events::EventEnvelope;
use branchpos_products::ProductId;
use branchpos_registers::SessionId;
use branchpos_reservations::ReservationId;
use branchpos_sales::SaleId;
use branchpos_transfers::TransferId;

use super::ProjectionError;
use super::branches::{BranchReadModel, BranchesProjection};
use super::cash_sessions::{CashSessionReadModel, CashSessionsProjection};
use super::products::{ProductCatalogProjection, ProductReadModel};
use super::reservations::{ReservationReadModel, ReservationsProjection};
use super::sales::{SaleReadModel, SalesProjection};
use super::stock_levels::{StockLevelReadModel, StockLevelsProjection};
use super::transfers::{TransferReadModel, TransfersProjection};
use super::users::{UserReadModel, UsersProjection};
use crate::event_store::{EventStore, StoredEvent};
use crate::read_model::InMemoryTenantStore;
use crate::streams;

type Mem<K, V> = InMemoryTenantStore<K, V>;

/// In-memory read side. Feed it envelopes in log order (live from the bus,
/// or all at once through [`ReadModels::rebuild`]).
#[derive(Debug)]
pub struct ReadModels {
    pub products: ProductCatalogProjection<Mem<ProductId, ProductReadModel>>,
    pub stock: StockLevelsProjection<Mem<ProductId, StockLevelReadModel>>,
    pub branches: BranchesProjection<Mem<BranchId, BranchReadModel>>,
    pub cash_sessions: CashSessionsProjection<Mem<SessionId, CashSessionReadModel>>,
    pub sales: SalesProjection<Mem<SaleId, SaleReadModel>>,
    pub transfers: TransfersProjection<Mem<TransferId, TransferReadModel>>,
    pub reservations: ReservationsProjection<Mem<ReservationId, ReservationReadModel>>,
    pub users: UsersProjection<Mem<UserId, UserReadModel>>,
    accounts: RwLock<BTreeSet<AccountId>>,
}

impl Default for ReadModels {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadModels {
    pub fn new() -> Self {
        Self {
            products: ProductCatalogProjection::new(InMemoryTenantStore::new()),
            stock: StockLevelsProjection::new(InMemoryTenantStore::new()),
            branches: BranchesProjection::new(InMemoryTenantStore::new()),
            cash_sessions: CashSessionsProjection::new(InMemoryTenantStore::new()),
            sales: SalesProjection::new(InMemoryTenantStore::new()),
            transfers: TransfersProjection::new(InMemoryTenantStore::new()),
            reservations: ReservationsProjection::new(InMemoryTenantStore::new()),
            users: UsersProjection::new(InMemoryTenantStore::new()),
            accounts: RwLock::new(BTreeSet::new()),
        }
    }

    /// Route one envelope to the projections of its stream type.
    /// Unknown stream types are ignored.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            streams::PRODUCT => {
                self.products.apply_envelope(envelope)?;
                self.stock.apply_envelope(envelope)?;
            }
            streams::BRANCH => self.branches.apply_envelope(envelope)?,
            streams::REGISTER => self.cash_sessions.apply_envelope(envelope)?,
            streams::SALE => self.sales.apply_envelope(envelope)?,
            streams::TRANSFER => self.transfers.apply_envelope(envelope)?,
            streams::RESERVATION => self.reservations.apply_envelope(envelope)?,
            streams::USER => self.users.apply_envelope(envelope)?,
            other => {
                tracing::debug!(aggregate_type = other, "no projection for stream type");
                return Ok(());
            }
        }
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(envelope.account_id());
        }
        Ok(())
    }

    /// Apply `envelope`, replaying its whole stream from `store` when it
    /// arrives ahead of the stream cursor.
    ///
    /// Two units of work committing to the same stream publish from different
    /// threads, so the bus can hand over `n + 1` before `n`. The replay fills
    /// the gap; the late `n` is then a duplicate and skipped.
    pub fn apply_or_catch_up<S>(&self, envelope: &EventEnvelope<JsonValue>, store: &S) -> Result<(), ProjectionError>
    where
        S: EventStore + ?Sized,
    {
        match self.apply(envelope) {
            Err(ProjectionError::NonMonotonicSequence { last, found }) => {
                tracing::debug!(
                    aggregate_id = %envelope.aggregate_id(),
                    last,
                    found,
                    "stream gap; catching up from the event store"
                );
                let stream = store
                    .load_stream(envelope.account_id(), envelope.aggregate_id())
                    .map_err(|e| ProjectionError::Store(e.to_string()))?;
                for stored in &stream {
                    self.apply(&stored.to_envelope())?;
                }
                Ok(())
            }
            other => other,
        }
    }

    /// Accounts seen so far.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.accounts
            .read()
            .map(|a| a.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop everything and replay `events` (global log order).
    pub fn rebuild(&self, events: &[StoredEvent]) -> Result<usize, ProjectionError> {
        let known = self.accounts();
        self.products.clear(&known);
        self.stock.clear(&known);
        self.branches.clear(&known);
        self.cash_sessions.clear(&known);
        self.sales.clear(&known);
        self.transfers.clear(&known);
        self.reservations.clear(&known);
        self.users.clear(&known);
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.clear();
        }

        for event in events {
            self.apply(&event.to_envelope())?;
        }
        tracing::info!(events = events.len(), "read models rebuilt");
        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde::Serialize;
    use uuid::Uuid;

    use branchpos_core::AggregateId;
    use branchpos_events::{Event, StreamPosition};
    use branchpos_inventory::StockMovement;
    use branchpos_products::{Pricing, ProductCreated, ProductEvent, StockMoved};

    use super::*;

    fn envelope<E: Event + Serialize>(
        account_id: AccountId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        seq: u64,
        event: &E,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            StreamPosition { account_id, aggregate_id, sequence_number: seq },
            aggregate_type,
            event.event_type(),
            serde_json::to_value(event).unwrap(),
        )
    }

    fn product_stream(account_id: AccountId, product_id: ProductId, branch_id: BranchId) -> Vec<EventEnvelope<JsonValue>> {
        let created = ProductEvent::Created(ProductCreated {
            account_id,
            product_id,
            sku: "COLA-330".to_string(),
            name: "Cola 330ml".to_string(),
            category: "drinks".to_string(),
            pricing: Pricing { price: 150, cost_price: 90 },
            occurred_at: Utc::now(),
        });
        let moved = ProductEvent::StockMoved(StockMoved {
            account_id,
            product_id,
            movement: StockMovement::Adjusted {
                branch_id,
                delta: 24,
                note: "opening count".to_string(),
            },
            on_hand_after: 24,
            reserved_after: 0,
            occurred_at: Utc::now(),
        });
        vec![
            envelope(account_id, product_id.aggregate_id(), streams::PRODUCT, 1, &created),
            envelope(account_id, product_id.aggregate_id(), streams::PRODUCT, 2, &moved),
        ]
    }

    #[test]
    fn product_events_feed_catalog_and_stock() {
        let models = ReadModels::new();
        let account_id = AccountId::new();
        let branch_id = BranchId::new();
        let product_id = ProductId::generate();

        for env in product_stream(account_id, product_id, branch_id) {
            models.apply(&env).unwrap();
        }

        let catalog = models.products.get(account_id, &product_id).unwrap();
        assert_eq!(catalog.price, 150);
        assert!(models.products.find_by_sku(account_id, "cola-330").is_some());

        let stock = models.stock.get(account_id, &product_id).unwrap();
        assert_eq!(stock.at(branch_id).on_hand, 24);
        assert_eq!(stock.total_on_hand, 24);
        assert_eq!(models.accounts(), vec![account_id]);
    }

    #[test]
    fn redelivery_is_idempotent_and_accounts_stay_apart() {
        let models = ReadModels::new();
        let account_id = AccountId::new();
        let other = AccountId::new();
        let branch_id = BranchId::new();
        let product_id = ProductId::generate();

        let stream = product_stream(account_id, product_id, branch_id);
        for env in stream.iter().chain(stream.iter()) {
            models.apply(env).unwrap();
        }

        assert_eq!(models.stock.get(account_id, &product_id).unwrap().at(branch_id).on_hand, 24);
        assert!(models.products.list(other).is_empty());
    }

    #[test]
    fn out_of_order_delivery_is_repaired_from_the_store() {
        use branchpos_core::ExpectedVersion;

        use crate::event_store::{InMemoryEventStore, StreamAppend, UncommittedEvent};

        let store = InMemoryEventStore::new();
        let account_id = AccountId::new();
        let product_id = ProductId::generate();
        let branch_id = BranchId::new();

        let mut payloads: Vec<JsonValue> = product_stream(account_id, product_id, branch_id)
            .iter()
            .map(|env| env.payload().clone())
            .collect();
        let count_down = ProductEvent::StockMoved(StockMoved {
            account_id,
            product_id,
            movement: StockMovement::Adjusted {
                branch_id,
                delta: -4,
                note: "breakage".to_string(),
            },
            on_hand_after: 20,
            reserved_after: 0,
            occurred_at: Utc::now(),
        });
        payloads.push(serde_json::to_value(&count_down).unwrap());

        let events = payloads
            .into_iter()
            .map(|payload| UncommittedEvent {
                event_id: Uuid::now_v7(),
                account_id,
                aggregate_id: product_id.aggregate_id(),
                aggregate_type: streams::PRODUCT.to_string(),
                event_type: "products.product.test".to_string(),
                event_version: 1,
                occurred_at: Utc::now(),
                payload,
            })
            .collect();
        let committed = store
            .append_batch(vec![StreamAppend {
                account_id,
                aggregate_id: product_id.aggregate_id(),
                expected_version: ExpectedVersion::NoStream,
                events,
            }])
            .unwrap();
        assert_eq!(committed.len(), 3);

        let models = ReadModels::new();
        models.apply_or_catch_up(&committed[0].to_envelope(), &store).unwrap();
        // 3 overtakes 2 on the bus.
        models.apply_or_catch_up(&committed[2].to_envelope(), &store).unwrap();
        models.apply_or_catch_up(&committed[1].to_envelope(), &store).unwrap();

        assert_eq!(models.stock.get(account_id, &product_id).unwrap().at(branch_id).on_hand, 20);
    }

    #[test]
    fn mismatched_payload_account_is_rejected() {
        let models = ReadModels::new();
        let product_id = ProductId::generate();
        let mut stream = product_stream(AccountId::new(), product_id, BranchId::new());
        let forged = stream.remove(0);
        let forged = EventEnvelope::new(
            forged.event_id(),
            StreamPosition { account_id: AccountId::new(), ..forged.position() },
            forged.aggregate_type(),
            forged.event_type(),
            forged.payload().clone(),
        );

        assert!(matches!(models.apply(&forged), Err(ProjectionError::AccountIsolation(_))));
    }
}
