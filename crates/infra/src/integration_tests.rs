//! Integration tests for the full event-sourced pipeline.
//!
//! Workflow → UnitOfWork → EventStore → (bus) → ReadModels
//!
//! Verifies:
//! - Multi-aggregate workflows commit all or nothing
//! - Stock never goes negative and reserved never exceeds on hand
//! - One open cash session per branch under concurrent opens
//! - Transfers hold stock when shipped and move it only on completion
//! - The expiry sweep releases stock exactly once
//! - Accounts never see each other's data

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::Value as JsonValue;
    use uuid::Uuid;

    use branchpos_core::{AccountId, BranchId, UserId};
    use branchpos_events::{EventEnvelope, InMemoryEventBus};
    use branchpos_products::{CreateProduct, Pricing, Product, ProductCommand, ProductId};
    use branchpos_registers::{PaymentMethod, RegisterId, SessionId};
    use branchpos_reservations::{ReservationId, ReservationItem, ReservationStatus};
    use branchpos_sales::{ReturnLineInput, SaleId, SaleStatus};
    use branchpos_transfers::{TransferCommand, TransferId, TransferLine, TransferStatus};

    use crate::command_dispatcher::{CommandDispatcher, DispatchError, UnitOfWork};
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::jobs::ReservationExpirySweeper;
    use crate::projections::{CashSessionStatus, ReadModels, SaleFilter};
    use crate::workers::ProjectionWorker;
    use crate::workflows::{branches, products, registers, reservations, sales, transfers};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

    /// Applies committed events to the read models synchronously, so tests
    /// never wait on a background consumer.
    struct Harness {
        dispatcher: Arc<Dispatcher>,
        read_models: Arc<ReadModels>,
        account_id: AccountId,
        cashier: UserId,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(InMemoryEventStore::new());
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            Self {
                dispatcher: Arc::new(CommandDispatcher::new(store, bus)),
                read_models: Arc::new(ReadModels::new()),
                account_id: AccountId::new(),
                cashier: UserId::new(),
            }
        }

        fn run<T>(
            &self,
            work: impl FnMut(&mut UnitOfWork<'_>) -> Result<T, DispatchError>,
        ) -> Result<T, DispatchError> {
            self.run_as(self.account_id, work)
        }

        fn run_as<T>(
            &self,
            account_id: AccountId,
            work: impl FnMut(&mut UnitOfWork<'_>) -> Result<T, DispatchError>,
        ) -> Result<T, DispatchError> {
            let committed = self.dispatcher.transact(account_id, work)?;
            for event in &committed.events {
                self.read_models.apply(&event.to_envelope()).unwrap();
            }
            Ok(committed.value)
        }

        fn branch(&self, name: &str) -> BranchId {
            let input = branches::NewBranch {
                branch_id: BranchId::new(),
                register_id: RegisterId::generate(),
                name: name.to_string(),
                address: "1 Main Street".to_string(),
                occurred_at: Utc::now(),
            };
            self.run(|uow| branches::create_branch(uow, &input)).unwrap();
            input.branch_id
        }

        fn product(&self, sku: &str, price: u64) -> ProductId {
            let product_id = ProductId::generate();
            let command = ProductCommand::Create(CreateProduct {
                account_id: self.account_id,
                product_id,
                sku: sku.to_string(),
                name: format!("Product {sku}"),
                category: "general".to_string(),
                pricing: Pricing { price, cost_price: price / 2 },
                occurred_at: Utc::now(),
            });
            self.run(|uow| uow.execute::<Product>(product_id.aggregate_id(), &command))
                .unwrap();
            product_id
        }

        fn stock_in(&self, product_id: ProductId, branch_id: BranchId, quantity: i64) {
            self.run(|uow| products::adjust_stock(uow, product_id, branch_id, quantity, "count", Utc::now()))
                .unwrap();
        }

        fn open_session(&self, branch_id: BranchId, opening_balance: u64) -> SessionId {
            let session_id = SessionId::new();
            self.run(|uow| {
                registers::open_session(uow, branch_id, session_id, self.cashier, opening_balance, Utc::now())
            })
            .unwrap();
            session_id
        }

        fn sell(
            &self,
            branch_id: BranchId,
            lines: &[(ProductId, u64)],
            payment_method: PaymentMethod,
        ) -> Result<SaleId, DispatchError> {
            let request = sales::SaleRequest {
                sale_id: SaleId::generate(),
                branch_id,
                cashier_id: self.cashier,
                lines: lines
                    .iter()
                    .map(|(product_id, quantity)| sales::SaleRequestLine {
                        product_id: *product_id,
                        quantity: *quantity,
                        unit_price: None,
                        discount_bps: 0,
                    })
                    .collect(),
                payment_method,
                discount_limit_bps: 1000,
                occurred_at: Utc::now(),
            };
            self.run(|uow| sales::record_sale(uow, &request))?;
            Ok(request.sale_id)
        }

        fn on_hand(&self, product_id: ProductId, branch_id: BranchId) -> u64 {
            self.read_models
                .stock
                .get(self.account_id, &product_id)
                .map(|s| s.at(branch_id).on_hand)
                .unwrap_or(0)
        }

        fn reserved(&self, product_id: ProductId, branch_id: BranchId) -> u64 {
            self.read_models
                .stock
                .get(self.account_id, &product_id)
                .map(|s| s.at(branch_id).reserved)
                .unwrap_or(0)
        }
    }

    #[test]
    fn selling_more_than_available_is_rejected_and_changes_nothing() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, b1, 5);
        h.open_session(b1, 0);

        h.sell(b1, &[(cola, 3)], PaymentMethod::Cash).unwrap();
        assert_eq!(h.on_hand(cola, b1), 2);

        let err = h.sell(b1, &[(cola, 3)], PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, DispatchError::InsufficientStock(_)));
        assert_eq!(h.on_hand(cola, b1), 2);

        let session = h.read_models.cash_sessions.current_for_branch(h.account_id, b1).unwrap();
        assert_eq!(session.totals.sale_count, 1);
        assert_eq!(session.totals.cash_sales, 450);
        assert_eq!(h.read_models.sales.list(h.account_id, SaleFilter::default()).len(), 1);
    }

    #[test]
    fn one_short_line_aborts_the_whole_sale() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        let chips = h.product("CHIPS", 200);
        h.stock_in(cola, b1, 10);
        h.stock_in(chips, b1, 1);
        h.open_session(b1, 0);

        let err = h
            .sell(b1, &[(cola, 4), (chips, 2)], PaymentMethod::Card)
            .unwrap_err();

        assert!(matches!(err, DispatchError::InsufficientStock(_)));
        assert_eq!(h.on_hand(cola, b1), 10);
        assert_eq!(h.on_hand(chips, b1), 1);
        assert!(h.read_models.sales.list(h.account_id, SaleFilter::default()).is_empty());
    }

    #[test]
    fn sales_need_an_open_session() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, b1, 5);

        let err = h.sell(b1, &[(cola, 1)], PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert_eq!(h.on_hand(cola, b1), 5);
    }

    #[test]
    fn partial_return_restocks_and_refunds_from_the_session() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, b1, 10);
        let session_id = h.open_session(b1, 1_000);
        let sale_id = h.sell(b1, &[(cola, 4)], PaymentMethod::Cash).unwrap();

        let request = sales::ReturnRequest {
            sale_id,
            return_id: Uuid::now_v7(),
            lines: vec![ReturnLineInput { product_id: cola, quantity: 1 }],
            refund_method: PaymentMethod::Cash,
            processed_by: h.cashier,
            reason: "dented can".to_string(),
            occurred_at: Utc::now(),
        };
        let sale = h.run(|uow| sales::register_return(uow, &request)).unwrap();

        assert_eq!(sale.status(), SaleStatus::PartiallyReturned);
        assert_eq!(h.on_hand(cola, b1), 7);
        let view = h.read_models.sales.get(h.account_id, &sale_id).unwrap();
        assert_eq!(view.refunded_total, 150);
        assert_eq!(view.returns.len(), 1);

        // expected = 1000 + 600 - 150
        h.run(|uow| registers::close_session(uow, b1, Some(session_id), h.cashier, 1_440, Utc::now()))
            .unwrap();
        let closed = h.read_models.cash_sessions.get(h.account_id, &session_id).unwrap();
        assert_eq!(closed.status, CashSessionStatus::Closed);
        assert_eq!(closed.expected_cash, 1_450);
        assert_eq!(closed.variance, Some(-10));
    }

    #[test]
    fn concurrent_opens_leave_exactly_one_session() {
        let h = Arc::new(Harness::new());
        let b1 = h.branch("Downtown");
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let h = Arc::clone(&h);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let session_id = SessionId::new();
                    h.dispatcher.transact(h.account_id, |uow| {
                        registers::open_session(uow, b1, session_id, UserId::new(), 0, Utc::now())
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|j| j.join().unwrap()).collect();
        let opened = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(opened, 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, DispatchError::Conflict(_)))
        );
    }

    #[test]
    fn transfer_moves_stock_only_on_completion() {
        let h = Harness::new();
        let source = h.branch("Warehouse");
        let destination = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, source, 10);

        let transfer_id = TransferId::generate();
        let request = transfers::TransferRequest {
            transfer_id,
            source_branch_id: source,
            destination_branch_id: destination,
            lines: vec![TransferLine { product_id: cola, quantity: 4 }],
            requested_by: h.cashier,
            note: String::new(),
            occurred_at: Utc::now(),
        };
        h.run(|uow| transfers::request_transfer(uow, &request)).unwrap();

        let approve = TransferCommand::Approve {
            account_id: h.account_id,
            approved_by: UserId::new(),
            occurred_at: Utc::now(),
        };
        h.run(|uow| transfers::transition(uow, transfer_id, &approve)).unwrap();
        h.run(|uow| transfers::ship_transfer(uow, transfer_id, UserId::new(), Utc::now()))
            .unwrap();
        assert_eq!(h.on_hand(cola, source), 10);
        assert_eq!(h.reserved(cola, source), 4);
        assert_eq!(h.on_hand(cola, destination), 0);

        h.run(|uow| transfers::complete_transfer(uow, transfer_id, h.cashier, Utc::now()))
            .unwrap();

        assert_eq!(h.on_hand(cola, source), 6);
        assert_eq!(h.on_hand(cola, destination), 4);
        let stock = h.read_models.stock.get(h.account_id, &cola).unwrap();
        assert_eq!(stock.total_on_hand, 10);
        let view = h.read_models.transfers.get(h.account_id, &transfer_id).unwrap();
        assert_eq!(view.status, TransferStatus::Completed);
        assert_eq!(view.received_by, Some(h.cashier));
    }

    #[test]
    fn shipped_units_cannot_be_sold_before_completion() {
        let h = Harness::new();
        let source = h.branch("Warehouse");
        let destination = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, source, 5);

        let transfer_id = TransferId::generate();
        let request = transfers::TransferRequest {
            transfer_id,
            source_branch_id: source,
            destination_branch_id: destination,
            lines: vec![TransferLine { product_id: cola, quantity: 5 }],
            requested_by: h.cashier,
            note: "restock".to_string(),
            occurred_at: Utc::now(),
        };
        h.run(|uow| transfers::request_transfer(uow, &request)).unwrap();
        let approve =
            TransferCommand::Approve { account_id: h.account_id, approved_by: h.cashier, occurred_at: Utc::now() };
        h.run(|uow| transfers::transition(uow, transfer_id, &approve)).unwrap();
        h.run(|uow| transfers::ship_transfer(uow, transfer_id, h.cashier, Utc::now()))
            .unwrap();

        h.open_session(source, 0);
        let err = h.sell(source, &[(cola, 1)], PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, DispatchError::InsufficientStock(_)));
        let err = h
            .run(|uow| products::adjust_stock(uow, cola, source, -1, "shrinkage", Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::InsufficientStock(_)));

        h.run(|uow| transfers::complete_transfer(uow, transfer_id, h.cashier, Utc::now()))
            .unwrap();
        assert_eq!(h.on_hand(cola, source), 0);
        assert_eq!(h.reserved(cola, source), 0);
        assert_eq!(h.on_hand(cola, destination), 5);
        let view = h.read_models.transfers.get(h.account_id, &transfer_id).unwrap();
        assert_eq!(view.status, TransferStatus::Completed);
    }

    #[test]
    fn shipping_more_than_available_writes_nothing() {
        let h = Harness::new();
        let source = h.branch("Warehouse");
        let destination = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, source, 5);

        let transfer_id = TransferId::generate();
        let request = transfers::TransferRequest {
            transfer_id,
            source_branch_id: source,
            destination_branch_id: destination,
            lines: vec![TransferLine { product_id: cola, quantity: 4 }],
            requested_by: h.cashier,
            note: String::new(),
            occurred_at: Utc::now(),
        };
        h.run(|uow| transfers::request_transfer(uow, &request)).unwrap();
        let approve =
            TransferCommand::Approve { account_id: h.account_id, approved_by: h.cashier, occurred_at: Utc::now() };
        h.run(|uow| transfers::transition(uow, transfer_id, &approve)).unwrap();

        h.open_session(source, 0);
        h.sell(source, &[(cola, 2)], PaymentMethod::Cash).unwrap();

        let err = h
            .run(|uow| transfers::ship_transfer(uow, transfer_id, h.cashier, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::InsufficientStock(_)));
        assert_eq!(h.reserved(cola, source), 0);
        let view = h.read_models.transfers.get(h.account_id, &transfer_id).unwrap();
        assert_eq!(view.status, TransferStatus::Approved);
    }

    #[test]
    fn price_below_catalog_counts_against_the_discount_limit() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let tv = h.product("TV-55", 100_000);
        h.stock_in(tv, b1, 2);
        h.open_session(b1, 0);

        let request = |unit_price: u64| sales::SaleRequest {
            sale_id: SaleId::generate(),
            branch_id: b1,
            cashier_id: h.cashier,
            lines: vec![sales::SaleRequestLine {
                product_id: tv,
                quantity: 1,
                unit_price: Some(unit_price),
                discount_bps: 0,
            }],
            payment_method: PaymentMethod::Cash,
            discount_limit_bps: 1_000,
            occurred_at: Utc::now(),
        };

        let cut = request(1);
        let err = h.run(|uow| sales::record_sale(uow, &cut)).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert_eq!(h.on_hand(tv, b1), 2);

        let fair = request(90_000);
        let sale = h.run(|uow| sales::record_sale(uow, &fair)).unwrap();
        assert_eq!(sale.totals().total, 90_000);
        assert_eq!(h.on_hand(tv, b1), 1);
    }

    #[test]
    fn transfer_to_the_same_branch_is_rejected() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        let request = transfers::TransferRequest {
            transfer_id: TransferId::generate(),
            source_branch_id: b1,
            destination_branch_id: b1,
            lines: vec![TransferLine { product_id: cola, quantity: 1 }],
            requested_by: h.cashier,
            note: String::new(),
            occurred_at: Utc::now(),
        };
        let err = h.run(|uow| transfers::request_transfer(uow, &request)).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn reserved_units_cannot_be_sold_and_completion_records_a_sale() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, b1, 5);
        h.open_session(b1, 0);

        let reservation_id = ReservationId::generate();
        let request = reservations::ReservationRequest {
            reservation_id,
            branch_id: b1,
            items: vec![ReservationItem { product_id: cola, quantity: 4 }],
            customer_name: "Ada".to_string(),
            expiry_date: Utc::now() + ChronoDuration::days(1),
            created_by: h.cashier,
            occurred_at: Utc::now(),
        };
        h.run(|uow| reservations::create_reservation(uow, &request)).unwrap();
        assert_eq!(h.reserved(cola, b1), 4);

        let err = h.sell(b1, &[(cola, 2)], PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, DispatchError::InsufficientStock(_)));

        let complete = reservations::CompleteReservation {
            reservation_id,
            sale_id: SaleId::generate(),
            completed_by: h.cashier,
            payment_method: PaymentMethod::Card,
            occurred_at: Utc::now(),
        };
        h.run(|uow| reservations::complete_reservation(uow, &complete)).unwrap();

        assert_eq!(h.on_hand(cola, b1), 1);
        assert_eq!(h.reserved(cola, b1), 0);
        let sale = h.read_models.sales.get(h.account_id, &complete.sale_id).unwrap();
        assert_eq!(sale.totals.total, 600);
        assert_eq!(sale.reservation_id, Some(reservation_id.aggregate_id()));
        let session = h.read_models.cash_sessions.current_for_branch(h.account_id, b1).unwrap();
        assert_eq!(session.totals.card_sales, 600);
        assert_eq!(
            h.read_models.reservations.get(h.account_id, &reservation_id).unwrap().status,
            ReservationStatus::Completed
        );
    }

    #[test]
    fn expiry_sweep_releases_stock_once() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, b1, 5);

        let created_at = Utc::now() - ChronoDuration::hours(2);
        let reservation_id = ReservationId::generate();
        let request = reservations::ReservationRequest {
            reservation_id,
            branch_id: b1,
            items: vec![ReservationItem { product_id: cola, quantity: 3 }],
            customer_name: "Grace".to_string(),
            expiry_date: created_at + ChronoDuration::hours(1),
            created_by: h.cashier,
            occurred_at: created_at,
        };
        h.run(|uow| reservations::create_reservation(uow, &request)).unwrap();
        assert_eq!(h.reserved(cola, b1), 3);

        // The sweeper commits behind the harness' back, so the read model
        // still lists the reservation as pending on the second pass.
        let sweeper = ReservationExpirySweeper::new(Arc::clone(&h.dispatcher), Arc::clone(&h.read_models));
        let first = sweeper.sweep(Utc::now());
        assert_eq!((first.examined, first.expired, first.failed), (1, 1, 0));

        let second = sweeper.sweep(Utc::now());
        assert_eq!((second.examined, second.expired, second.skipped), (1, 0, 1));

        let events = h.dispatcher.store().load_stream(h.account_id, cola.aggregate_id()).unwrap();
        let releases = events
            .iter()
            .filter(|e| e.payload.to_string().contains("released"))
            .count();
        assert_eq!(releases, 1);

        let rebuilt = ReadModels::new();
        rebuilt.rebuild(&h.dispatcher.store().load_all().unwrap()).unwrap();
        let level = rebuilt.stock.get(h.account_id, &cola).unwrap().at(b1);
        assert_eq!((level.on_hand, level.reserved), (5, 0));
        assert_eq!(
            rebuilt.reservations.get(h.account_id, &reservation_id).unwrap().status,
            ReservationStatus::Expired
        );
    }

    #[test]
    fn accounts_are_isolated() {
        let h = Harness::new();
        let b1 = h.branch("Downtown");
        let cola = h.product("COLA", 150);
        h.stock_in(cola, b1, 5);

        let other = AccountId::new();
        assert!(h.read_models.branches.list(other).is_empty());
        assert!(h.read_models.stock.get(other, &cola).is_none());

        let err = h
            .run_as(other, |uow| products::adjust_stock(uow, cola, b1, 1, "", Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
        assert_eq!(h.on_hand(cola, b1), 5);
    }

    #[test]
    fn projection_worker_keeps_read_models_current() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = CommandDispatcher::new(store, Arc::clone(&bus));
        let read_models = Arc::new(ReadModels::new());

        let sink = Arc::clone(&read_models);
        let worker = ProjectionWorker::spawn("read-models", &bus, None, move |env: EventEnvelope<JsonValue>| {
            sink.apply(&env)
        })
        .unwrap();

        let account_id = AccountId::new();
        let input = branches::NewBranch {
            branch_id: BranchId::new(),
            register_id: RegisterId::generate(),
            name: "Harbour".to_string(),
            address: "Pier 3".to_string(),
            occurred_at: Utc::now(),
        };
        dispatcher
            .transact(account_id, |uow| branches::create_branch(uow, &input))
            .unwrap();

        let mut found = None;
        for _ in 0..40 {
            found = read_models.branches.get(account_id, &input.branch_id);
            if found.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(25));
        }
        worker.shutdown();

        let branch = found.unwrap();
        assert_eq!(branch.name, "Harbour");
        assert_eq!(branch.register_id, input.register_id);
    }

    mod ledger_properties {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Count(i64),
            Sell(u64),
            Reserve(u64),
            CancelOldestReservation,
            ReturnOneFromLastSale,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (-5i64..10).prop_filter("non-zero", |d| *d != 0).prop_map(Op::Count),
                (1u64..6).prop_map(Op::Sell),
                (1u64..4).prop_map(Op::Reserve),
                Just(Op::CancelOldestReservation),
                Just(Op::ReturnOneFromLastSale),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

            #[test]
            fn stock_stays_non_negative_and_covers_reservations(ops in prop::collection::vec(op(), 1..25)) {
                let h = Harness::new();
                let b1 = h.branch("Downtown");
                let cola = h.product("COLA", 100);
                h.open_session(b1, 10_000);

                let mut pending = Vec::new();
                let mut sales_made = Vec::new();

                for op in ops {
                    // Rejections are expected; only the invariants matter.
                    match op {
                        Op::Count(delta) => {
                            let _ = h.run(|uow| products::adjust_stock(uow, cola, b1, delta, "", Utc::now()));
                        }
                        Op::Sell(quantity) => {
                            if let Ok(sale_id) = h.sell(b1, &[(cola, quantity)], PaymentMethod::Cash) {
                                sales_made.push(sale_id);
                            }
                        }
                        Op::Reserve(quantity) => {
                            let request = reservations::ReservationRequest {
                                reservation_id: ReservationId::generate(),
                                branch_id: b1,
                                items: vec![ReservationItem { product_id: cola, quantity }],
                                customer_name: "Prop".to_string(),
                                expiry_date: Utc::now() + ChronoDuration::days(1),
                                created_by: h.cashier,
                                occurred_at: Utc::now(),
                            };
                            if h.run(|uow| reservations::create_reservation(uow, &request)).is_ok() {
                                pending.push(request.reservation_id);
                            }
                        }
                        Op::CancelOldestReservation => {
                            if !pending.is_empty() {
                                let reservation_id = pending.remove(0);
                                h.run(|uow| {
                                    reservations::cancel_reservation(uow, reservation_id, h.cashier, "changed mind", Utc::now())
                                })
                                .unwrap();
                            }
                        }
                        Op::ReturnOneFromLastSale => {
                            if let Some(sale_id) = sales_made.last().copied() {
                                let request = sales::ReturnRequest {
                                    sale_id,
                                    return_id: Uuid::now_v7(),
                                    lines: vec![ReturnLineInput { product_id: cola, quantity: 1 }],
                                    refund_method: PaymentMethod::Card,
                                    processed_by: h.cashier,
                                    reason: String::new(),
                                    occurred_at: Utc::now(),
                                };
                                let _ = h.run(|uow| sales::register_return(uow, &request));
                            }
                        }
                    }

                    let product = h
                        .run(|uow| uow.load::<Product>(cola.aggregate_id()))
                        .unwrap();
                    let stock = product.stock();
                    prop_assert!(stock.reserved(b1) <= stock.on_hand(b1));
                    prop_assert_eq!(h.on_hand(cola, b1), stock.on_hand(b1));
                    prop_assert_eq!(h.reserved(cola, b1), stock.reserved(b1));
                }
            }
        }
    }
}
