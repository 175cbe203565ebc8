use std::hint::black_box;
use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::Value as JsonValue;

use branchpos_core::{AccountId, BranchId, UserId};
use branchpos_events::{EventEnvelope, InMemoryEventBus};
use branchpos_infra::command_dispatcher::CommandDispatcher;
use branchpos_infra::event_store::{EventStore, InMemoryEventStore};
use branchpos_infra::projections::ReadModels;
use branchpos_infra::workflows::{branches, products, registers, sales};
use branchpos_products::{CreateProduct, Pricing, Product, ProductCommand, ProductId};
use branchpos_registers::{PaymentMethod, RegisterId, SessionId};
use branchpos_sales::SaleId;

type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

struct Shop {
    dispatcher: Dispatcher,
    account_id: AccountId,
    branch_id: BranchId,
    products: Vec<ProductId>,
}

/// One branch with an open session and `product_count` well-stocked products.
fn shop(product_count: usize) -> Shop {
    let dispatcher = CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()));
    let account_id = AccountId::new();
    let branch = branches::NewBranch {
        branch_id: BranchId::new(),
        register_id: RegisterId::generate(),
        name: "Bench".to_string(),
        address: String::new(),
        occurred_at: Utc::now(),
    };
    dispatcher
        .transact(account_id, |uow| branches::create_branch(uow, &branch))
        .unwrap();
    dispatcher
        .transact(account_id, |uow| {
            registers::open_session(uow, branch.branch_id, SessionId::new(), UserId::new(), 0, Utc::now())
        })
        .unwrap();

    let products = (0..product_count)
        .map(|i| {
            let product_id = ProductId::generate();
            let create = ProductCommand::Create(CreateProduct {
                account_id,
                product_id,
                sku: format!("SKU-{i}"),
                name: format!("Product {i}"),
                category: "bench".to_string(),
                pricing: Pricing { price: 100, cost_price: 50 },
                occurred_at: Utc::now(),
            });
            dispatcher
                .dispatch::<Product>(account_id, product_id.aggregate_id(), create)
                .unwrap();
            dispatcher
                .transact(account_id, |uow| {
                    products::adjust_stock(uow, product_id, branch.branch_id, 1_000_000, "bench", Utc::now())
                })
                .unwrap();
            product_id
        })
        .collect();

    Shop {
        dispatcher,
        account_id,
        branch_id: branch.branch_id,
        products,
    }
}

fn sell_once(shop: &Shop) {
    let request = sales::SaleRequest {
        sale_id: SaleId::generate(),
        branch_id: shop.branch_id,
        cashier_id: UserId::new(),
        lines: shop
            .products
            .iter()
            .map(|product_id| sales::SaleRequestLine {
                product_id: *product_id,
                quantity: black_box(1),
                unit_price: None,
                discount_bps: 0,
            })
            .collect(),
        payment_method: PaymentMethod::Cash,
        discount_limit_bps: 0,
        occurred_at: Utc::now(),
    };
    shop.dispatcher
        .transact(shop.account_id, |uow| sales::record_sale(uow, &request))
        .unwrap();
}

fn bench_record_sale(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_sale");

    for lines in [1usize, 5, 20] {
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::new("lines", lines), &lines, |b, &lines| {
            let shop = shop(lines);
            b.iter(|| sell_once(&shop));
        });
    }

    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_model_rebuild");

    for sales_count in [100usize, 1_000] {
        let shop = shop(3);
        for _ in 0..sales_count {
            sell_once(&shop);
        }
        let events = shop.dispatcher.store().load_all().unwrap();

        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::new("sales", sales_count), &events, |b, events| {
            b.iter(|| {
                let models = ReadModels::new();
                black_box(models.rebuild(events).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_sale, bench_rebuild);
criterion_main!(benches);
