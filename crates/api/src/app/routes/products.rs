use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use branchpos_auth::Permission;
use branchpos_core::AccountId;
use branchpos_products::{
    ArchiveProduct, CreateProduct, Pricing, Product, ProductCommand, ProductId, UpdateDetails, UpdatePricing,
};

use crate::app::routes::common::{ApiResult, guard, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).put(update_product))
        .route("/:id/pricing", put(update_pricing))
        .route("/:id/archive", post(archive_product))
}

/// SKUs are unique per account (case-insensitive), checked against the catalog.
fn ensure_sku_free(
    services: &AppServices,
    account_id: AccountId,
    sku: &str,
    owner: Option<ProductId>,
) -> Result<(), axum::response::Response> {
    match services.read_models().products.find_by_sku(account_id, sku) {
        Some(existing) if Some(existing.product_id) != owner => Err(errors::json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("sku '{}' is already used by another product", sku.trim()),
        )),
        _ => Ok(()),
    }
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::PRODUCTS_WRITE, None)?;
    ensure_sku_free(&services, account.account_id(), &body.sku, None)?;

    let product_id = ProductId::generate();
    let cmd = ProductCommand::Create(CreateProduct {
        account_id: account.account_id(),
        product_id,
        sku: body.sku,
        name: body.name,
        category: body.category,
        pricing: Pricing {
            price: body.price,
            cost_price: body.cost_price,
        },
        occurred_at: Utc::now(),
    });

    let committed = services
        .dispatch::<Product>(account.account_id(), product_id.aggregate_id(), cmd)
        .map_err(errors::dispatch_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": product_id.to_string(),
            "sku": committed.value.sku(),
            "events_committed": committed.events.len(),
        })),
    )
        .into_response())
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    guard(&account, &principal, &Permission::PRODUCTS_READ, None)?;
    Ok(Json(services.read_models().products.list(account.account_id())).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    guard(&account, &principal, &Permission::PRODUCTS_READ, None)?;
    let product_id: ProductId = parse_id(&id, "product")?;

    match services.read_models().products.get(account.account_id(), &product_id) {
        Some(product) => Ok(Json(product).into_response()),
        None => Err(errors::not_found("product")),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::PRODUCTS_WRITE, None)?;
    let product_id: ProductId = parse_id(&id, "product")?;
    ensure_sku_free(&services, account.account_id(), &body.sku, Some(product_id))?;

    let cmd = ProductCommand::UpdateDetails(UpdateDetails {
        account_id: account.account_id(),
        product_id,
        sku: body.sku,
        name: body.name,
        category: body.category,
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch::<Product>(account.account_id(), product_id.aggregate_id(), cmd)
        .map_err(errors::dispatch_error_to_response)?;

    Ok(Json(serde_json::json!({
        "id": product_id.to_string(),
        "sku": committed.value.sku(),
        "name": committed.value.name(),
        "category": committed.value.category(),
        "events_committed": committed.events.len(),
    }))
    .into_response())
}

pub async fn update_pricing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdatePricingRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::PRODUCTS_WRITE, None)?;
    let product_id: ProductId = parse_id(&id, "product")?;

    let cmd = ProductCommand::UpdatePricing(UpdatePricing {
        account_id: account.account_id(),
        product_id,
        pricing: Pricing {
            price: body.price,
            cost_price: body.cost_price,
        },
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch::<Product>(account.account_id(), product_id.aggregate_id(), cmd)
        .map_err(errors::dispatch_error_to_response)?;

    let pricing = committed.value.pricing();
    Ok(Json(serde_json::json!({
        "id": product_id.to_string(),
        "price": pricing.price,
        "cost_price": pricing.cost_price,
        "events_committed": committed.events.len(),
    }))
    .into_response())
}

pub async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    guard(&account, &principal, &Permission::PRODUCTS_WRITE, None)?;
    let product_id: ProductId = parse_id(&id, "product")?;

    let cmd = ProductCommand::Archive(ArchiveProduct {
        account_id: account.account_id(),
        product_id,
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch::<Product>(account.account_id(), product_id.aggregate_id(), cmd)
        .map_err(errors::dispatch_error_to_response)?;

    Ok(Json(serde_json::json!({
        "id": product_id.to_string(),
        "status": committed.value.status(),
        "events_committed": committed.events.len(),
    }))
    .into_response())
}
