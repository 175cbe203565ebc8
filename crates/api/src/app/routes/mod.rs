use axum::{routing::get, Router};

pub mod branches;
pub mod common;
pub mod inventory;
pub mod products;
pub mod registers;
pub mod reservations;
pub mod sales;
pub mod system;
pub mod transfers;
pub mod users;

/// Router for all authenticated (account-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/policy", get(system::policy))
        .route("/authz/explain", get(system::explain))
        .route("/stream", get(system::stream))
        .nest("/branches", branches::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/sales", sales::router())
        .nest("/registers", registers::router())
        .nest("/transfers", transfers::router())
        .nest("/reservations", reservations::router())
        .nest("/users", users::router())
}
