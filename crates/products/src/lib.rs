//! Products domain module (event-sourced).
//!
//! Catalog data plus the embedded per-branch stock ledger, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod product;

pub use product::{
    ArchiveProduct, CreateProduct, DetailsUpdated, MoveStock, Pricing, PricingUpdated, Product,
    ProductArchived, ProductCommand, ProductCreated, ProductEvent, ProductId, ProductStatus,
    StockMoved, UpdateDetails, UpdatePricing,
};
