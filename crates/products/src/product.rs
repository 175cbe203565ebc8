use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use branchpos_core::{AccountId, Aggregate, AggregateRoot, BranchId, DomainError, aggregate_id};
use branchpos_events::Event;
use branchpos_inventory::{BranchStock, StockMovement};

aggregate_id!(
    /// Product identifier (account-scoped via `account_id` fields in events/commands).
    ProductId
);

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// Prices in the smallest currency unit (e.g. cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub price: u64,
    pub cost_price: u64,
}

/// Aggregate root: Product.
///
/// Owns the product's catalog data and its per-branch stock ledger. Every
/// sale, return, reservation and transfer touching this product goes through
/// this stream, so its version is the optimistic lock for stock changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    account_id: Option<AccountId>,
    sku: String,
    name: String,
    category: String,
    status: ProductStatus,
    pricing: Pricing,
    stock: BranchStock,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            account_id: None,
            sku: String::new(),
            name: String::new(),
            category: String::new(),
            status: ProductStatus::Active,
            pricing: Pricing::default(),
            stock: BranchStock::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    pub fn stock(&self) -> &BranchStock {
        &self.stock
    }

    pub fn can_be_sold(&self) -> bool {
        self.created && self.status == ProductStatus::Active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePricing {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Apply one or more stock movements atomically.
///
/// Movements are checked in order against the evolving ledger; if any is
/// rejected, none are emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStock {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub movements: Vec<StockMovement>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    Create(CreateProduct),
    UpdateDetails(UpdateDetails),
    UpdatePricing(UpdatePricing),
    Archive(ArchiveProduct),
    MoveStock(MoveStock),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsUpdated {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingUpdated {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved. Carries the resulting branch levels so projections
/// never have to recompute the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub movement: StockMovement,
    pub on_hand_after: u64,
    pub reserved_after: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    Created(ProductCreated),
    DetailsUpdated(DetailsUpdated),
    PricingUpdated(PricingUpdated),
    Archived(ProductArchived),
    StockMoved(StockMoved),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Created(_) => "products.product.created",
            ProductEvent::DetailsUpdated(_) => "products.product.details_updated",
            ProductEvent::PricingUpdated(_) => "products.product.pricing_updated",
            ProductEvent::Archived(_) => "products.product.archived",
            ProductEvent::StockMoved(_) => "products.product.stock_moved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Created(e) => e.occurred_at,
            ProductEvent::DetailsUpdated(e) => e.occurred_at,
            ProductEvent::PricingUpdated(e) => e.occurred_at,
            ProductEvent::Archived(e) => e.occurred_at,
            ProductEvent::StockMoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Created(e) => {
                self.id = e.product_id;
                self.account_id = Some(e.account_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.pricing = e.pricing;
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::DetailsUpdated(e) => {
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
            }
            ProductEvent::PricingUpdated(e) => self.pricing = e.pricing,
            ProductEvent::Archived(_) => self.status = ProductStatus::Archived,
            ProductEvent::StockMoved(e) => self.stock.apply(&e.movement),
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Create(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateDetails(cmd) => self.handle_update_details(cmd),
            ProductCommand::UpdatePricing(cmd) => self.handle_update_pricing(cmd),
            ProductCommand::Archive(cmd) => self.handle_archive(cmd),
            ProductCommand::MoveStock(cmd) => self.handle_move_stock(cmd),
        }
    }
}

impl Product {
    fn ensure_exists(&self, account_id: AccountId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        let (sku, name, category) = validate_details(&cmd.sku, &cmd.name, &cmd.category)?;

        Ok(vec![ProductEvent::Created(ProductCreated {
            account_id: cmd.account_id,
            product_id: cmd.product_id,
            sku,
            name,
            category,
            pricing: cmd.pricing,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateDetails) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.account_id, cmd.product_id)?;
        let (sku, name, category) = validate_details(&cmd.sku, &cmd.name, &cmd.category)?;

        if sku == self.sku && name == self.name && category == self.category {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::DetailsUpdated(DetailsUpdated {
            account_id: cmd.account_id,
            product_id: cmd.product_id,
            sku,
            name,
            category,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_pricing(&self, cmd: &UpdatePricing) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.account_id, cmd.product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("cannot reprice an archived product"));
        }
        if cmd.pricing == self.pricing {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::PricingUpdated(PricingUpdated {
            account_id: cmd.account_id,
            product_id: cmd.product_id,
            pricing: cmd.pricing,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.account_id, cmd.product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("product is already archived"));
        }
        if self.stock.total_reserved() > 0 {
            return Err(DomainError::invariant("cannot archive a product with reserved stock"));
        }

        Ok(vec![ProductEvent::Archived(ProductArchived {
            account_id: cmd.account_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_move_stock(&self, cmd: &MoveStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.account_id, cmd.product_id)?;
        if cmd.movements.is_empty() {
            return Err(DomainError::validation("no stock movements given"));
        }

        let mut ledger = self.stock.clone();
        let mut events = Vec::with_capacity(cmd.movements.len());

        for movement in &cmd.movements {
            if self.status == ProductStatus::Archived
                && matches!(movement, StockMovement::Sold { .. } | StockMovement::Reserved { .. })
            {
                return Err(DomainError::invariant(format!(
                    "product {} is archived and cannot be sold or reserved",
                    self.sku
                )));
            }

            ledger.check(movement).map_err(|e| e.in_context(&self.sku))?;
            ledger.apply(movement);

            let branch_id: BranchId = movement.branch_id();
            events.push(ProductEvent::StockMoved(StockMoved {
                account_id: cmd.account_id,
                product_id: cmd.product_id,
                movement: movement.clone(),
                on_hand_after: ledger.on_hand(branch_id),
                reserved_after: ledger.reserved(branch_id),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }
}

fn validate_details(sku: &str, name: &str, category: &str) -> Result<(String, String, String), DomainError> {
    let sku = sku.trim();
    let name = name.trim();
    if sku.is_empty() {
        return Err(DomainError::validation("sku cannot be empty"));
    }
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok((sku.to_string(), name.to_string(), category.trim().to_string()))
}
