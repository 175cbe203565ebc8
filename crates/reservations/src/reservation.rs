use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use branchpos_core::{AccountId, Aggregate, AggregateRoot, BranchId, DomainError, UserId, aggregate_id};
use branchpos_events::Event;
use branchpos_products::ProductId;

aggregate_id!(
    /// Reservation identifier.
    ReservationId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub product_id: ProductId,
    pub quantity: u64,
}

/// Aggregate root: Reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    id: ReservationId,
    account_id: Option<AccountId>,
    branch_id: Option<BranchId>,
    items: Vec<ReservationItem>,
    customer_name: String,
    expiry_date: Option<DateTime<Utc>>,
    status: ReservationStatus,
    created_by: Option<UserId>,
    settled_by: Option<UserId>,
    settled_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Reservation {
    pub fn empty(id: ReservationId) -> Self {
        Self {
            id,
            account_id: None,
            branch_id: None,
            items: Vec::new(),
            customer_name: String::new(),
            expiry_date: None,
            status: ReservationStatus::Pending,
            created_by: None,
            settled_by: None,
            settled_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReservationId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn items(&self) -> &[ReservationItem] {
        &self.items
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
    }

    /// Pending and past its expiry date at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expiry_date.is_some_and(|expiry| expiry < now)
    }

    fn ensure_pending(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        if self.status != ReservationStatus::Pending {
            return Err(DomainError::invariant(format!("reservation is already {}", self.status)));
        }
        Ok(())
    }

    fn settled(&self) -> Result<(BranchId, Vec<ReservationItem>), DomainError> {
        let branch_id = self.branch_id.ok_or_else(DomainError::not_found)?;
        Ok((branch_id, self.items.clone()))
    }
}

impl AggregateRoot for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationCommand {
    Create {
        account_id: AccountId,
        reservation_id: ReservationId,
        branch_id: BranchId,
        items: Vec<ReservationItem>,
        customer_name: String,
        expiry_date: DateTime<Utc>,
        created_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Complete {
        account_id: AccountId,
        completed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Cancel {
        account_id: AccountId,
        cancelled_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    /// Issued by the expiry sweeper (or a manual sweep); `occurred_at` is "now".
    Expire {
        account_id: AccountId,
        occurred_at: DateTime<Utc>,
    },
}

/// Every settling event repeats the branch and items so projections and
/// stock workflows never need the creation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    Created {
        account_id: AccountId,
        reservation_id: ReservationId,
        branch_id: BranchId,
        items: Vec<ReservationItem>,
        customer_name: String,
        expiry_date: DateTime<Utc>,
        created_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        account_id: AccountId,
        reservation_id: ReservationId,
        branch_id: BranchId,
        items: Vec<ReservationItem>,
        completed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        account_id: AccountId,
        reservation_id: ReservationId,
        branch_id: BranchId,
        items: Vec<ReservationItem>,
        cancelled_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Expired {
        account_id: AccountId,
        reservation_id: ReservationId,
        branch_id: BranchId,
        items: Vec<ReservationItem>,
        expiry_date: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::Created { .. } => "reservations.reservation.created",
            ReservationEvent::Completed { .. } => "reservations.reservation.completed",
            ReservationEvent::Cancelled { .. } => "reservations.reservation.cancelled",
            ReservationEvent::Expired { .. } => "reservations.reservation.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::Created { occurred_at, .. }
            | ReservationEvent::Completed { occurred_at, .. }
            | ReservationEvent::Cancelled { occurred_at, .. }
            | ReservationEvent::Expired { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Reservation {
    type Command = ReservationCommand;
    type Event = ReservationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReservationEvent::Created {
                account_id,
                reservation_id,
                branch_id,
                items,
                customer_name,
                expiry_date,
                created_by,
                ..
            } => {
                self.id = *reservation_id;
                self.account_id = Some(*account_id);
                self.branch_id = Some(*branch_id);
                self.items = items.clone();
                self.customer_name = customer_name.clone();
                self.expiry_date = Some(*expiry_date);
                self.created_by = Some(*created_by);
                self.status = ReservationStatus::Pending;
                self.created = true;
            }
            ReservationEvent::Completed { completed_by, occurred_at, .. } => {
                self.status = ReservationStatus::Completed;
                self.settled_by = Some(*completed_by);
                self.settled_at = Some(*occurred_at);
            }
            ReservationEvent::Cancelled { cancelled_by, occurred_at, .. } => {
                self.status = ReservationStatus::Cancelled;
                self.settled_by = Some(*cancelled_by);
                self.settled_at = Some(*occurred_at);
            }
            ReservationEvent::Expired { occurred_at, .. } => {
                self.status = ReservationStatus::Expired;
                self.settled_at = Some(*occurred_at);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReservationCommand::Create {
                account_id,
                reservation_id,
                branch_id,
                items,
                customer_name,
                expiry_date,
                created_by,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("reservation already exists"));
                }
                if *expiry_date <= *occurred_at {
                    return Err(DomainError::validation("expiry date must be in the future"));
                }
                validate_items(items)?;

                Ok(vec![ReservationEvent::Created {
                    account_id: *account_id,
                    reservation_id: *reservation_id,
                    branch_id: *branch_id,
                    items: items.clone(),
                    customer_name: customer_name.trim().to_string(),
                    expiry_date: *expiry_date,
                    created_by: *created_by,
                    occurred_at: *occurred_at,
                }])
            }
            ReservationCommand::Complete { account_id, completed_by, occurred_at } => {
                self.ensure_pending(*account_id)?;
                let (branch_id, items) = self.settled()?;
                Ok(vec![ReservationEvent::Completed {
                    account_id: *account_id,
                    reservation_id: self.id,
                    branch_id,
                    items,
                    completed_by: *completed_by,
                    occurred_at: *occurred_at,
                }])
            }
            ReservationCommand::Cancel { account_id, cancelled_by, reason, occurred_at } => {
                self.ensure_pending(*account_id)?;
                let (branch_id, items) = self.settled()?;
                Ok(vec![ReservationEvent::Cancelled {
                    account_id: *account_id,
                    reservation_id: self.id,
                    branch_id,
                    items,
                    cancelled_by: *cancelled_by,
                    reason: reason.trim().to_string(),
                    occurred_at: *occurred_at,
                }])
            }
            ReservationCommand::Expire { account_id, occurred_at } => {
                self.ensure_pending(*account_id)?;
                let Some(expiry_date) = self.expiry_date.filter(|expiry| expiry < occurred_at) else {
                    return Err(DomainError::invariant("reservation has not expired yet"));
                };
                let (branch_id, items) = self.settled()?;
                Ok(vec![ReservationEvent::Expired {
                    account_id: *account_id,
                    reservation_id: self.id,
                    branch_id,
                    items,
                    expiry_date,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

fn validate_items(items: &[ReservationItem]) -> Result<(), DomainError> {
    if items.is_empty() {
        return Err(DomainError::validation("a reservation needs at least one item"));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.quantity == 0 {
            return Err(DomainError::validation("reserved quantity must be positive"));
        }
        if items[..idx].iter().any(|i| i.product_id == item.product_id) {
            return Err(DomainError::validation(format!(
                "product {} is reserved twice",
                item.product_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(expires_in: Duration) -> (AccountId, Reservation, DateTime<Utc>) {
        let account_id = AccountId::new();
        let reservation_id = ReservationId::generate();
        let now = Utc::now();
        let mut reservation = Reservation::empty(reservation_id);
        reservation
            .execute(&ReservationCommand::Create {
                account_id,
                reservation_id,
                branch_id: BranchId::new(),
                items: vec![ReservationItem { product_id: ProductId::generate(), quantity: 2 }],
                customer_name: " Ada ".to_string(),
                expiry_date: now + expires_in,
                created_by: UserId::new(),
                occurred_at: now,
            })
            .unwrap();
        (account_id, reservation, now)
    }

    #[test]
    fn expiry_must_be_in_the_future() {
        let now = Utc::now();
        let reservation = Reservation::empty(ReservationId::generate());
        let err = reservation
            .handle(&ReservationCommand::Create {
                account_id: AccountId::new(),
                reservation_id: reservation.id_typed(),
                branch_id: BranchId::new(),
                items: vec![ReservationItem { product_id: ProductId::generate(), quantity: 1 }],
                customer_name: String::new(),
                expiry_date: now,
                created_by: UserId::new(),
                occurred_at: now,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn duplicate_items_are_rejected() {
        let product_id = ProductId::generate();
        let items = vec![
            ReservationItem { product_id, quantity: 1 },
            ReservationItem { product_id, quantity: 2 },
        ];
        assert!(validate_items(&items).is_err());
    }

    #[test]
    fn cannot_expire_before_expiry_date() {
        let (account_id, reservation, now) = pending(Duration::hours(1));
        let err = reservation
            .handle(&ReservationCommand::Expire { account_id, occurred_at: now })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn expire_after_expiry_date_carries_items() {
        let (account_id, mut reservation, now) = pending(Duration::minutes(5));
        assert!(reservation.is_expired_at(now + Duration::minutes(6)));

        let events = reservation
            .execute(&ReservationCommand::Expire {
                account_id,
                occurred_at: now + Duration::minutes(6),
            })
            .unwrap();

        let ReservationEvent::Expired { items, .. } = &events[0] else {
            panic!("expected Expired");
        };
        assert_eq!(items[0].quantity, 2);
        assert_eq!(reservation.status(), ReservationStatus::Expired);
        assert!(!reservation.is_expired_at(now + Duration::hours(1)));
    }

    #[test]
    fn settled_reservation_cannot_be_settled_again() {
        let (account_id, mut reservation, now) = pending(Duration::minutes(5));
        reservation
            .execute(&ReservationCommand::Complete {
                account_id,
                completed_by: UserId::new(),
                occurred_at: now,
            })
            .unwrap();

        let err = reservation
            .handle(&ReservationCommand::Expire {
                account_id,
                occurred_at: now + Duration::hours(1),
            })
            .unwrap_err();
        assert!(err.to_string().contains("completed"));
        assert!(
            reservation
                .handle(&ReservationCommand::Cancel {
                    account_id,
                    cancelled_by: UserId::new(),
                    reason: String::new(),
                    occurred_at: now,
                })
                .is_err()
        );
    }

    #[test]
    fn customer_name_is_trimmed() {
        let (_, reservation, _) = pending(Duration::minutes(5));
        assert_eq!(reservation.customer_name(), "Ada");
    }
}
