use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use branchpos_core::{AccountId, Aggregate, AggregateRoot, BranchId, DomainError, UserId, aggregate_id};
use branchpos_events::Event;
use branchpos_products::ProductId;

aggregate_id!(
    /// Transfer identifier (account-scoped via `account_id` fields in events/commands).
    TransferId
);

/// Transfer lifecycle.
///
/// ```text
/// pending ──approve──▶ approved ──ship──▶ in_transit ──complete──▶ completed
///    │                    │
///    └──reject──▶ rejected └──cancel──▶ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
    InTransit,
    Cancelled,
    Completed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::Rejected => "rejected",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Rejected | TransferStatus::Cancelled | TransferStatus::Completed
        )
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub product_id: ProductId,
    pub quantity: u64,
}

/// Aggregate root: Transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    id: TransferId,
    account_id: Option<AccountId>,
    source_branch_id: Option<BranchId>,
    destination_branch_id: Option<BranchId>,
    lines: Vec<TransferLine>,
    status: TransferStatus,
    note: String,
    requested_by: Option<UserId>,
    requested_at: Option<DateTime<Utc>>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    shipped_by: Option<UserId>,
    shipped_at: Option<DateTime<Utc>>,
    received_by: Option<UserId>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Transfer {
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            account_id: None,
            source_branch_id: None,
            destination_branch_id: None,
            lines: Vec::new(),
            status: TransferStatus::Pending,
            note: String::new(),
            requested_by: None,
            requested_at: None,
            approved_by: None,
            approved_at: None,
            shipped_by: None,
            shipped_at: None,
            received_by: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn source_branch_id(&self) -> Option<BranchId> {
        self.source_branch_id
    }

    pub fn destination_branch_id(&self) -> Option<BranchId> {
        self.destination_branch_id
    }

    pub fn lines(&self) -> &[TransferLine] {
        &self.lines
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn received_by(&self) -> Option<UserId> {
        self.received_by
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    fn ensure_status(&self, account_id: AccountId, expected: TransferStatus, action: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        if self.status != expected {
            return Err(DomainError::invariant(format!(
                "cannot {action} a transfer that is {} (must be {expected})",
                self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Request {
        account_id: AccountId,
        transfer_id: TransferId,
        source_branch_id: BranchId,
        destination_branch_id: BranchId,
        lines: Vec<TransferLine>,
        requested_by: UserId,
        note: String,
        occurred_at: DateTime<Utc>,
    },
    Approve {
        account_id: AccountId,
        approved_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Reject {
        account_id: AccountId,
        rejected_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Ship {
        account_id: AccountId,
        shipped_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Cancel {
        account_id: AccountId,
        cancelled_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Complete {
        account_id: AccountId,
        received_by: UserId,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Requested {
        account_id: AccountId,
        transfer_id: TransferId,
        source_branch_id: BranchId,
        destination_branch_id: BranchId,
        lines: Vec<TransferLine>,
        requested_by: UserId,
        note: String,
        occurred_at: DateTime<Utc>,
    },
    Approved {
        account_id: AccountId,
        transfer_id: TransferId,
        approved_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Rejected {
        account_id: AccountId,
        transfer_id: TransferId,
        rejected_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Shipped {
        account_id: AccountId,
        transfer_id: TransferId,
        shipped_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        account_id: AccountId,
        transfer_id: TransferId,
        cancelled_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        account_id: AccountId,
        transfer_id: TransferId,
        source_branch_id: BranchId,
        destination_branch_id: BranchId,
        lines: Vec<TransferLine>,
        received_by: UserId,
        occurred_at: DateTime<Utc>,
    },
}

impl TransferEvent {
    pub fn status_after(&self) -> TransferStatus {
        match self {
            TransferEvent::Requested { .. } => TransferStatus::Pending,
            TransferEvent::Approved { .. } => TransferStatus::Approved,
            TransferEvent::Rejected { .. } => TransferStatus::Rejected,
            TransferEvent::Shipped { .. } => TransferStatus::InTransit,
            TransferEvent::Cancelled { .. } => TransferStatus::Cancelled,
            TransferEvent::Completed { .. } => TransferStatus::Completed,
        }
    }
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::Requested { .. } => "transfers.transfer.requested",
            TransferEvent::Approved { .. } => "transfers.transfer.approved",
            TransferEvent::Rejected { .. } => "transfers.transfer.rejected",
            TransferEvent::Shipped { .. } => "transfers.transfer.shipped",
            TransferEvent::Cancelled { .. } => "transfers.transfer.cancelled",
            TransferEvent::Completed { .. } => "transfers.transfer.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::Requested { occurred_at, .. }
            | TransferEvent::Approved { occurred_at, .. }
            | TransferEvent::Rejected { occurred_at, .. }
            | TransferEvent::Shipped { occurred_at, .. }
            | TransferEvent::Cancelled { occurred_at, .. }
            | TransferEvent::Completed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::Requested {
                account_id,
                transfer_id,
                source_branch_id,
                destination_branch_id,
                lines,
                requested_by,
                note,
                occurred_at,
            } => {
                self.id = *transfer_id;
                self.account_id = Some(*account_id);
                self.source_branch_id = Some(*source_branch_id);
                self.destination_branch_id = Some(*destination_branch_id);
                self.lines = lines.clone();
                self.note = note.clone();
                self.requested_by = Some(*requested_by);
                self.requested_at = Some(*occurred_at);
                self.created = true;
            }
            TransferEvent::Approved { approved_by, occurred_at, .. } => {
                self.approved_by = Some(*approved_by);
                self.approved_at = Some(*occurred_at);
            }
            TransferEvent::Shipped { shipped_by, occurred_at, .. } => {
                self.shipped_by = Some(*shipped_by);
                self.shipped_at = Some(*occurred_at);
            }
            TransferEvent::Completed { received_by, occurred_at, .. } => {
                self.received_by = Some(*received_by);
                self.completed_at = Some(*occurred_at);
            }
            TransferEvent::Rejected { .. } | TransferEvent::Cancelled { .. } => {}
        }
        self.status = event.status_after();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Request {
                account_id,
                transfer_id,
                source_branch_id,
                destination_branch_id,
                lines,
                requested_by,
                note,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("transfer already exists"));
                }
                if source_branch_id == destination_branch_id {
                    return Err(DomainError::validation(
                        "source and destination branch must differ",
                    ));
                }
                validate_lines(lines)?;

                Ok(vec![TransferEvent::Requested {
                    account_id: *account_id,
                    transfer_id: *transfer_id,
                    source_branch_id: *source_branch_id,
                    destination_branch_id: *destination_branch_id,
                    lines: lines.clone(),
                    requested_by: *requested_by,
                    note: note.trim().to_string(),
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Approve { account_id, approved_by, occurred_at } => {
                self.ensure_status(*account_id, TransferStatus::Pending, "approve")?;
                Ok(vec![TransferEvent::Approved {
                    account_id: *account_id,
                    transfer_id: self.id,
                    approved_by: *approved_by,
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Reject { account_id, rejected_by, reason, occurred_at } => {
                self.ensure_status(*account_id, TransferStatus::Pending, "reject")?;
                Ok(vec![TransferEvent::Rejected {
                    account_id: *account_id,
                    transfer_id: self.id,
                    rejected_by: *rejected_by,
                    reason: reason.trim().to_string(),
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Ship { account_id, shipped_by, occurred_at } => {
                self.ensure_status(*account_id, TransferStatus::Approved, "ship")?;
                Ok(vec![TransferEvent::Shipped {
                    account_id: *account_id,
                    transfer_id: self.id,
                    shipped_by: *shipped_by,
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Cancel { account_id, cancelled_by, reason, occurred_at } => {
                self.ensure_status(*account_id, TransferStatus::Approved, "cancel")?;
                Ok(vec![TransferEvent::Cancelled {
                    account_id: *account_id,
                    transfer_id: self.id,
                    cancelled_by: *cancelled_by,
                    reason: reason.trim().to_string(),
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Complete { account_id, received_by, occurred_at } => {
                self.ensure_status(*account_id, TransferStatus::InTransit, "complete")?;
                let (Some(source), Some(destination)) = (self.source_branch_id, self.destination_branch_id) else {
                    return Err(DomainError::invariant("transfer has no branches"));
                };
                Ok(vec![TransferEvent::Completed {
                    account_id: *account_id,
                    transfer_id: self.id,
                    source_branch_id: source,
                    destination_branch_id: destination,
                    lines: self.lines.clone(),
                    received_by: *received_by,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

fn validate_lines(lines: &[TransferLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("a transfer needs at least one product"));
    }
    for (idx, line) in lines.iter().enumerate() {
        if line.quantity == 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        if lines[..idx].iter().any(|l| l.product_id == line.product_id) {
            return Err(DomainError::validation(format!(
                "product {} appears on more than one line",
                line.product_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn requested() -> (AccountId, Transfer) {
        let account_id = AccountId::new();
        let transfer_id = TransferId::generate();
        let mut transfer = Transfer::empty(transfer_id);
        transfer
            .execute(&TransferCommand::Request {
                account_id,
                transfer_id,
                source_branch_id: BranchId::new(),
                destination_branch_id: BranchId::new(),
                lines: vec![TransferLine {
                    product_id: ProductId::generate(),
                    quantity: 4,
                }],
                requested_by: UserId::new(),
                note: String::new(),
                occurred_at: Utc::now(),
            })
            .unwrap();
        (account_id, transfer)
    }

    fn approve(account_id: AccountId) -> TransferCommand {
        TransferCommand::Approve { account_id, approved_by: UserId::new(), occurred_at: Utc::now() }
    }

    fn ship(account_id: AccountId) -> TransferCommand {
        TransferCommand::Ship { account_id, shipped_by: UserId::new(), occurred_at: Utc::now() }
    }

    fn complete(account_id: AccountId) -> TransferCommand {
        TransferCommand::Complete { account_id, received_by: UserId::new(), occurred_at: Utc::now() }
    }

    fn reject(account_id: AccountId) -> TransferCommand {
        TransferCommand::Reject {
            account_id,
            rejected_by: UserId::new(),
            reason: "no stock".to_string(),
            occurred_at: Utc::now(),
        }
    }

    fn cancel(account_id: AccountId) -> TransferCommand {
        TransferCommand::Cancel {
            account_id,
            cancelled_by: UserId::new(),
            reason: "changed plans".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn same_branch_transfer_is_rejected() {
        let branch = BranchId::new();
        let transfer = Transfer::empty(TransferId::generate());
        let err = transfer
            .handle(&TransferCommand::Request {
                account_id: AccountId::new(),
                transfer_id: transfer.id_typed(),
                source_branch_id: branch,
                destination_branch_id: branch,
                lines: vec![TransferLine { product_id: ProductId::generate(), quantity: 1 }],
                requested_by: UserId::new(),
                note: String::new(),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn happy_path_stamps_actors() {
        let (account_id, mut transfer) = requested();
        transfer.execute(&approve(account_id)).unwrap();
        transfer.execute(&ship(account_id)).unwrap();
        let events = transfer.execute(&complete(account_id)).unwrap();

        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert!(transfer.approved_by().is_some());
        assert!(transfer.received_by().is_some());
        assert!(transfer.completed_at().is_some());

        let TransferEvent::Completed { lines, .. } = &events[0] else {
            panic!("expected Completed");
        };
        assert_eq!(lines[0].quantity, 4);
    }

    #[test]
    fn cannot_ship_pending_transfer() {
        let (account_id, transfer) = requested();
        let err = transfer.handle(&ship(account_id)).unwrap_err();
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn cannot_cancel_in_transit_transfer() {
        let (account_id, mut transfer) = requested();
        transfer.execute(&approve(account_id)).unwrap();
        transfer.execute(&ship(account_id)).unwrap();
        assert!(transfer.handle(&cancel(account_id)).is_err());
    }

    #[test]
    fn rejected_is_terminal() {
        let (account_id, mut transfer) = requested();
        transfer.execute(&reject(account_id)).unwrap();
        assert!(transfer.status().is_terminal());
        assert!(transfer.handle(&approve(account_id)).is_err());
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Approve,
        Reject,
        Ship,
        Cancel,
        Complete,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Approve),
            Just(Step::Reject),
            Just(Step::Ship),
            Just(Step::Cancel),
            Just(Step::Complete),
        ]
    }

    fn allowed(from: TransferStatus, to: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (from, to),
            (Pending, Approved) | (Pending, Rejected) | (Approved, InTransit) | (Approved, Cancelled) | (InTransit, Completed)
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of commands only ever produces allowed transitions.
        #[test]
        fn only_allowed_transitions_happen(steps in prop::collection::vec(step(), 0..12)) {
            let (account_id, mut transfer) = requested();
            for s in steps {
                let cmd = match s {
                    Step::Approve => approve(account_id),
                    Step::Reject => reject(account_id),
                    Step::Ship => ship(account_id),
                    Step::Cancel => cancel(account_id),
                    Step::Complete => complete(account_id),
                };
                let before = transfer.status();
                if transfer.execute(&cmd).is_ok() {
                    prop_assert!(allowed(before, transfer.status()));
                } else {
                    prop_assert_eq!(before, transfer.status());
                }
            }
        }
    }
}
