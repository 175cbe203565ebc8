use branchpos_core::AccountId;

use crate::EventEnvelope;

/// Marker for messages that belong to exactly one account.
///
/// Subscribers (SSE streams, projections) use this to drop messages from
/// other accounts before they reach account-scoped consumers.
pub trait AccountScoped {
    fn account_id(&self) -> AccountId;
}

impl<E> AccountScoped for EventEnvelope<E> {
    fn account_id(&self) -> AccountId {
        EventEnvelope::account_id(self)
    }
}
