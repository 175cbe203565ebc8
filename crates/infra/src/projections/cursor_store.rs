//! Projection cursor/offset tracking.
//!
//! A cursor is the last applied `sequence_number` per (account, aggregate)
//! stream. It makes projections idempotent under at-least-once delivery
//! (replays at or below the cursor are ignored) and lets a rebuild start from
//! scratch by clearing it.

use std::collections::HashMap;
use std::sync::RwLock;

use branchpos_core::{AccountId, AggregateId};
use branchpos_events::EventEnvelope;
use serde_json::Value as JsonValue;

use super::ProjectionError;

pub trait ProjectionCursorStore: Send + Sync {
    fn get_cursor(&self, account_id: AccountId, aggregate_id: AggregateId) -> Option<u64>;

    fn update_cursor(&self, account_id: AccountId, aggregate_id: AggregateId, sequence_number: u64);

    /// Forget every cursor (full rebuild).
    fn clear(&self);

    /// Whether `envelope` is the next event of its stream.
    ///
    /// `Ok(false)` for duplicates and replays. Streams start at 1 and
    /// increments must be contiguous, so a projection never starts mid-stream.
    fn should_apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let position = envelope.position();
        let found = position.sequence_number;
        let last = self
            .get_cursor(position.account_id, position.aggregate_id)
            .unwrap_or(0);

        if found == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        if found <= last {
            return Ok(false);
        }
        let expected_last = position.previous().map_or(0, |p| p.sequence_number);
        if expected_last != last {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        Ok(true)
    }

    fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        let position = envelope.position();
        self.update_cursor(position.account_id, position.aggregate_id, position.sequence_number);
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<(AccountId, AggregateId), u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(&self, account_id: AccountId, aggregate_id: AggregateId) -> Option<u64> {
        self.cursors.read().ok()?.get(&(account_id, aggregate_id)).copied()
    }

    fn update_cursor(&self, account_id: AccountId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert((account_id, aggregate_id), sequence_number);
        }
    }

    fn clear(&self) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
    }
}
