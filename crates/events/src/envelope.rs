use serde::{Deserialize, Serialize};
use uuid::Uuid;

use branchpos_core::{AccountId, AggregateId};

/// Where a committed event sits: position `sequence_number` (from 1) in one
/// account's stream for one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    pub account_id: AccountId,
    pub aggregate_id: AggregateId,
    pub sequence_number: u64,
}

impl StreamPosition {
    /// Position of the event that must have been applied before this one.
    pub fn previous(&self) -> Option<StreamPosition> {
        (self.sequence_number > 1).then(|| StreamPosition {
            sequence_number: self.sequence_number - 1,
            ..*self
        })
    }
}

/// A committed event as it travels over the bus to read models and the
/// realtime feed.
///
/// `aggregate_type` is the stream family the projections route on
/// (`"sales.sale"`); `event_type` names the fact (`"sales.sale.recorded"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    position: StreamPosition,
    aggregate_type: String,
    event_type: String,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        position: StreamPosition,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            position,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn position(&self) -> StreamPosition {
        self.position
    }

    pub fn account_id(&self) -> AccountId {
        self.position.account_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.position.aggregate_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.position.sequence_number
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// Realtime topic announcing that read models for this stream family moved.
    pub fn projection_topic(&self) -> String {
        format!("{}.projection_updated", self.aggregate_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_position_stays_in_stream() {
        let position = StreamPosition {
            account_id: AccountId::new(),
            aggregate_id: AggregateId::new(),
            sequence_number: 2,
        };
        let previous = position.previous().unwrap();
        assert_eq!(previous.sequence_number, 1);
        assert_eq!(previous.aggregate_id, position.aggregate_id);
        assert_eq!(previous.previous(), None);
    }
}
