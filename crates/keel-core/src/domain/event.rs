//! Domain events: immutable records of something that happened.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::DomainError;

/// A fact raised by an aggregate.
pub trait DomainEvent: Serialize + fmt::Debug {
    /// Stable name, e.g. `"account.opened"`.
    fn event_type(&self) -> &'static str;
}

/// A recorded event with its metadata.
///
/// Fields are private; an envelope cannot be changed after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_id: Uuid,
    aggregate_id: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: Value,
}

impl EventEnvelope {
    /// Record `event` for the aggregate `aggregate_id`, stamped now.
    pub fn record<E: DomainEvent>(
        aggregate_id: impl fmt::Display,
        event: &E,
    ) -> Result<Self, DomainError> {
        Self::record_at(aggregate_id, event, Utc::now())
    }

    /// Record `event` with an explicit timestamp.
    pub fn record_at<E: DomainEvent>(
        aggregate_id: impl fmt::Display,
        event: &E,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let payload = serde_json::to_value(event).map_err(|e| DomainError::EventEncoding {
            event_type: event.event_type().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            event_id: Uuid::new_v4(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event.event_type().to_string(),
            occurred_at,
            payload,
        })
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Pending events held by an aggregate until it is saved.
///
/// Embed with `#[serde(skip)]`; events are not part of the stored state.
#[derive(Debug, Clone, Default)]
pub struct PendingEvents {
    events: Vec<EventEnvelope>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: EventEnvelope) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn take(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.events)
    }
}
