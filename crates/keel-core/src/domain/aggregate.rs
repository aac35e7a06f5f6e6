//! Aggregate roots and the repository port.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ApplicationError;
use crate::domain::entity::Entity;
use crate::domain::error::DomainError;
use crate::domain::event::EventEnvelope;
use crate::error::KeelResult;

/// Entry point of a consistency boundary.
///
/// The only kind of object a [`Repository`] loads or saves. An aggregate
/// guards the invariants of everything it owns; repositories call
/// [`check_invariants`](Self::check_invariants) before every save.
pub trait AggregateRoot: Entity + Serialize + DeserializeOwned {
    /// Storage collection the aggregate lives in.
    const COLLECTION: &'static str;

    /// Validate the rules spanning the whole cluster.
    fn check_invariants(&self) -> Result<(), DomainError> {
        Ok(())
    }

    /// Drain events raised since the last save.
    fn take_events(&mut self) -> Vec<EventEnvelope> {
        Vec::new()
    }
}

/// Port for loading and saving aggregates.
///
/// Implementations live in infrastructure; see
/// `keel_adapters::database::DocumentRepository`.
pub trait Repository<A: AggregateRoot> {
    /// Load by id; `Ok(None)` if absent.
    fn get(&self, id: &A::Id) -> KeelResult<Option<A>>;

    /// Insert or replace, draining the aggregate's pending events.
    fn save(&mut self, aggregate: &mut A) -> KeelResult<()>;

    /// Remove by id; `Ok(false)` if it did not exist.
    fn delete(&mut self, id: &A::Id) -> KeelResult<bool>;

    /// Load by id or fail with `NotFound`.
    fn require(&self, id: &A::Id) -> KeelResult<A> {
        self.get(id)?.ok_or_else(|| {
            ApplicationError::NotFound {
                collection: A::COLLECTION.to_string(),
                id: id.to_string(),
            }
            .into()
        })
    }
}
