//! Aggregate repository over a unit of work.

use std::marker::PhantomData;

use keel_core::{
    application::ApplicationError,
    domain::{AggregateRoot, Repository},
    error::KeelResult,
};

use super::UnitOfWork;

/// Stores aggregates of type `A` as JSON documents in `A::COLLECTION`,
/// keyed by the aggregate id.
///
/// Writes are staged in the borrowed unit of work; events drained from a
/// saved aggregate are held there until commit.
pub struct DocumentRepository<'u, A> {
    uow: &'u mut UnitOfWork,
    _aggregate: PhantomData<fn() -> A>,
}

impl<'u, A: AggregateRoot> DocumentRepository<'u, A> {
    pub fn new(uow: &'u mut UnitOfWork) -> Self {
        Self {
            uow,
            _aggregate: PhantomData,
        }
    }
}

impl<A: AggregateRoot> Repository<A> for DocumentRepository<'_, A> {
    fn get(&self, id: &A::Id) -> KeelResult<Option<A>> {
        let id = id.to_string();
        let Some(doc) = self.uow.get(A::COLLECTION, &id)? else {
            return Ok(None);
        };

        serde_json::from_value(doc).map(Some).map_err(|e| {
            ApplicationError::MalformedDocument {
                collection: A::COLLECTION.to_string(),
                id,
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn save(&mut self, aggregate: &mut A) -> KeelResult<()> {
        aggregate.check_invariants()?;

        let id = aggregate.id().to_string();
        let doc = serde_json::to_value(&*aggregate).map_err(|e| {
            ApplicationError::MalformedDocument {
                collection: A::COLLECTION.to_string(),
                id: id.clone(),
                reason: e.to_string(),
            }
        })?;

        self.uow.put(A::COLLECTION, &id, doc);
        self.uow.record_events(aggregate.take_events());
        tracing::debug!(collection = A::COLLECTION, %id, "Aggregate staged");
        Ok(())
    }

    fn delete(&mut self, id: &A::Id) -> KeelResult<bool> {
        let id = id.to_string();
        let existed = self.uow.get(A::COLLECTION, &id)?.is_some();
        if existed {
            self.uow.delete(A::COLLECTION, &id);
        }
        Ok(existed)
    }
}
