//! Transactional scope over the persistence engine.
//!
//! A [`UnitOfWork`] stages writes in a [`ChangeSet`] and holds domain events
//! raised by saved aggregates. Nothing reaches the engine until
//! [`UnitOfWork::commit`], which applies the whole set at once and hands the
//! events back. Any other way out of the scope (explicit rollback, an early
//! `?` return, a panic unwinding through it) discards both.
//!
//! Only one unit of work may be open per thread and engine at a time.
//! Opening a second one on the same thread fails with
//! [`ApplicationError::Reentrancy`] instead of silently nesting; concurrent
//! scopes on other threads are independent.

use std::{
    cell::RefCell,
    collections::HashSet,
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use keel_core::{
    application::{ApplicationError, ChangeSet, DocumentKey},
    domain::{AggregateRoot, EventEnvelope},
    error::KeelResult,
};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DocumentRepository, EngineHandle};

thread_local! {
    static OPEN_SCOPES: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

fn scope_key(engine: &EngineHandle) -> usize {
    Arc::as_ptr(engine).cast::<()>() as usize
}

/// Hands out units of work bound to one engine.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    engine: EngineHandle,
}

impl UnitOfWorkFactory {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Open a new scope.
    pub fn begin(&self) -> KeelResult<UnitOfWork> {
        UnitOfWork::begin(self.engine.clone())
    }

    /// Run `work` inside a fresh scope.
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err`.
    /// Events recorded during the scope are returned next to the value.
    pub fn run<T, F>(&self, work: F) -> KeelResult<(T, Vec<EventEnvelope>)>
    where
        F: FnOnce(&mut UnitOfWork) -> KeelResult<T>,
    {
        let mut uow = self.begin()?;
        match work(&mut uow) {
            Ok(value) => {
                let events = uow.commit()?;
                Ok((value, events))
            }
            Err(e) => {
                uow.rollback();
                Err(e)
            }
        }
    }
}

impl fmt::Debug for UnitOfWorkFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkFactory")
            .field("engine", &self.engine.kind())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeState {
    Active,
    Committed,
    RolledBack,
}

/// One open transactional scope.
///
/// Not `Send`: a scope belongs to the thread that opened it.
pub struct UnitOfWork {
    id: Uuid,
    engine: EngineHandle,
    changes: ChangeSet,
    events: Vec<EventEnvelope>,
    state: ScopeState,
    _thread_bound: PhantomData<*const ()>,
}

impl UnitOfWork {
    /// Open a scope on `engine`.
    pub fn begin(engine: EngineHandle) -> KeelResult<Self> {
        let key = scope_key(&engine);
        let opened = OPEN_SCOPES.with(|open| open.borrow_mut().insert(key));
        if !opened {
            return Err(ApplicationError::Reentrancy.into());
        }

        let id = Uuid::new_v4();
        debug!(unit_of_work = %id, engine = %engine.kind(), "Unit of work started");

        Ok(Self {
            id,
            engine,
            changes: ChangeSet::new(),
            events: Vec::new(),
            state: ScopeState::Active,
            _thread_bound: PhantomData,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Read a document, seeing this scope's own staged writes first.
    pub fn get(&self, collection: &str, id: &str) -> KeelResult<Option<Value>> {
        let key = DocumentKey::new(collection, id);
        match self.changes.staged(&key) {
            Some(staged) => Ok(staged.cloned()),
            None => self.engine.load(&key),
        }
    }

    /// Stage an insert-or-replace.
    pub fn put(&mut self, collection: &str, id: &str, doc: Value) {
        self.changes.put(DocumentKey::new(collection, id), doc);
    }

    /// Stage a removal.
    pub fn delete(&mut self, collection: &str, id: &str) {
        self.changes.delete(DocumentKey::new(collection, id));
    }

    /// Hold events until commit.
    pub fn record_events(&mut self, events: impl IntoIterator<Item = EventEnvelope>) {
        self.events.extend(events);
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    pub fn pending_events(&self) -> &[EventEnvelope] {
        &self.events
    }

    /// Repository for aggregate `A` writing through this scope.
    pub fn repository<A: AggregateRoot>(&mut self) -> DocumentRepository<'_, A> {
        DocumentRepository::new(self)
    }

    /// Apply every staged change and release the recorded events.
    ///
    /// If the engine rejects the change set, nothing is applied, the scope
    /// is rolled back, and the events are dropped.
    pub fn commit(mut self) -> KeelResult<Vec<EventEnvelope>> {
        match self.engine.apply(&self.changes) {
            Ok(()) => {
                info!(
                    unit_of_work = %self.id,
                    changes = self.changes.len(),
                    events = self.events.len(),
                    "Unit of work committed"
                );
                self.state = ScopeState::Committed;
                self.changes.clear();
                Ok(std::mem::take(&mut self.events))
            }
            Err(e) => {
                warn!(unit_of_work = %self.id, error = %e, "Commit failed, rolling back");
                self.discard();
                Err(e)
            }
        }
    }

    /// Discard every staged change and recorded event.
    pub fn rollback(mut self) {
        debug!(
            unit_of_work = %self.id,
            changes = self.changes.len(),
            "Unit of work rolled back"
        );
        self.discard();
    }

    fn discard(&mut self) {
        self.changes.clear();
        self.events.clear();
        self.state = ScopeState::RolledBack;
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.state == ScopeState::Active {
            if !self.changes.is_empty() || !self.events.is_empty() {
                warn!(
                    unit_of_work = %self.id,
                    changes = self.changes.len(),
                    events = self.events.len(),
                    "Unit of work dropped without commit, discarding staged changes"
                );
            }
            self.discard();
        }

        let key = scope_key(&self.engine);
        // Thread-local storage may already be gone during thread teardown.
        let _ = OPEN_SCOPES.try_with(|open| open.borrow_mut().remove(&key));
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("engine", &self.engine.kind())
            .field("pending_changes", &self.changes.len())
            .field("pending_events", &self.events.len())
            .field("state", &self.state)
            .finish()
    }
}
