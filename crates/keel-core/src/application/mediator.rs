//! Command and query dispatch.
//!
//! The [`Mediator`] maps each request type to a handler factory. Handlers
//! are built per dispatch from a context `Ctx` (in practice the DI
//! container), so they pick up whatever their providers currently yield,
//! test overrides included.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{
    application::{
        ApplicationError,
        ports::{Command, CommandHandler, Query, QueryHandler},
    },
    error::{KeelError, KeelResult},
};

type CommandFactory<Ctx, C> =
    Arc<dyn Fn(&Ctx) -> KeelResult<Arc<dyn CommandHandler<C>>> + Send + Sync>;
type QueryFactory<Ctx, Q> = Arc<dyn Fn(&Ctx) -> KeelResult<Arc<dyn QueryHandler<Q>>> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    request: &'static str,
    factory: Arc<dyn Any + Send + Sync>,
}

type Registrations = RwLock<HashMap<TypeId, Registration>>;

/// Routes commands and queries to their single registered handler.
pub struct Mediator<Ctx: 'static> {
    commands: Registrations,
    queries: Registrations,
    _context: PhantomData<fn(&Ctx)>,
}

impl<Ctx: 'static> Mediator<Ctx> {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            queries: RwLock::new(HashMap::new()),
            _context: PhantomData,
        }
    }

    /// Route `C` to the handler `make` builds. Replaces any previous route.
    pub fn register_command<C, F>(&self, make: F)
    where
        C: Command,
        F: Fn(&Ctx) -> KeelResult<Arc<dyn CommandHandler<C>>> + Send + Sync + 'static,
    {
        let factory: CommandFactory<Ctx, C> = Arc::new(make);
        insert::<C>(&self.commands, Arc::new(factory));
    }

    /// Route `Q` to the handler `make` builds. Replaces any previous route.
    pub fn register_query<Q, F>(&self, make: F)
    where
        Q: Query,
        F: Fn(&Ctx) -> KeelResult<Arc<dyn QueryHandler<Q>>> + Send + Sync + 'static,
    {
        let factory: QueryFactory<Ctx, Q> = Arc::new(make);
        insert::<Q>(&self.queries, Arc::new(factory));
    }

    pub fn handles_command<C: Command>(&self) -> bool {
        contains::<C>(&self.commands)
    }

    pub fn handles_query<Q: Query>(&self) -> bool {
        contains::<Q>(&self.queries)
    }

    /// Build the handler for `C` and run it.
    pub fn send<C: Command>(&self, context: &Ctx, command: C) -> KeelResult<C::Output> {
        let make: CommandFactory<Ctx, C> = lookup::<C, _>(&self.commands, "command")?;
        let handler = make(context)?;
        tracing::debug!(command = type_name::<C>(), "Dispatching command");
        handler.handle(command)
    }

    /// Build the handler for `Q` and run it.
    pub fn query<Q: Query>(&self, context: &Ctx, query: Q) -> KeelResult<Q::Output> {
        let make: QueryFactory<Ctx, Q> = lookup::<Q, _>(&self.queries, "query")?;
        let handler = make(context)?;
        tracing::debug!(query = type_name::<Q>(), "Dispatching query");
        handler.handle(query)
    }
}

impl<Ctx: 'static> Default for Mediator<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx: 'static> fmt::Debug for Mediator<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("commands", &names(&self.commands))
            .field("queries", &names(&self.queries))
            .finish()
    }
}

fn insert<R: 'static>(table: &Registrations, factory: Arc<dyn Any + Send + Sync>) {
    table.write().unwrap_or_else(PoisonError::into_inner).insert(
        TypeId::of::<R>(),
        Registration {
            request: type_name::<R>(),
            factory,
        },
    );
}

fn contains<R: 'static>(table: &Registrations) -> bool {
    table
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&TypeId::of::<R>())
}

fn lookup<R: 'static, F: Clone + 'static>(table: &Registrations, kind: &'static str) -> KeelResult<F> {
    // Clone out so the handler factory runs without the table locked.
    let registration = table
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&TypeId::of::<R>())
        .cloned()
        .ok_or(ApplicationError::UnhandledRequest {
            kind,
            request: type_name::<R>(),
        })?;

    registration
        .factory
        .downcast_ref::<F>()
        .cloned()
        .ok_or_else(|| KeelError::Internal {
            message: format!("{kind} route for {} has the wrong shape", registration.request),
        })
}

fn names(table: &Registrations) -> Vec<&'static str> {
    let mut names: Vec<_> = table
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .map(|registration| registration.request)
        .collect();
    names.sort_unstable();
    names
}
