//! Dependency injection container.
//!
//! A [`Container`] is the one explicit context object of a process (or a
//! test). It owns the settings, the backend selection, the root logger, the
//! lazily built engine, a table of application service providers keyed
//! by type, and the [`Mediator`] routing commands and queries to handlers
//! built from that table.
//!
//! The standard services are registered on build: the root [`Logger`]
//! (singleton), the [`EngineHandle`] (singleton) and the
//! [`UnitOfWorkFactory`] (factory).
//!
//! ```no_run
//! use keel_adapters::container::build_container;
//! use keel_adapters::settings::Settings;
//!
//! # fn main() -> keel_core::error::KeelResult<()> {
//! let container = build_container(Settings::from_env()?)?;
//! let mut uow = container.unit_of_work()?;
//! uow.put("users", "42", serde_json::json!({ "name": "ada" }));
//! uow.commit()?;
//! # Ok(())
//! # }
//! ```

use std::{
    any::{Any, TypeId, type_name},
    cell::RefCell,
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use keel_core::{
    application::{
        ApplicationError, BackendSelection, Command, CommandHandler, Mediator, Query,
        QueryHandler,
    },
    error::{KeelError, KeelResult},
};
use once_cell::sync::OnceCell;

use crate::{
    database::{DatabaseFactory, EngineHandle, UnitOfWork, UnitOfWorkFactory},
    logging::{LogTarget, Logger, LoggerFactory, SinkOptions, TelemetryExporter},
    registry::BackendRegistry,
    settings::Settings,
};

type Service = Arc<dyn Any + Send + Sync>;
type ProviderFn = Arc<dyn Fn(&Container) -> KeelResult<Service> + Send + Sync>;
type WireFn = Box<dyn FnOnce(&Container) -> KeelResult<()>>;

#[derive(Clone)]
enum ErasedProvider {
    Singleton {
        init: ProviderFn,
        instance: Arc<OnceCell<Service>>,
    },
    Factory(ProviderFn),
    Instance(Service),
}

impl ErasedProvider {
    fn provide(&self, container: &Container) -> KeelResult<Service> {
        match self {
            Self::Singleton { init, instance } => {
                instance.get_or_try_init(|| init(container)).cloned()
            }
            Self::Factory(make) => make(container),
            Self::Instance(service) => Ok(Arc::clone(service)),
        }
    }
}

/// Registered provider for one type plus the overrides stacked on it.
#[derive(Default)]
struct ServiceSlot {
    registered: Option<ErasedProvider>,
    /// Innermost override last, tagged with its guard's token.
    overrides: Vec<(u64, ErasedProvider)>,
}

impl ServiceSlot {
    fn active(&self) -> Option<&ErasedProvider> {
        self.overrides
            .last()
            .map(|(_, provider)| provider)
            .or(self.registered.as_ref())
    }

    fn is_empty(&self) -> bool {
        self.registered.is_none() && self.overrides.is_empty()
    }
}

thread_local! {
    /// (container, type) pairs being resolved on this thread, outermost first.
    static RESOLVING: RefCell<Vec<(usize, TypeId, &'static str)>> = const { RefCell::new(Vec::new()) };
}

/// Marks one type as under resolution until dropped.
struct ResolutionFrame;

impl ResolutionFrame {
    fn enter(container: usize, type_id: TypeId, name: &'static str) -> KeelResult<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack
                .iter()
                .position(|(c, id, _)| *c == container && *id == type_id)
            {
                let chain = stack[start..]
                    .iter()
                    .map(|(_, _, name)| *name)
                    .chain(std::iter::once(name))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(ApplicationError::CyclicDependency {
                    type_name: name,
                    chain,
                }
                .into());
            }
            stack.push((container, type_id, name));
            Ok(Self)
        })
    }
}

impl Drop for ResolutionFrame {
    fn drop(&mut self) {
        let _ = RESOLVING.try_with(|stack| stack.borrow_mut().pop());
    }
}

/// How to obtain a `T`.
pub struct Provider<T> {
    inner: ErasedProvider,
    _type: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Provider<T> {
    /// Built on first resolve, shared afterwards.
    pub fn singleton<F>(make: F) -> Self
    where
        F: Fn(&Container) -> KeelResult<T> + Send + Sync + 'static,
    {
        Self::erased(ErasedProvider::Singleton {
            init: erase(make),
            instance: Arc::new(OnceCell::new()),
        })
    }

    /// Built anew on every resolve.
    pub fn factory<F>(make: F) -> Self
    where
        F: Fn(&Container) -> KeelResult<T> + Send + Sync + 'static,
    {
        Self::erased(ErasedProvider::Factory(erase(make)))
    }

    /// Always this value.
    pub fn instance(value: T) -> Self {
        Self::erased(ErasedProvider::Instance(Arc::new(value)))
    }

    fn erased(inner: ErasedProvider) -> Self {
        Self {
            inner,
            _type: PhantomData,
        }
    }
}

fn erase<T, F>(make: F) -> ProviderFn
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> KeelResult<T> + Send + Sync + 'static,
{
    Arc::new(move |container| make(container).map(|value| Arc::new(value) as Service))
}

/// Withdraws the override installed by [`Container::override_service`]
/// when dropped.
///
/// Overrides of one type stack; dropping a guard removes only its own
/// entry, whatever the drop order.
#[must_use = "the override is undone as soon as the guard is dropped"]
pub struct OverrideGuard<'c> {
    container: &'c Container,
    type_id: TypeId,
    type_name: &'static str,
    token: u64,
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        let mut services = self
            .container
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = services.get_mut(&self.type_id) {
            slot.overrides.retain(|(token, _)| *token != self.token);
            if slot.is_empty() {
                services.remove(&self.type_id);
            }
        }
        tracing::debug!(service = self.type_name, "Service override withdrawn");
    }
}

// ── Container ────────────────────────────────────────────────────────────────

pub struct Container {
    settings: Arc<Settings>,
    selection: BackendSelection,
    loggers: LoggerFactory,
    database: DatabaseFactory,
    services: RwLock<HashMap<TypeId, ServiceSlot>>,
    next_override: AtomicU64,
    mediator: Mediator<Container>,
}

/// Build a container with the standard backends.
///
/// Fails only on configuration problems; the engine itself is built on
/// first use.
pub fn build_container(settings: Settings) -> KeelResult<Container> {
    Container::builder(settings).build()
}

impl Container {
    pub fn builder(settings: Settings) -> ContainerBuilder {
        ContainerBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn selection(&self) -> BackendSelection {
        self.selection
    }

    /// The shared engine, built on first call.
    pub fn engine(&self) -> KeelResult<EngineHandle> {
        self.database.get_engine()
    }

    pub fn database(&self) -> &DatabaseFactory {
        &self.database
    }

    pub fn unit_of_work_factory(&self) -> KeelResult<UnitOfWorkFactory> {
        self.database.unit_of_work_factory()
    }

    /// Open a new unit of work on the shared engine.
    pub fn unit_of_work(&self) -> KeelResult<UnitOfWork> {
        UnitOfWork::begin(self.engine()?)
    }

    pub fn root_logger(&self) -> &Logger {
        self.loggers.root()
    }

    pub fn logger(&self, name: &str) -> Logger {
        self.loggers.get_logger(name)
    }

    pub fn register_singleton<T, F>(&self, make: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> KeelResult<T> + Send + Sync + 'static,
    {
        self.register(Provider::singleton(make));
    }

    pub fn register_factory<T, F>(&self, make: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> KeelResult<T> + Send + Sync + 'static,
    {
        self.register(Provider::factory(make));
    }

    pub fn register_instance<T: Send + Sync + 'static>(&self, value: T) {
        self.register(Provider::instance(value));
    }

    /// Install `provider` for `T`, replacing any previous registration.
    /// Active overrides keep precedence until their guards drop.
    pub fn register<T: Send + Sync + 'static>(&self, provider: Provider<T>) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<T>())
            .or_default()
            .registered = Some(provider.inner);
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .is_some_and(|slot| !slot.is_empty())
    }

    /// Get a `T` from its provider.
    ///
    /// A provider that ends up resolving its own type again fails with
    /// [`ApplicationError::CyclicDependency`].
    pub fn resolve<T: Send + Sync + 'static>(&self) -> KeelResult<Arc<T>> {
        // Clone the provider out so it can resolve its own dependencies.
        let provider = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .and_then(ServiceSlot::active)
            .cloned()
            .ok_or(ApplicationError::UnregisteredDependency {
                type_name: type_name::<T>(),
            })?;

        let _frame = ResolutionFrame::enter(self.address(), TypeId::of::<T>(), type_name::<T>())?;
        provider
            .provide(self)?
            .downcast::<T>()
            .map_err(|_| KeelError::Internal {
                message: format!("provider for {} produced another type", type_name::<T>()),
            })
    }

    /// Put `provider` in front of the registered one for `T` until the
    /// guard is dropped.
    pub fn override_service<T: Send + Sync + 'static>(
        &self,
        provider: Provider<T>,
    ) -> OverrideGuard<'_> {
        let type_id = TypeId::of::<T>();
        let token = self.next_override.fetch_add(1, Ordering::Relaxed);
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(type_id)
            .or_default()
            .overrides
            .push((token, provider.inner));

        tracing::debug!(service = type_name::<T>(), "Service overridden");
        OverrideGuard {
            container: self,
            type_id,
            type_name: type_name::<T>(),
            token,
        }
    }

    // ── Commands and queries ─────────────────────────────────────────────

    pub fn mediator(&self) -> &Mediator<Container> {
        &self.mediator
    }

    /// Register `H` as a factory service and route `C` to it.
    ///
    /// The handler is resolved on every dispatch, so an override of `H`
    /// applies to commands sent while it is active.
    pub fn register_command_handler<C, H, F>(&self, make: F)
    where
        C: Command,
        H: CommandHandler<C> + 'static,
        F: Fn(&Container) -> KeelResult<H> + Send + Sync + 'static,
    {
        self.register_factory(make);
        self.mediator
            .register_command::<C, _>(|container: &Container| {
                let handler: Arc<dyn CommandHandler<C>> = container.resolve::<H>()?;
                Ok(handler)
            });
    }

    /// Register `H` as a factory service and route `Q` to it.
    pub fn register_query_handler<Q, H, F>(&self, make: F)
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
        F: Fn(&Container) -> KeelResult<H> + Send + Sync + 'static,
    {
        self.register_factory(make);
        self.mediator.register_query::<Q, _>(|container: &Container| {
            let handler: Arc<dyn QueryHandler<Q>> = container.resolve::<H>()?;
            Ok(handler)
        });
    }

    pub fn send<C: Command>(&self, command: C) -> KeelResult<C::Output> {
        self.mediator.send(self, command)
    }

    pub fn query<Q: Query>(&self, query: Q) -> KeelResult<Q::Output> {
        self.mediator.query(self, query)
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    fn register_standard_services(&self) {
        let root = self.root_logger().clone();
        self.register_singleton(move |_| Ok(root.clone()));
        self.register_singleton(|c: &Container| c.engine());
        self.register_factory(|c: &Container| c.unit_of_work_factory());
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services = self
            .services
            .read()
            .map(|services| services.len())
            .unwrap_or_default();
        f.debug_struct("Container")
            .field("selection", &self.selection)
            .field("database", &self.database)
            .field("logger", self.loggers.root())
            .field("services", &services)
            .field("mediator", &self.mediator)
            .finish()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Wiring options for a [`Container`].
pub struct ContainerBuilder {
    settings: Settings,
    registry: BackendRegistry,
    engine: Option<EngineHandle>,
    sink: SinkOptions,
    wiring: Vec<WireFn>,
}

impl ContainerBuilder {
    fn new(settings: Settings) -> Self {
        Self {
            settings,
            registry: BackendRegistry::standard(),
            engine: None,
            sink: SinkOptions::default(),
            wiring: Vec::new(),
        }
    }

    /// Use these backend constructors instead of the standard ones.
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a prebuilt engine; the selected engine kind is not constructed.
    pub fn engine(mut self, engine: EngineHandle) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn log_target(mut self, target: LogTarget) -> Self {
        self.sink.target = target;
        self
    }

    /// Force colored output on or off.
    pub fn ansi(mut self, enabled: bool) -> Self {
        self.sink.ansi = Some(enabled);
        self
    }

    pub fn telemetry_exporter(mut self, exporter: Arc<dyn TelemetryExporter>) -> Self {
        self.sink.exporter = Some(exporter);
        self
    }

    pub fn telemetry_batch_size(mut self, batch_size: usize) -> Self {
        self.sink.batch_size = batch_size;
        self
    }

    /// Run `wire` on the finished container, after the standard services
    /// are registered. Services and handlers are registered here.
    pub fn wire<F>(mut self, wire: F) -> Self
    where
        F: FnOnce(&Container) -> KeelResult<()> + 'static,
    {
        self.wiring.push(Box::new(wire));
        self
    }

    pub fn build(self) -> KeelResult<Container> {
        let settings = Arc::new(self.settings);
        let selection = settings.selection();

        let loggers = LoggerFactory::new(&settings, &self.registry, &self.sink)?;
        let root = loggers.root();
        if settings.environment_defaulted {
            root.warn(format!(
                "APP_ENV is not set, defaulting to '{}'",
                settings.environment
            ));
        }
        root.debug(format!("Container wired for {selection}"));

        let db_logger = root.child("database");
        let database = match self.engine {
            Some(engine) => {
                DatabaseFactory::with_engine(Arc::clone(&settings), self.registry, db_logger, engine)
            }
            None => DatabaseFactory::new(Arc::clone(&settings), self.registry, db_logger),
        };

        let container = Container {
            settings,
            selection,
            loggers,
            database,
            services: RwLock::new(HashMap::new()),
            next_override: AtomicU64::new(0),
            mediator: Mediator::new(),
        };
        container.register_standard_services();
        for wire in self.wiring {
            wire(&container)?;
        }
        Ok(container)
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .field("sink", &self.sink)
            .field("wiring", &self.wiring.len())
            .finish()
    }
}
