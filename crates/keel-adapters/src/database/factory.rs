//! Lazily built, shared persistence engine.

use std::{fmt, sync::Arc};

use keel_core::{application::EngineKind, error::KeelResult};
use once_cell::sync::OnceCell;

use super::{EngineHandle, UnitOfWorkFactory};
use crate::{logging::Logger, registry::BackendRegistry, settings::Settings};

/// Builds the engine for the selected environment on first use and hands
/// out the same handle afterwards.
///
/// A failed build is not cached; the next call tries again.
pub struct DatabaseFactory {
    settings: Arc<Settings>,
    registry: BackendRegistry,
    logger: Logger,
    engine: OnceCell<EngineHandle>,
}

impl DatabaseFactory {
    pub fn new(settings: Arc<Settings>, registry: BackendRegistry, logger: Logger) -> Self {
        Self {
            settings,
            registry,
            logger,
            engine: OnceCell::new(),
        }
    }

    /// Use a prebuilt engine instead of constructing one from settings.
    pub fn with_engine(
        settings: Arc<Settings>,
        registry: BackendRegistry,
        logger: Logger,
        engine: EngineHandle,
    ) -> Self {
        Self {
            settings,
            registry,
            logger,
            engine: OnceCell::with_value(engine),
        }
    }

    /// The engine kind this factory produces.
    pub fn kind(&self) -> EngineKind {
        match self.engine.get() {
            Some(engine) => engine.kind(),
            None => self.settings.selection().engine,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }

    /// Get the shared engine, building it on first call.
    pub fn get_engine(&self) -> KeelResult<EngineHandle> {
        self.engine
            .get_or_try_init(|| {
                let kind = self.settings.selection().engine;
                let construct = self.registry.engine(kind)?;
                let engine = construct(&self.settings).inspect_err(|e| {
                    self.logger
                        .error(format!("Could not build {kind} engine: {e}"));
                })?;
                self.logger.info(format!(
                    "Using {} engine at {} for {}",
                    engine.kind(),
                    engine.location(),
                    self.settings.environment
                ));
                Ok(engine)
            })
            .cloned()
    }

    pub fn unit_of_work_factory(&self) -> KeelResult<UnitOfWorkFactory> {
        self.get_engine().map(UnitOfWorkFactory::new)
    }
}

impl fmt::Debug for DatabaseFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseFactory")
            .field("kind", &self.kind())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
