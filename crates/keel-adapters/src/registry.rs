//! Backend registry: which constructor builds each engine and log sink.
//!
//! The standard registry covers every [`EngineKind`] and [`LogBackend`].
//! Tests and embedders can replace single entries, e.g. to point the
//! `remote` engine at an in-process fake.

use std::{collections::HashMap, fmt, sync::Arc};

use keel_core::{
    application::{EngineKind, LogBackend},
    error::{KeelError, KeelResult},
};

use crate::{
    database::{EngineHandle, FileEngine, MemoryEngine, RemoteEngine},
    logging::{self, LogSink, SinkOptions},
    settings::{LogSettings, Settings},
};

pub type EngineConstructor = fn(&Settings) -> KeelResult<EngineHandle>;
pub type SinkConstructor = fn(&LogSettings, &SinkOptions) -> KeelResult<LogSink>;

#[derive(Clone)]
pub struct BackendRegistry {
    engines: HashMap<EngineKind, EngineConstructor>,
    sinks: HashMap<LogBackend, SinkConstructor>,
}

impl BackendRegistry {
    /// Registry without any entries.
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
            sinks: HashMap::new(),
        }
    }

    /// Registry with the built-in backends.
    pub fn standard() -> Self {
        Self::empty()
            .with_engine(EngineKind::Memory, memory_engine)
            .with_engine(EngineKind::File, file_engine)
            .with_engine(EngineKind::Remote, remote_engine)
            .with_sink(LogBackend::Simple, logging::simple_sink)
            .with_sink(LogBackend::Console, logging::console_sink)
            .with_sink(LogBackend::Telemetry, logging::telemetry_sink)
    }

    pub fn with_engine(mut self, kind: EngineKind, construct: EngineConstructor) -> Self {
        self.engines.insert(kind, construct);
        self
    }

    pub fn with_sink(mut self, backend: LogBackend, construct: SinkConstructor) -> Self {
        self.sinks.insert(backend, construct);
        self
    }

    pub fn engine(&self, kind: EngineKind) -> KeelResult<EngineConstructor> {
        self.engines.get(&kind).copied().ok_or_else(|| {
            KeelError::configuration(format!("no constructor registered for the {kind} engine"))
        })
    }

    pub fn sink(&self, backend: LogBackend) -> KeelResult<SinkConstructor> {
        self.sinks.get(&backend).copied().ok_or_else(|| {
            KeelError::configuration(format!("no constructor registered for the {backend} log sink"))
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut engines: Vec<_> = self.engines.keys().map(EngineKind::as_str).collect();
        let mut sinks: Vec<_> = self.sinks.keys().map(LogBackend::as_str).collect();
        engines.sort_unstable();
        sinks.sort_unstable();
        f.debug_struct("BackendRegistry")
            .field("engines", &engines)
            .field("sinks", &sinks)
            .finish()
    }
}

fn memory_engine(_: &Settings) -> KeelResult<EngineHandle> {
    Ok(Arc::new(MemoryEngine::new()))
}

fn file_engine(settings: &Settings) -> KeelResult<EngineHandle> {
    Ok(Arc::new(FileEngine::open(&settings.database.dev_path)?))
}

fn remote_engine(settings: &Settings) -> KeelResult<EngineHandle> {
    let environment = settings.environment;
    let remote = settings.database.remote(environment).ok_or_else(|| {
        KeelError::ConnectionConfiguration {
            environment: environment.to_string(),
            reason: "no remote database is configured for this environment".into(),
        }
    })?;
    Ok(Arc::new(RemoteEngine::connect(
        environment,
        remote,
        settings.database.timeout,
    )?))
}
