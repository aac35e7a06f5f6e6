//! Logger factory and log sinks.
//!
//! Each container owns one root [`Logger`] built from the selected
//! [`LogBackend`]. A logger is a name plus a `tracing` [`Dispatch`]; nothing
//! here installs a global subscriber unless
//! [`Logger::install_global`] is called, so several containers (and
//! several tests) can log side by side.
//!
//! | Backend     | Output                                                  |
//! |-------------|---------------------------------------------------------|
//! | `simple`    | plain single-line text                                  |
//! | `console`   | colored text on a terminal, optional `LOG_FILE` copy    |
//! | `telemetry` | batched JSON to an HTTP intake, local text on fallback  |

use std::{
    fmt,
    io::{self, IsTerminal, Write},
    sync::{Arc, Mutex, PoisonError},
};

use keel_core::{
    application::LogBackend,
    error::{KeelError, KeelResult},
};
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::{MakeWriter, writer::BoxMakeWriter};

use crate::{registry::BackendRegistry, settings::Settings};

mod sinks;
pub mod telemetry;

pub use sinks::{console_sink, simple_sink, telemetry_sink};
pub use telemetry::{
    HttpExporter, TelemetryError, TelemetryExporter, TelemetryLayer, TelemetryPipeline,
    TelemetryRecord,
};

/// Name of the span [`Logger::in_scope`] opens.
pub const LOGGER_SPAN: &str = "logger";

// ── Targets ──────────────────────────────────────────────────────────────────

/// Where local output goes.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    #[default]
    Stderr,
    /// In-memory capture, for tests.
    Buffer(SharedBuffer),
}

impl LogTarget {
    pub(crate) fn make_writer(&self) -> BoxMakeWriter {
        match self {
            Self::Stderr => BoxMakeWriter::new(io::stderr),
            Self::Buffer(buffer) => BoxMakeWriter::new(buffer.clone()),
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Self::Stderr) && io::stderr().is_terminal()
    }

    pub(crate) fn write_line(&self, line: &str) {
        match self {
            Self::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{line}");
            }
            Self::Buffer(buffer) => buffer.append(line),
        }
    }
}

/// Cloneable byte buffer usable as a `tracing` writer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn append(&self, line: &str) {
        let mut bytes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
}

pub struct BufferWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ── Sinks ────────────────────────────────────────────────────────────────────

/// A built sink: the dispatch events go through, plus the telemetry
/// pipeline when there is one to flush.
pub struct LogSink {
    dispatch: Dispatch,
    telemetry: Option<Arc<TelemetryPipeline>>,
}

impl LogSink {
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            telemetry: None,
        }
    }

    pub fn with_telemetry(dispatch: Dispatch, pipeline: Arc<TelemetryPipeline>) -> Self {
        Self {
            dispatch,
            telemetry: Some(pipeline),
        }
    }
}

/// Process-level knobs every sink constructor receives.
#[derive(Clone)]
pub struct SinkOptions {
    pub target: LogTarget,
    /// `Some(false)` forces plain output, e.g. for `--no-color`.
    pub ansi: Option<bool>,
    /// Replaces the HTTP exporter of the telemetry sink.
    pub exporter: Option<Arc<dyn TelemetryExporter>>,
    pub batch_size: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            target: LogTarget::Stderr,
            ansi: None,
            exporter: None,
            batch_size: telemetry::DEFAULT_BATCH_SIZE,
        }
    }
}

impl fmt::Debug for SinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkOptions")
            .field("target", &self.target)
            .field("ansi", &self.ansi)
            .field("custom_exporter", &self.exporter.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

// ── Logger ───────────────────────────────────────────────────────────────────

/// Named handle onto a sink.
///
/// Cheap to clone; children share the parent's sink.
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    backend: LogBackend,
    dispatch: Dispatch,
    telemetry: Option<Arc<TelemetryPipeline>>,
}

impl Logger {
    pub fn new(name: impl Into<String>, backend: LogBackend, sink: LogSink) -> Self {
        Self {
            name: Arc::from(name.into()),
            backend,
            dispatch: sink.dispatch,
            telemetry: sink.telemetry,
        }
    }

    /// A `simple` logger at `info` writing to `target`.
    pub fn plain(name: impl Into<String>, target: LogTarget) -> Self {
        Self::new(name, LogBackend::Simple, sinks::plain_sink(target))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> LogBackend {
        self.backend
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Logger named `<self>.<name>` on the same sink.
    pub fn child(&self, name: &str) -> Self {
        let name = name.trim_matches('.');
        let full = if name.is_empty() {
            Arc::clone(&self.name)
        } else if self.name.is_empty() {
            Arc::from(name)
        } else {
            Arc::from(format!("{}.{}", self.name, name))
        };

        Self {
            name: full,
            ..self.clone()
        }
    }

    /// Run `f` with this logger's sink as the current dispatcher, inside a
    /// span carrying the logger name.
    ///
    /// Plain `tracing` macros used inside `f` end up in this sink.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let span = tracing::info_span!(LOGGER_SPAN, name = %self.name);
            span.in_scope(f)
        })
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.emit(Level::DEBUG, &message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.emit(Level::INFO, &message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.emit(Level::WARN, &message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.emit(Level::ERROR, &message);
    }

    fn emit(&self, level: Level, message: &dyn fmt::Display) {
        let logger: &str = &self.name;
        tracing::dispatcher::with_default(&self.dispatch, || {
            if level == Level::ERROR {
                tracing::error!(logger, "{message}");
            } else if level == Level::WARN {
                tracing::warn!(logger, "{message}");
            } else if level == Level::INFO {
                tracing::info!(logger, "{message}");
            } else {
                tracing::debug!(logger, "{message}");
            }
        });
    }

    /// Push buffered telemetry out now.
    pub fn flush(&self) {
        if let Some(pipeline) = &self.telemetry {
            pipeline.flush();
        }
    }

    /// `true` when the telemetry sink has fallen back to local output.
    pub fn is_degraded(&self) -> bool {
        self.telemetry
            .as_ref()
            .is_some_and(|pipeline| pipeline.is_degraded())
    }

    /// Make this sink the process-wide default subscriber.
    ///
    /// Can succeed once per process.
    pub fn install_global(&self) -> KeelResult<()> {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).map_err(|e| {
            KeelError::configuration(format!("a global log subscriber is already set: {e}"))
        })
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Builds the root logger for a set of settings and hands out named
/// children of it.
#[derive(Debug, Clone)]
pub struct LoggerFactory {
    root: Logger,
}

impl LoggerFactory {
    pub fn new(
        settings: &Settings,
        registry: &BackendRegistry,
        options: &SinkOptions,
    ) -> KeelResult<Self> {
        let backend = settings.selection().logger;
        let construct = registry.sink(backend)?;
        let sink = construct(&settings.logging, options)?;

        Ok(Self {
            root: Logger::new(settings.app_name.clone(), backend, sink),
        })
    }

    pub fn root(&self) -> &Logger {
        &self.root
    }

    pub fn get_logger(&self, name: &str) -> Logger {
        self.root.child(name)
    }
}
