//! Telemetry sink.
//!
//! Events are turned into [`TelemetryRecord`]s, buffered, and shipped in
//! batches through a [`TelemetryExporter`] on a background thread. Shipping
//! is best effort:
//!
//! - transport failures drop the batch and bump a counter
//! - missing or rejected credentials disable the sink for the rest of the
//!   process, print one warning, and route every later event (plus the
//!   batch that triggered it) to the local fallback writer

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::{self, Receiver, SendError, Sender, SyncSender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::{DateTime, Utc};
use keel_core::error::{KeelError, KeelResult};
use reqwest::{StatusCode, Url, blocking::Client};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    span,
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

use super::LogTarget;
use crate::settings::TelemetrySettings;

/// Records per export call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Targets whose events never reach the exporter; they are emitted by the
/// exporter's own HTTP stack.
const TRANSPORT_TARGETS: &[&str] = &["reqwest", "hyper", "h2", "rustls", "want", "tokio"];

/// One shipped log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub level: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl TelemetryRecord {
    fn to_line(&self) -> String {
        let mut line = format!(
            "{} {:>5} {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            self.level,
            self.logger.as_deref().unwrap_or(&self.target),
        );
        line.push_str(": ");
        line.push_str(&self.message);
        for (key, value) in &self.fields {
            match value {
                Value::String(s) => line.push_str(&format!(" {key}={s}")),
                other => line.push_str(&format!(" {key}={other}")),
            }
        }
        line
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// Credentials are missing or the intake refused them.
    #[error("{reason}")]
    Unauthenticated { reason: String },

    /// The batch could not be delivered.
    #[error("telemetry export failed: {reason}")]
    Transport { reason: String },
}

/// Ships batches of records somewhere.
pub trait TelemetryExporter: Send + Sync {
    /// Cheap local check run once before the first export.
    fn check(&self) -> Result<(), TelemetryError>;

    fn export(&self, batch: &[TelemetryRecord]) -> Result<(), TelemetryError>;
}

/// Exporter posting JSON arrays to an HTTP intake with a bearer token.
pub struct HttpExporter {
    endpoint: Option<Url>,
    token: Option<String>,
    client: Client,
}

impl HttpExporter {
    /// Build an exporter from settings.
    ///
    /// Missing credentials are not an error here; they surface on first use.
    /// A malformed endpoint URL is.
    pub fn new(settings: &TelemetrySettings) -> KeelResult<Self> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    KeelError::configuration(format!("TELEMETRY_ENDPOINT is not a valid URL: {e}"))
                })
            })
            .transpose()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| KeelError::configuration(format!("telemetry client setup failed: {e}")))?;

        Ok(Self {
            endpoint,
            token: settings.token.clone(),
            client,
        })
    }

    fn credentials(&self) -> Result<(&Url, &str), TelemetryError> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| TelemetryError::Unauthenticated {
            reason: "TELEMETRY_ENDPOINT is not set".into(),
        })?;
        let token = self.token.as_deref().ok_or_else(|| TelemetryError::Unauthenticated {
            reason: "TELEMETRY_TOKEN is not set".into(),
        })?;
        Ok((endpoint, token))
    }
}

impl TelemetryExporter for HttpExporter {
    fn check(&self) -> Result<(), TelemetryError> {
        self.credentials().map(|_| ())
    }

    fn export(&self, batch: &[TelemetryRecord]) -> Result<(), TelemetryError> {
        let (endpoint, token) = self.credentials()?;

        let response = self
            .client
            .post(endpoint.clone())
            .bearer_auth(token)
            .json(batch)
            .send()
            .map_err(|e| TelemetryError::Transport {
                reason: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TelemetryError::Unauthenticated {
                    reason: format!("intake rejected TELEMETRY_TOKEN ({})", response.status()),
                })
            }
            status => Err(TelemetryError::Transport {
                reason: format!("intake answered {status}"),
            }),
        }
    }
}

impl fmt::Debug for HttpExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExporter")
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Shared state between the tracing layer and the logger handles.
///
/// Full batches are handed to a worker thread so the exporter never runs
/// inside a log call. [`TelemetryPipeline::flush`] waits for the worker to
/// drain.
pub struct TelemetryPipeline {
    service: String,
    batch_size: usize,
    shipper: Arc<Shipper>,
    buffer: Mutex<Vec<TelemetryRecord>>,
    checked: AtomicBool,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

enum Job {
    Export(Vec<TelemetryRecord>),
    Flush(SyncSender<()>),
}

/// The exporter plus the state the worker and the callers both touch.
struct Shipper {
    exporter: Arc<dyn TelemetryExporter>,
    fallback: LogTarget,
    degraded: Arc<AtomicBool>,
    dropped: AtomicUsize,
}

impl Shipper {
    fn ship(&self, batch: Vec<TelemetryRecord>) {
        if batch.is_empty() {
            return;
        }
        if self.degraded.load(Ordering::Acquire) {
            self.replay(&batch);
            return;
        }

        match self.exporter.export(&batch) {
            Ok(()) => {}
            Err(e @ TelemetryError::Unauthenticated { .. }) => self.degrade(e, &batch),
            Err(TelemetryError::Transport { .. }) => {
                self.dropped.fetch_add(batch.len(), Ordering::Relaxed);
            }
        }
    }

    fn degrade(&self, cause: TelemetryError, pending: &[TelemetryRecord]) {
        if self.degraded.swap(true, Ordering::AcqRel) {
            self.replay(pending);
            return;
        }

        let err = KeelError::TelemetryAuth {
            reason: cause.to_string(),
        };
        self.fallback.write_line(&format!(
            "WARNING: {err}. Telemetry logging is disabled for this process; \
             continuing with local output."
        ));
        self.replay(pending);
    }

    fn replay(&self, records: &[TelemetryRecord]) {
        for record in records {
            self.fallback.write_line(&record.to_line());
        }
    }

    fn run(&self, jobs: Receiver<Job>) {
        for job in jobs {
            match job {
                Job::Export(batch) => self.ship(batch),
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    }
}

impl TelemetryPipeline {
    /// Start the pipeline and its export worker.
    ///
    /// If the worker thread cannot be spawned, batches are exported on the
    /// calling thread instead.
    pub fn new(
        exporter: Arc<dyn TelemetryExporter>,
        service: impl Into<String>,
        batch_size: usize,
        fallback: LogTarget,
    ) -> Self {
        let shipper = Arc::new(Shipper {
            exporter,
            fallback,
            degraded: Arc::new(AtomicBool::new(false)),
            dropped: AtomicUsize::new(0),
        });

        let (tx, rx) = mpsc::channel();
        let worker_shipper = Arc::clone(&shipper);
        let (jobs, worker) = match thread::Builder::new()
            .name("keel-telemetry".into())
            .spawn(move || worker_shipper.run(rx))
        {
            Ok(handle) => (Some(tx), Some(handle)),
            Err(_) => (None, None),
        };

        Self {
            service: service.into(),
            batch_size: batch_size.max(1),
            shipper,
            buffer: Mutex::new(Vec::new()),
            checked: AtomicBool::new(false),
            jobs,
            worker,
        }
    }

    /// `true` once the sink has fallen back to local output for good.
    pub fn is_degraded(&self) -> bool {
        self.shipper.degraded.load(Ordering::Acquire)
    }

    /// Records lost to transport failures.
    pub fn dropped(&self) -> usize {
        self.shipper.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn degraded_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shipper.degraded)
    }

    fn accept(&self, record: TelemetryRecord) {
        if self.is_degraded() {
            return;
        }

        if !self.checked.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.shipper.exporter.check() {
                self.shipper.degrade(e, &[record]);
                return;
            }
        }

        let full = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            buffer.push(record);
            if buffer.len() >= self.batch_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        if let Some(batch) = full {
            self.submit(batch);
        }
    }

    fn take_buffer(&self) -> Vec<TelemetryRecord> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buffer)
    }

    fn submit(&self, batch: Vec<TelemetryRecord>) {
        let rejected = match &self.jobs {
            Some(jobs) => match jobs.send(Job::Export(batch)) {
                Ok(()) => return,
                Err(SendError(Job::Export(batch))) => batch,
                Err(SendError(Job::Flush(_))) => return,
            },
            None => batch,
        };
        self.shipper.ship(rejected);
    }

    fn on_worker(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Ship whatever is buffered and wait until every submitted batch has
    /// been handled.
    pub fn flush(&self) {
        let batch = self.take_buffer();
        if !batch.is_empty() {
            self.submit(batch);
        }

        let Some(jobs) = &self.jobs else {
            return;
        };
        if self.on_worker() {
            return;
        }
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        if jobs.send(Job::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for TelemetryPipeline {
    fn drop(&mut self) {
        self.flush();
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl fmt::Debug for TelemetryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryPipeline")
            .field("service", &self.service)
            .field("batch_size", &self.batch_size)
            .field("degraded", &self.is_degraded())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Logger name carried by a `logger` span.
struct LoggerName(String);

/// Tracing layer feeding a [`TelemetryPipeline`].
pub struct TelemetryLayer {
    pipeline: Arc<TelemetryPipeline>,
}

impl TelemetryLayer {
    pub fn new(pipeline: Arc<TelemetryPipeline>) -> Self {
        Self { pipeline }
    }
}

impl<S> Layer<S> for TelemetryLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != super::LOGGER_SPAN {
            return;
        }
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(span), Some(Value::String(name))) =
            (ctx.span(id), visitor.fields.remove("name"))
        {
            span.extensions_mut().insert(LoggerName(name));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.pipeline.is_degraded() || is_transport_target(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let logger = match visitor.fields.remove("logger") {
            Some(Value::String(name)) => Some(name),
            _ => ctx.event_scope(event).and_then(|scope| {
                scope
                    .from_root()
                    .filter_map(|span| span.extensions().get::<LoggerName>().map(|n| n.0.clone()))
                    .last()
            }),
        };

        self.pipeline.accept(TelemetryRecord {
            timestamp: Utc::now(),
            service: self.pipeline.service.clone(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            logger,
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        });
    }
}

fn is_transport_target(target: &str) -> bool {
    TRANSPORT_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{value:?}")));
    }
}
