//! Standard sink constructors, one per [`LogBackend`](keel_core::application::LogBackend).

use std::{
    fs,
    path::Path,
    sync::{Arc, atomic::Ordering},
};

use keel_core::error::{KeelError, KeelResult};
use tracing::Dispatch;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::{LevelFilter, dynamic_filter_fn},
    fmt,
    layer::SubscriberExt,
};

use super::{
    LogSink, LogTarget, SinkOptions,
    telemetry::{HttpExporter, TelemetryExporter, TelemetryLayer, TelemetryPipeline},
};
use crate::settings::LogSettings;

/// Transport crates stay quiet unless asked for by name.
fn env_filter(level: &str) -> KeelResult<EnvFilter> {
    EnvFilter::try_new(format!("{level},reqwest=warn,hyper=warn,rustls=warn"))
        .map_err(|e| KeelError::configuration(format!("invalid LOG_LEVEL '{level}': {e}")))
}

/// Plain single-line text, never colored.
pub fn simple_sink(settings: &LogSettings, options: &SinkOptions) -> KeelResult<LogSink> {
    let layer = fmt::layer()
        .compact()
        .with_ansi(false)
        .with_target(false)
        .with_writer(options.target.make_writer());

    let subscriber = Registry::default()
        .with(env_filter(&settings.level)?)
        .with(layer);
    Ok(LogSink::new(Dispatch::new(subscriber)))
}

/// Colored text when the target is a terminal, plus an uncolored copy in
/// `LOG_FILE` when one is configured.
pub fn console_sink(settings: &LogSettings, options: &SinkOptions) -> KeelResult<LogSink> {
    let ansi = options
        .ansi
        .unwrap_or_else(|| options.target.is_terminal());

    let terminal = fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(options.target.make_writer());

    let file = match settings.file.as_deref() {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_appender(path)?),
        ),
        None => None,
    };

    let subscriber = Registry::default()
        .with(env_filter(&settings.level)?)
        .with(terminal)
        .with(file);
    Ok(LogSink::new(Dispatch::new(subscriber)))
}

/// Batched export through the configured [`TelemetryExporter`].
///
/// A local text layer is attached too but stays silent until the pipeline
/// degrades.
pub fn telemetry_sink(settings: &LogSettings, options: &SinkOptions) -> KeelResult<LogSink> {
    let exporter: Arc<dyn TelemetryExporter> = match &options.exporter {
        Some(exporter) => Arc::clone(exporter),
        None => Arc::new(HttpExporter::new(&settings.telemetry)?),
    };

    let pipeline = Arc::new(TelemetryPipeline::new(
        exporter,
        settings.telemetry.service_name.clone(),
        options.batch_size,
        options.target.clone(),
    ));

    let degraded = pipeline.degraded_flag();
    let fallback = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(options.target.make_writer())
        .with_filter(dynamic_filter_fn(move |_, _| degraded.load(Ordering::Acquire)));

    let subscriber = Registry::default()
        .with(env_filter(&settings.level)?)
        .with(TelemetryLayer::new(Arc::clone(&pipeline)))
        .with(fallback);
    Ok(LogSink::with_telemetry(Dispatch::new(subscriber), pipeline))
}

/// Infallible `info`-level plain sink.
pub(super) fn plain_sink(target: LogTarget) -> LogSink {
    let layer = fmt::layer()
        .compact()
        .with_ansi(false)
        .with_target(false)
        .with_writer(target.make_writer());

    let subscriber = Registry::default().with(LevelFilter::INFO).with(layer);
    LogSink::new(Dispatch::new(subscriber))
}

fn file_appender(path: &Path) -> KeelResult<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path.file_name().ok_or_else(|| {
        KeelError::configuration(format!("LOG_FILE '{}' does not name a file", path.display()))
    })?;

    fs::create_dir_all(dir).map_err(|e| {
        KeelError::configuration(format!("cannot create log directory {}: {e}", dir.display()))
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|e| KeelError::configuration(format!("cannot open LOG_FILE {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use keel_core::application::EnvironmentTag;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        logging::{Logger, SharedBuffer, TelemetryError, TelemetryRecord},
        settings::Settings,
    };

    fn buffered() -> (SinkOptions, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let options = SinkOptions {
            target: LogTarget::Buffer(buffer.clone()),
            ..SinkOptions::default()
        };
        (options, buffer)
    }

    fn log_settings() -> LogSettings {
        Settings::for_environment(EnvironmentTag::Test).logging
    }

    #[test]
    fn simple_sink_writes_uncolored_lines() {
        let (options, buffer) = buffered();
        let sink = simple_sink(&log_settings(), &options).unwrap();
        let logger = Logger::new("svc", keel_core::application::LogBackend::Simple, sink);

        logger.warn("disk almost full");

        let out = buffer.contents();
        assert!(out.contains("WARN"));
        assert!(out.contains("disk almost full"));
        assert!(!out.contains('\u{1b}'));
    }

    #[test]
    fn console_sink_copies_to_log_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/app.log");
        let mut settings = log_settings();
        settings.file = Some(path.clone());

        let (options, buffer) = buffered();
        let sink = console_sink(&settings, &options).unwrap();
        let logger = Logger::new("svc", keel_core::application::LogBackend::Console, sink);

        logger.info("written twice");

        assert!(buffer.contents().contains("written twice"));
        assert!(fs::read_to_string(&path).unwrap().contains("written twice"));
    }

    #[test]
    fn level_filter_applies() {
        let mut settings = log_settings();
        settings.level = "error".into();

        let (options, buffer) = buffered();
        let sink = simple_sink(&settings, &options).unwrap();
        let logger = Logger::new("svc", keel_core::application::LogBackend::Simple, sink);

        logger.warn("hidden");
        logger.error("shown");

        let out = buffer.contents();
        assert!(!out.contains("hidden"));
        assert!(out.contains("shown"));
    }

    #[test]
    fn invalid_level_is_a_configuration_error() {
        let mut settings = log_settings();
        settings.level = "keel=notalevel".into();

        let err = simple_sink(&settings, &SinkOptions::default()).err().unwrap();
        assert!(matches!(err, KeelError::Configuration { .. }));
    }

    /// Exporter that keeps what it is given.
    #[derive(Default)]
    struct Collecting {
        batches: Mutex<Vec<Vec<TelemetryRecord>>>,
    }

    impl TelemetryExporter for Collecting {
        fn check(&self) -> Result<(), TelemetryError> {
            Ok(())
        }

        fn export(&self, batch: &[TelemetryRecord]) -> Result<(), TelemetryError> {
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    #[test]
    fn telemetry_sink_ships_records_with_logger_names() {
        let exporter = Arc::new(Collecting::default());
        let (mut options, buffer) = buffered();
        options.exporter = Some(exporter.clone());

        let sink = telemetry_sink(&log_settings(), &options).unwrap();
        let logger = Logger::new("svc", keel_core::application::LogBackend::Telemetry, sink);

        logger.child("billing").info("invoice sent");
        logger.in_scope(|| tracing::info!(amount = 12, "charged"));
        logger.flush();

        let batches = exporter.batches.lock().unwrap();
        let records: Vec<_> = batches.iter().flatten().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].logger.as_deref(), Some("svc.billing"));
        assert_eq!(records[0].message, "invoice sent");
        assert_eq!(records[1].logger.as_deref(), Some("svc"));
        assert_eq!(records[1].fields["amount"], 12);
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn telemetry_sink_without_token_falls_back_locally() {
        let mut settings = log_settings();
        settings.telemetry.endpoint = Some("https://intake.example.com/v1/logs".into());
        settings.telemetry.token = None;

        let (options, buffer) = buffered();
        let sink = telemetry_sink(&settings, &options).unwrap();
        let logger = Logger::new("svc", keel_core::application::LogBackend::Telemetry, sink);

        logger.info("first event");
        logger.info("second event");

        let out = buffer.contents();
        assert!(logger.is_degraded());
        assert_eq!(out.matches("WARNING").count(), 1);
        assert!(out.contains("TELEMETRY_TOKEN is not set"));
        assert!(out.contains("first event"));
        assert!(out.contains("second event"));
    }
}
