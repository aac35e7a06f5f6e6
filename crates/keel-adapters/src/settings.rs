//! Process settings resolved from the environment.
//!
//! [`Settings`] are read once at startup and passed down by reference. The
//! binary loads `.env` first; everything here only sees key/value pairs.
//!
//! # Resolution
//!
//! 1. Environment variables (case-insensitive)
//! 2. Built-in defaults
//!
//! `APP_ENV` falls back to `dev` when unset; an unrecognized value is a
//! [`KeelError::Configuration`] and nothing else gets built.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use ::config::{Config, Environment};
use keel_core::{
    application::{BackendSelection, EnvironmentTag, LogBackend},
    error::{KeelError, KeelResult},
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_ENVIRONMENT: EnvironmentTag = EnvironmentTag::Dev;
pub const DEFAULT_APP_NAME: &str = "keel-app";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_DEV_DB_PATH: &str = "data/dev.json";
pub const DEFAULT_STAGING_POOL_SIZE: usize = 10;
pub const DEFAULT_PROD_POOL_SIZE: usize = 20;
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

/// Raw variables as they come out of the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    app_env: Option<String>,
    app_name: Option<String>,

    log_backend: Option<String>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    telemetry_endpoint: Option<String>,
    telemetry_token: Option<String>,

    dev_db_path: Option<PathBuf>,
    staging_database_url: Option<String>,
    staging_database_key: Option<String>,
    staging_db_pool_size: Option<usize>,
    prod_database_url: Option<String>,
    prod_database_key: Option<String>,
    prod_db_pool_size: Option<usize>,
    db_timeout_secs: Option<u64>,
}

/// Fully resolved settings for one process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: EnvironmentTag,
    /// `true` when `APP_ENV` was unset and the default was used.
    pub environment_defaulted: bool,
    pub app_name: String,
    pub logger_override: Option<LogBackend>,
    pub logging: LogSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `keel_adapters=debug,warn`.
    pub level: String,
    /// Extra plain-text copy of console output.
    pub file: Option<PathBuf>,
    pub telemetry: TelemetrySettings,
}

#[derive(Clone)]
pub struct TelemetrySettings {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub dev_path: PathBuf,
    pub staging: RemoteSettings,
    pub prod: RemoteSettings,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct RemoteSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub pool_size: usize,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> KeelResult<Self> {
        Self::load(Environment::default())
    }

    /// Read settings from an explicit set of variables.
    ///
    /// Nothing from the process environment leaks in, so tests can build
    /// independent settings side by side.
    pub fn from_vars<I, K, V>(vars: I) -> KeelResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: ::config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(Environment::default().source(Some(map)))
    }

    /// Defaults for `environment`, no credentials.
    pub fn for_environment(environment: EnvironmentTag) -> Self {
        Self::build(
            RawSettings::default(),
            environment,
            false,
            None,
            DEFAULT_LOG_LEVEL.to_string(),
        )
    }

    fn load(source: Environment) -> KeelResult<Self> {
        let raw: RawSettings = Config::builder()
            .add_source(source)
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| KeelError::configuration(format!("failed to read environment: {e}")))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> KeelResult<Self> {
        let (environment, defaulted) = resolve_environment(raw.app_env.as_deref())?;
        let logger_override = resolve_logger_override(raw.log_backend.as_deref())?;

        let level = non_blank(raw.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        EnvFilter::try_new(&level)
            .map_err(|e| KeelError::configuration(format!("invalid LOG_LEVEL '{level}': {e}")))?;

        Ok(Self::build(raw, environment, defaulted, logger_override, level))
    }

    fn build(
        raw: RawSettings,
        environment: EnvironmentTag,
        environment_defaulted: bool,
        logger_override: Option<LogBackend>,
        level: String,
    ) -> Self {
        let app_name = non_blank(raw.app_name).unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        Self {
            environment,
            environment_defaulted,
            logger_override,
            logging: LogSettings {
                level,
                file: raw.log_file.filter(|p| !p.as_os_str().is_empty()),
                telemetry: TelemetrySettings {
                    endpoint: non_blank(raw.telemetry_endpoint),
                    token: non_blank(raw.telemetry_token),
                    service_name: app_name.clone(),
                },
            },
            database: DatabaseSettings {
                dev_path: raw
                    .dev_db_path
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DEV_DB_PATH)),
                staging: RemoteSettings {
                    url: non_blank(raw.staging_database_url),
                    api_key: non_blank(raw.staging_database_key),
                    pool_size: raw.staging_db_pool_size.unwrap_or(DEFAULT_STAGING_POOL_SIZE),
                },
                prod: RemoteSettings {
                    url: non_blank(raw.prod_database_url),
                    api_key: non_blank(raw.prod_database_key),
                    pool_size: raw.prod_db_pool_size.unwrap_or(DEFAULT_PROD_POOL_SIZE),
                },
                timeout: Duration::from_secs(
                    raw.db_timeout_secs.unwrap_or(DEFAULT_DB_TIMEOUT_SECS),
                ),
            },
            app_name,
        }
    }

    /// The backends these settings select.
    pub fn selection(&self) -> BackendSelection {
        BackendSelection::resolve(self.environment, self.logger_override)
    }
}

impl DatabaseSettings {
    /// Connection settings for a remote environment.
    pub fn remote(&self, environment: EnvironmentTag) -> Option<&RemoteSettings> {
        match environment {
            EnvironmentTag::Staging => Some(&self.staging),
            EnvironmentTag::Prod => Some(&self.prod),
            EnvironmentTag::Test | EnvironmentTag::Dev => None,
        }
    }
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl fmt::Debug for TelemetrySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetrySettings")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("service_name", &self.service_name)
            .finish()
    }
}

/// Parse `APP_ENV`. Unset or blank means [`DEFAULT_ENVIRONMENT`].
///
/// Returns the tag and whether the default was used.
pub fn resolve_environment(raw: Option<&str>) -> KeelResult<(EnvironmentTag, bool)> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => Ok((value.parse()?, false)),
        None => Ok((DEFAULT_ENVIRONMENT, true)),
    }
}

/// Parse `LOG_BACKEND`. Unset or blank means no override.
pub fn resolve_logger_override(raw: Option<&str>) -> KeelResult<Option<LogBackend>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_app_env_defaults_to_dev() {
        let settings = Settings::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(settings.environment, EnvironmentTag::Dev);
        assert!(settings.environment_defaulted);
    }

    #[test]
    fn invalid_app_env_fails_fast() {
        let err = Settings::from_vars([("APP_ENV", "foo")]).unwrap_err();
        assert!(matches!(err, KeelError::Configuration { .. }));
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn variables_are_case_insensitive() {
        let settings = Settings::from_vars([("app_env", "PROD"), ("Prod_Database_Url", "x")])
            .unwrap();
        assert_eq!(settings.environment, EnvironmentTag::Prod);
        assert_eq!(settings.database.prod.url.as_deref(), Some("x"));
    }

    #[test]
    fn invalid_log_backend_is_configuration_error() {
        let err = Settings::from_vars([("APP_ENV", "dev"), ("LOG_BACKEND", "syslog")])
            .unwrap_err();
        assert!(matches!(err, KeelError::Configuration { .. }));
    }

    #[test]
    fn invalid_log_level_is_configuration_error() {
        let err = Settings::from_vars([("LOG_LEVEL", "keel=notalevel")]).unwrap_err();
        assert!(err.to_string().contains("LOG_LEVEL"));
    }

    #[test]
    fn override_is_carried_into_selection() {
        let settings =
            Settings::from_vars([("APP_ENV", "prod"), ("LOG_BACKEND", "loguru")]).unwrap();
        let selection = settings.selection();
        assert_eq!(selection.logger, LogBackend::Console);
        assert!(selection.logger_overridden);
    }

    #[test]
    fn numeric_settings_parse_from_strings() {
        let settings = Settings::from_vars([
            ("STAGING_DB_POOL_SIZE", "3"),
            ("DB_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(settings.database.staging.pool_size, 3);
        assert_eq!(settings.database.prod.pool_size, DEFAULT_PROD_POOL_SIZE);
        assert_eq!(settings.database.timeout, Duration::from_secs(5));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let settings =
            Settings::from_vars([("APP_ENV", "  "), ("LOG_BACKEND", ""), ("PROD_DATABASE_KEY", " ")])
                .unwrap();
        assert!(settings.environment_defaulted);
        assert!(settings.logger_override.is_none());
        assert!(settings.database.prod.api_key.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let settings =
            Settings::from_vars([("PROD_DATABASE_KEY", "s3cret"), ("TELEMETRY_TOKEN", "t0ken")])
                .unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("t0ken"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn resolvers_handle_absent_values() {
        assert_eq!(resolve_environment(None).unwrap(), (EnvironmentTag::Dev, true));
        assert_eq!(
            resolve_environment(Some("staging")).unwrap(),
            (EnvironmentTag::Staging, false)
        );
        assert_eq!(resolve_logger_override(None).unwrap(), None);
        assert_eq!(
            resolve_logger_override(Some("logfire")).unwrap(),
            Some(LogBackend::Telemetry)
        );
    }
}
