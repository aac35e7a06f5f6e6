//! Environment tags and backend selection.
//!
//! # Design
//!
//! Everything here is a pure value type. The mapping from environment to
//! backend kind is decided once, in [`BackendSelection::resolve`], and the
//! rest of the application only ever looks at the resulting kinds. Turning a
//! kind into a live backend is the adapters' job.
//!
//! # Adding a backend
//!
//! 1. Add the variant and its `as_str`/`FromStr` arms here
//! 2. Decide which environments default to it in `BackendSelection::resolve`
//! 3. Register a constructor in `keel_adapters::registry`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeelError;

// ── EnvironmentTag ───────────────────────────────────────────────────────────

/// The deployment environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentTag {
    Test,
    Dev,
    Staging,
    Prod,
}

impl EnvironmentTag {
    pub const ALL: [EnvironmentTag; 4] = [Self::Test, Self::Dev, Self::Staging, Self::Prod];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }

    /// Ephemeral environments never persist state beyond the process.
    pub const fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Test)
    }

    /// Remote environments talk to managed services and need credentials.
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Staging | Self::Prod)
    }
}

impl fmt::Display for EnvironmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentTag {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "dev" | "development" => Ok(Self::Dev),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(KeelError::configuration(format!(
                "unknown APP_ENV '{other}' (expected test, dev, staging or prod)"
            ))),
        }
    }
}

// ── EngineKind ───────────────────────────────────────────────────────────────

/// Which persistence engine implementation backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Process-local map, gone when the engine is dropped.
    Memory,
    /// JSON document store on the local filesystem.
    File,
    /// Managed database reached over HTTP.
    Remote,
}

impl EngineKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── LogBackend ───────────────────────────────────────────────────────────────

/// Which logging sink backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    /// Plain single-line output, no colors.
    Simple,
    /// Colored structured output on the local terminal.
    Console,
    /// Batched JSON records shipped to a remote intake.
    Telemetry,
}

impl LogBackend {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Console => "console",
            Self::Telemetry => "telemetry",
        }
    }

    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Telemetry)
    }
}

impl fmt::Display for LogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogBackend {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" | "std" | "stdlib" | "logging" => Ok(Self::Simple),
            "console" | "loguru" => Ok(Self::Console),
            "telemetry" | "logfire" => Ok(Self::Telemetry),
            other => Err(KeelError::configuration(format!(
                "unknown LOG_BACKEND '{other}' (expected simple, console or telemetry)"
            ))),
        }
    }
}

// ── BackendSelection ─────────────────────────────────────────────────────────

/// The backends chosen for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSelection {
    pub environment: EnvironmentTag,
    pub engine: EngineKind,
    pub logger: LogBackend,
    /// `true` when `logger` came from an explicit override.
    pub logger_overridden: bool,
}

impl BackendSelection {
    /// Derive the backends for an environment.
    ///
    /// A logger override, when present, always wins over the environment
    /// default. The engine has no override.
    pub fn resolve(environment: EnvironmentTag, logger_override: Option<LogBackend>) -> Self {
        let engine = match environment {
            EnvironmentTag::Test => EngineKind::Memory,
            EnvironmentTag::Dev => EngineKind::File,
            EnvironmentTag::Staging | EnvironmentTag::Prod => EngineKind::Remote,
        };

        let default_logger = match environment {
            EnvironmentTag::Test | EnvironmentTag::Dev => LogBackend::Console,
            EnvironmentTag::Staging | EnvironmentTag::Prod => LogBackend::Telemetry,
        };

        let selection = Self {
            environment,
            engine,
            logger: logger_override.unwrap_or(default_logger),
            logger_overridden: logger_override.is_some(),
        };

        tracing::debug!(
            environment = %selection.environment,
            engine = %selection.engine,
            logger = %selection.logger,
            overridden = selection.logger_overridden,
            "Backend selection resolved"
        );

        selection
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (engine: {}, logger: {}{})",
            self.environment,
            self.engine,
            self.logger,
            if self.logger_overridden {
                ", overridden"
            } else {
                ""
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_aliases_case_insensitively() {
        assert_eq!("TEST".parse::<EnvironmentTag>().unwrap(), EnvironmentTag::Test);
        assert_eq!(
            "production".parse::<EnvironmentTag>().unwrap(),
            EnvironmentTag::Prod
        );
        assert_eq!(" dev ".parse::<EnvironmentTag>().unwrap(), EnvironmentTag::Dev);
        assert!("foo".parse::<EnvironmentTag>().is_err());
    }

    #[test]
    fn log_backend_accepts_library_names() {
        assert_eq!("loguru".parse::<LogBackend>().unwrap(), LogBackend::Console);
        assert_eq!("logfire".parse::<LogBackend>().unwrap(), LogBackend::Telemetry);
        assert_eq!("simple".parse::<LogBackend>().unwrap(), LogBackend::Simple);
        assert!("syslog".parse::<LogBackend>().is_err());
    }

    #[test]
    fn engine_follows_environment() {
        let expected = [
            (EnvironmentTag::Test, EngineKind::Memory),
            (EnvironmentTag::Dev, EngineKind::File),
            (EnvironmentTag::Staging, EngineKind::Remote),
            (EnvironmentTag::Prod, EngineKind::Remote),
        ];
        for (env, engine) in expected {
            assert_eq!(BackendSelection::resolve(env, None).engine, engine);
        }
    }

    #[test]
    fn logger_defaults_split_local_and_remote() {
        assert_eq!(
            BackendSelection::resolve(EnvironmentTag::Dev, None).logger,
            LogBackend::Console
        );
        assert_eq!(
            BackendSelection::resolve(EnvironmentTag::Prod, None).logger,
            LogBackend::Telemetry
        );
    }

    #[test]
    fn override_wins_in_every_environment() {
        for env in EnvironmentTag::ALL {
            let selection = BackendSelection::resolve(env, Some(LogBackend::Console));
            assert_eq!(selection.logger, LogBackend::Console);
            assert!(selection.logger_overridden);
        }
    }

    #[test]
    fn display_mentions_override() {
        let selection =
            BackendSelection::resolve(EnvironmentTag::Prod, Some(LogBackend::Simple));
        assert_eq!(
            selection.to_string(),
            "prod (engine: remote, logger: simple, overridden)"
        );
    }
}
