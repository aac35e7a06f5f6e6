//! Implementation of the `keel env` command.

use keel_adapters::Container;
use keel_core::application::{EngineKind, EnvironmentTag, LogBackend};
use serde::Serialize;

use crate::{cli::EnvArgs, error::CliResult, output::OutputManager};

#[derive(Debug, Serialize)]
struct EnvReport<'a> {
    environment: EnvironmentTag,
    environment_defaulted: bool,
    app_name: &'a str,
    engine: EngineKind,
    logger: LogBackend,
    logger_overridden: bool,
    log_level: &'a str,
}

pub fn execute(args: EnvArgs, container: &Container, output: &OutputManager) -> CliResult<()> {
    let settings = container.settings();
    let selection = container.selection();

    let report = EnvReport {
        environment: selection.environment,
        environment_defaulted: settings.environment_defaulted,
        app_name: &settings.app_name,
        engine: selection.engine,
        logger: selection.logger,
        logger_overridden: selection.logger_overridden,
        log_level: &settings.logging.level,
    };

    if args.json {
        output.json(&report)?;
        return Ok(());
    }

    if report.environment_defaulted {
        output.warning("APP_ENV is not set, using the dev environment")?;
    }

    let environment = if report.environment_defaulted {
        format!("{} (default)", report.environment)
    } else {
        report.environment.to_string()
    };
    let logger = if report.logger_overridden {
        format!("{} (LOG_BACKEND)", report.logger)
    } else {
        report.logger.to_string()
    };

    output.field("environment", &environment)?;
    output.field("app", report.app_name)?;
    output.field("engine", report.engine.as_str())?;
    output.field("logger", &logger)?;
    output.field("log level", report.log_level)?;
    Ok(())
}
