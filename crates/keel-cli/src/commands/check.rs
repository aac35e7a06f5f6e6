//! Implementation of the `keel check` command.

use keel_adapters::Container;
use tracing::info;

use crate::{error::CliResult, output::OutputManager};

/// Build the engine, ping it, then open and roll back an empty unit of work.
pub fn execute(container: &Container, output: &OutputManager) -> CliResult<()> {
    let engine = container.engine()?;
    engine.ping()?;
    info!(engine = %engine.kind(), location = %engine.location(), "Engine reachable");

    let uow = container.unit_of_work()?;
    uow.rollback();

    output.success(&format!(
        "{} engine ready at {} ({})",
        engine.kind(),
        engine.location(),
        container.selection().environment
    ))?;
    Ok(())
}
