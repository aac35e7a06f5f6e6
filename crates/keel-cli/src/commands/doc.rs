//! Implementation of the `keel doc` commands.
//!
//! Each invocation is one unit of work: committed on success, rolled back
//! on any error.

use keel_adapters::Container;
use keel_core::application::ApplicationError;
use serde_json::Value;

use crate::{
    cli::{DocCommand, DocKey},
    error::{CliError, CliResult, IntoCli},
    output::OutputManager,
};

pub fn execute(command: DocCommand, container: &Container, output: &OutputManager) -> CliResult<()> {
    match command {
        DocCommand::Get(key) => get(&key, container, output),
        DocCommand::Put { key, body } => put(&key, &body, container, output),
        DocCommand::Delete(key) => delete(&key, container, output),
    }
}

fn get(key: &DocKey, container: &Container, output: &OutputManager) -> CliResult<()> {
    let uow = container.unit_of_work()?;
    let doc = uow
        .get(&key.collection, &key.id)
        .with_cli_context(|| format!("reading {}/{}", key.collection, key.id))?;
    uow.rollback();

    let doc = doc.ok_or_else(|| not_found(key))?;
    output.json(&doc)?;
    Ok(())
}

fn put(key: &DocKey, body: &str, container: &Container, output: &OutputManager) -> CliResult<()> {
    let doc: Value = serde_json::from_str(body)
        .map_err(|e| CliError::invalid_input("document body is not valid JSON", e))?;

    container
        .unit_of_work_factory()?
        .run(|uow| {
            uow.put(&key.collection, &key.id, doc);
            Ok(())
        })
        .with_cli_context(|| format!("writing {}/{}", key.collection, key.id))?;

    output.success(&format!("Stored {}/{}", key.collection, key.id))?;
    Ok(())
}

fn delete(key: &DocKey, container: &Container, output: &OutputManager) -> CliResult<()> {
    container
        .unit_of_work_factory()?
        .run(|uow| {
            if uow.get(&key.collection, &key.id)?.is_none() {
                return Err(not_found(key).into());
            }
            uow.delete(&key.collection, &key.id);
            Ok(())
        })
        .with_cli_context(|| format!("deleting {}/{}", key.collection, key.id))?;

    output.success(&format!("Deleted {}/{}", key.collection, key.id))?;
    Ok(())
}

fn not_found(key: &DocKey) -> ApplicationError {
    ApplicationError::NotFound {
        collection: key.collection.clone(),
        id: key.id.clone(),
    }
}
