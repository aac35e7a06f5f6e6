//! Persistence engines and the unit of work built on them.
//!
//! | Environment    | Engine           |
//! |----------------|------------------|
//! | test           | [`MemoryEngine`] |
//! | dev            | [`FileEngine`]   |
//! | staging, prod  | [`RemoteEngine`] |

use std::sync::Arc;

use keel_core::application::PersistenceEngine;

mod factory;
mod file;
mod memory;
mod remote;
mod repository;
mod unit_of_work;

pub use factory::DatabaseFactory;
pub use file::FileEngine;
pub use memory::MemoryEngine;
pub use remote::RemoteEngine;
pub use repository::DocumentRepository;
pub use unit_of_work::{UnitOfWork, UnitOfWorkFactory};

/// Shared handle to the process's engine.
pub type EngineHandle = Arc<dyn PersistenceEngine>;
