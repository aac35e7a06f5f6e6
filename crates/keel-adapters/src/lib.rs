//! Infrastructure adapters for Keel.
//!
//! This crate implements the ports defined in `keel-core::application::ports`
//! and wires them together. It contains all external dependencies and I/O:
//!
//! - [`settings`]: environment variables into typed [`Settings`]
//! - [`database`]: memory, file and remote engines, the unit of work
//! - [`logging`]: simple, console and telemetry sinks behind [`Logger`]
//! - [`registry`]: which constructor builds each backend
//! - [`container`]: the context object tying it all together

pub mod container;
pub mod database;
pub mod logging;
pub mod registry;
pub mod settings;

// Re-export commonly used adapters
pub use container::{Container, ContainerBuilder, OverrideGuard, Provider, build_container};
pub use database::{
    DatabaseFactory, DocumentRepository, EngineHandle, FileEngine, MemoryEngine, RemoteEngine,
    UnitOfWork, UnitOfWorkFactory,
};
pub use logging::{LogTarget, Logger, LoggerFactory, SharedBuffer};
pub use registry::BackendRegistry;
pub use settings::Settings;
