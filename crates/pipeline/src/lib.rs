pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod memory_store;
pub mod retry;
pub mod session;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use executor::{BatchCommitExecutor, BatchProgress, ExecutorOptions};
pub use handle::{start_migration, MigrationHandle};
pub use memory_store::InMemoryStore;
pub use session::MigrationSession;
