//! SQLite adapters for the orchestration substrate.

pub mod connection;
pub mod memory_store;
pub mod migrations;

pub use connection::{create_pool, create_test_pool, PoolConfig};
pub use memory_store::SqliteMemoryStore;
pub use migrations::{all_migrations, run_migrations, Migration};
