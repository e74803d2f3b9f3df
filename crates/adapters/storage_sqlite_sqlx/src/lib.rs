//! # coophub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the storage port traits defined in `coophub-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `coophub-app` (for port traits) and `coophub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod codec;
pub mod command_repo;
pub mod device_repo;
pub mod error;
pub mod execution_repo;
pub mod pool;
pub mod schedule_repo;

pub use command_repo::SqliteCommandRepository;
pub use device_repo::SqliteDeviceRepository;
pub use error::StorageError;
pub use execution_repo::SqliteExecutionRepository;
pub use pool::{Config, Database};
pub use schedule_repo::SqliteScheduleRepository;
