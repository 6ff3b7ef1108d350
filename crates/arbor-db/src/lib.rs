//! Arbor database: SurrealDB connection management and repository
//! implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - One `Surreal*Repository` per table plus [`SurrealUnitOfWork`],
//!   bundled as [`SurrealStore`]

mod connection;
mod error;
pub mod repository;
mod schema;
mod store;
mod unit_of_work;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
pub use store::SurrealStore;
pub use unit_of_work::SurrealUnitOfWork;
