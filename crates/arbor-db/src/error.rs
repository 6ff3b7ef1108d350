//! Database-specific error types and conversions.

use arbor_core::error::ArborError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A statement ran but its result was rejected or malformed.
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for ArborError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ArborError::NotFound { entity, id },
            DbError::Query(msg) if msg.contains("already contains") => ArborError::AlreadyExists {
                entity: msg,
            },
            other => ArborError::Database(other.to_string()),
        }
    }
}
