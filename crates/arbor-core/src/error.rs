//! Error types for the Arbor system.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArborError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A move would make a group its own ancestor. `nodes` lists the
    /// would-be cycle from the moved group down to the requested parent.
    #[error("Loop detected: {}", format_nodes(.nodes))]
    LoopDetected { nodes: Vec<Uuid> },

    /// Closure-table invariant violated. Never retried.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("No changeset {changeset} holds a deleted {entity} with id {id}")]
    ChangesetMismatch {
        entity: String,
        id: String,
        changeset: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_nodes(nodes: &[Uuid]) -> String {
    nodes
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type ArborResult<T> = Result<T, ArborError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_detected_lists_every_node() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = ArborError::LoopDetected { nodes: vec![a, b] }.to_string();
        assert_eq!(msg, format!("Loop detected: {a} -> {b}"));
    }
}
