//! Tree-structure error types.

use arbor_core::error::ArborError;
use thiserror::Error;
use uuid::Uuid;

/// Closure-table and topology failures raised by the engine.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("closure row {row} at depth {depth} cannot be shifted by {delta}")]
    DepthUnderflow { row: Uuid, depth: u32, delta: i32 },

    #[error("self row {row} cannot be shifted")]
    SelfRowShift { row: Uuid },

    #[error("deleted closure rows of group {group} have no depth-1 {side}")]
    MissingLink { group: Uuid, side: &'static str },

    #[error("group {group} has {count} direct parents")]
    AmbiguousParent { group: Uuid, count: usize },

    #[error("group {group} has no self row")]
    MissingSelfRow { group: Uuid },

    #[error("moving the group would create a loop")]
    Loop { nodes: Vec<Uuid> },
}

impl From<TreeError> for ArborError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Loop { nodes } => ArborError::LoopDetected { nodes },
            other => ArborError::Integrity(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_maps_to_loop_detected() {
        let n = Uuid::new_v4();
        let err: ArborError = TreeError::Loop { nodes: vec![n] }.into();
        assert!(matches!(err, ArborError::LoopDetected { nodes } if nodes == vec![n]));
    }

    #[test]
    fn depth_faults_map_to_integrity() {
        let err: ArborError = TreeError::DepthUnderflow {
            row: Uuid::nil(),
            depth: 1,
            delta: -1,
        }
        .into();
        assert!(matches!(err, ArborError::Integrity(_)));
    }
}
