//! Out-of-band privilege refresh contract.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ArborResult;

/// Work item for the privilege refresh worker. Processing a task twice
/// is harmless: every profile is recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum PrivilegeRefreshTask {
    /// Resync every profile with an account that is a member of any
    /// group in the subtrees of `group_ids`. `deleted` widens the
    /// lookup to soft-deleted closure rows and memberships.
    Groups { group_ids: Vec<Uuid>, deleted: bool },
    /// Resync the listed profiles directly.
    Profiles { profile_ids: Vec<Uuid> },
}

impl PrivilegeRefreshTask {
    pub fn name(&self) -> &'static str {
        match self {
            PrivilegeRefreshTask::Groups { .. } => "refresh_group_privileges",
            PrivilegeRefreshTask::Profiles { .. } => "refresh_profile_privileges",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PrivilegeRefreshTask::Groups { group_ids, .. } => group_ids.is_empty(),
            PrivilegeRefreshTask::Profiles { profile_ids } => profile_ids.is_empty(),
        }
    }
}

/// Fire-and-forget task queue. Delivery is at-least-once from the
/// caller's point of view.
pub trait TaskSink: Send + Sync {
    fn enqueue(&self, task: PrivilegeRefreshTask) -> ArborResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_task_payload_carries_ids_and_flag() {
        let id = Uuid::from_u128(7);
        let task = PrivilegeRefreshTask::Groups {
            group_ids: vec![id],
            deleted: true,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task"], "groups");
        assert_eq!(json["group_ids"][0], id.to_string());
        assert_eq!(json["deleted"], true);

        let back: PrivilegeRefreshTask = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn empty_tasks_are_detected() {
        assert!(
            PrivilegeRefreshTask::Profiles {
                profile_ids: Vec::new()
            }
            .is_empty()
        );
        assert_eq!(
            PrivilegeRefreshTask::Profiles {
                profile_ids: vec![Uuid::nil()]
            }
            .name(),
            "refresh_profile_privileges"
        );
    }
}
