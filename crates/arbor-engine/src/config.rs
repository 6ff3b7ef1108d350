//! Engine configuration.

use uuid::Uuid;

/// Well-known id of the role that makes a profile a superuser.
pub const ROLE_ID_SUPERUSER: Uuid = Uuid::from_u128(1);
/// Well-known id of the role that makes a profile staff.
pub const ROLE_ID_STAFF: Uuid = Uuid::from_u128(2);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Role whose grant yields [`PrivilegeStatus::Superuser`].
    ///
    /// [`PrivilegeStatus::Superuser`]: arbor_core::models::account::PrivilegeStatus::Superuser
    pub superuser_role_id: Uuid,
    /// Role whose grant yields `Staff` when no superuser grant exists.
    pub staff_role_id: Uuid,
    /// Bound of the in-process privilege refresh queue.
    pub refresh_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            superuser_role_id: ROLE_ID_SUPERUSER,
            staff_role_id: ROLE_ID_STAFF,
            refresh_queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_reserved_roles() {
        let config = EngineConfig::default();
        assert_eq!(
            config.superuser_role_id.to_string(),
            "00000000-0000-0000-0000-000000000001"
        );
        assert_eq!(
            config.staff_role_id.to_string(),
            "00000000-0000-0000-0000-000000000002"
        );
        assert!(config.refresh_queue_capacity > 0);
    }
}
