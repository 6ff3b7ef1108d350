//! Login account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credentials attached 1:1 to a profile. The two privilege flags are
/// derived from the profile's roles and must never be edited directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAccount {
    pub profile_id: Uuid,
    pub username: String,
    /// Argon2id hash; never serialized back to callers.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl LoginAccount {
    pub fn privilege(&self) -> PrivilegeStatus {
        PrivilegeStatus::from_flags(self.is_superuser, self.is_staff)
    }
}

/// Input for creating an account. The password is plaintext and is
/// hashed by the repository.
#[derive(Debug, Clone)]
pub struct CreateLoginAccount {
    pub profile_id: Uuid,
    pub username: String,
    pub password: String,
}

/// Derived access tier of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrivilegeStatus {
    None,
    Staff,
    Superuser,
}

impl PrivilegeStatus {
    /// Account flags `(is_superuser, is_staff)` for this tier. A
    /// superuser is always staff as well.
    pub fn flags(self) -> (bool, bool) {
        match self {
            PrivilegeStatus::Superuser => (true, true),
            PrivilegeStatus::Staff => (false, true),
            PrivilegeStatus::None => (false, false),
        }
    }

    pub fn from_flags(is_superuser: bool, is_staff: bool) -> Self {
        if is_superuser {
            PrivilegeStatus::Superuser
        } else if is_staff {
            PrivilegeStatus::Staff
        } else {
            PrivilegeStatus::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_match_tier() {
        assert_eq!(PrivilegeStatus::Superuser.flags(), (true, true));
        assert_eq!(PrivilegeStatus::Staff.flags(), (false, true));
        assert_eq!(PrivilegeStatus::None.flags(), (false, false));
    }

    #[test]
    fn superuser_flag_dominates() {
        assert_eq!(
            PrivilegeStatus::from_flags(true, false),
            PrivilegeStatus::Superuser
        );
        assert_eq!(
            PrivilegeStatus::from_flags(false, true),
            PrivilegeStatus::Staff
        );
    }
}
