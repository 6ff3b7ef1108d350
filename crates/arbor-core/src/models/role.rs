//! Role and applied-role domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{EntityKind, EntityRef, SoftDeletable, Subject};

/// A named bundle of low-level permission codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    /// Fixed id for reserved roles; generated when `None`.
    pub id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

/// A role granted to a group or a profile. Roles granted to a group
/// reach every member of that group's subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRole {
    pub id: Uuid,
    pub subject: Subject,
    pub role_id: Uuid,
    pub expiry: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDeletable for AppliedRole {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::AppliedRole, self.id)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppliedRole {
    pub subject: Subject,
    pub role_id: Uuid,
    pub expiry: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
}
