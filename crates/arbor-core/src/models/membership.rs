//! Group membership edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{EntityKind, EntityRef, SoftDeletable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRelation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub profile_id: Uuid,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDeletable for GroupRelation {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::GroupRelation, self.id)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRelation {
    pub group_id: Uuid,
    pub profile_id: Uuid,
    pub approved_by: Option<Uuid>,
}
