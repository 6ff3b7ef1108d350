//! Group domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{EntityRef, SoftDeletable};

/// A node in the organisational forest. Its position is held entirely
/// by closure rows; the group row itself knows nothing of its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDeletable for Group {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::group(self.id)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    /// Attach under this group; `None` creates a root.
    pub parent_id: Option<Uuid>,
}
