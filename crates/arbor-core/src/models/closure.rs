//! Closure table row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{EntityKind, EntityRef, SoftDeletable};

/// One reachability pair of the group forest. Every group owns a self
/// row at depth 0; `depth` is the number of parent links from
/// `descendant_id` up to `ancestor_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupClosure {
    pub id: Uuid,
    pub ancestor_id: Uuid,
    pub descendant_id: Uuid,
    pub depth: u32,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl GroupClosure {
    pub fn is_self_row(&self) -> bool {
        self.ancestor_id == self.descendant_id
    }
}

impl SoftDeletable for GroupClosure {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::GroupClosure, self.id)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}
