//! Changeset ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::EntityRef;

/// One logical delete operation. `entity` is the top-level entity the
/// operation was issued against; its cascade is held in the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Changeset {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub entity: EntityRef,
    pub created_at: DateTime<Utc>,
}

/// A reversible delete of one entity, owned by a changeset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftDeleteRecord {
    pub changeset_id: Uuid,
    pub entity: EntityRef,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a changeset recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStatus {
    /// Nothing was restored.
    Nothing,
    /// Some records were restored, others were evicted or discarded.
    DonePartial,
    /// Every record was restored and the changeset is gone.
    DoneFull,
}
