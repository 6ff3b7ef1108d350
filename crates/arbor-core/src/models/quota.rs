//! Quota material and quota relation models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{EntityKind, EntityRef, SoftDeletable, Subject};

/// A countable resource, e.g. outbound mails per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaMaterial {
    pub id: Uuid,
    pub app_code: String,
    pub mat_code: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuotaMaterial {
    pub app_code: String,
    pub mat_code: String,
    pub description: String,
}

/// Upper bound of one material for a group or a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRelation {
    pub id: Uuid,
    pub subject: Subject,
    pub material_id: Uuid,
    pub maxnum: u32,
    pub expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDeletable for QuotaRelation {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::QuotaRelation, self.id)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuotaRelation {
    pub subject: Subject,
    pub material_id: Uuid,
    pub maxnum: u32,
    pub expiry: Option<DateTime<Utc>>,
}
