//! Write set of one tree mutation.
//!
//! Engine operations read what they need, compute every change in
//! memory and hand the result to [`UnitOfWork::commit`] as one
//! [`ChangeBatch`]. The store applies the whole batch atomically, in
//! the order the fields are declared.
//!
//! [`UnitOfWork::commit`]: crate::repository::UnitOfWork::commit

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::changeset::Changeset;
use crate::models::entity::EntityRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPath {
    pub id: Uuid,
    pub ancestor_id: Uuid,
    pub descendant_id: Uuid,
    pub depth: u32,
}

impl NewPath {
    pub fn new(ancestor_id: Uuid, descendant_id: Uuid, depth: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            ancestor_id,
            descendant_id,
            depth,
        }
    }
}

/// New absolute depth for an existing closure row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthUpdate {
    pub id: Uuid,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub changeset_id: Uuid,
    pub entity: EntityRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountActivation {
    pub profile_id: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct ChangeBatch {
    /// Timestamp stamped on soft deletes and new rows.
    pub now: DateTime<Utc>,
    pub hard_deletes: Vec<EntityRef>,
    pub new_groups: Vec<NewGroup>,
    pub new_paths: Vec<NewPath>,
    pub depth_updates: Vec<DepthUpdate>,
    pub soft_deletes: Vec<EntityRef>,
    pub restores: Vec<EntityRef>,
    pub opened_changesets: Vec<Changeset>,
    pub recorded: Vec<LedgerEntry>,
    pub unrecorded: Vec<LedgerEntry>,
    pub dropped_changesets: Vec<Uuid>,
    pub account_activations: Vec<AccountActivation>,
    pub removed_accounts: Vec<Uuid>,
}

impl ChangeBatch {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            hard_deletes: Vec::new(),
            new_groups: Vec::new(),
            new_paths: Vec::new(),
            depth_updates: Vec::new(),
            soft_deletes: Vec::new(),
            restores: Vec::new(),
            opened_changesets: Vec::new(),
            recorded: Vec::new(),
            unrecorded: Vec::new(),
            dropped_changesets: Vec::new(),
            account_activations: Vec::new(),
            removed_accounts: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hard_deletes.is_empty()
            && self.new_groups.is_empty()
            && self.new_paths.is_empty()
            && self.depth_updates.is_empty()
            && self.soft_deletes.is_empty()
            && self.restores.is_empty()
            && self.opened_changesets.is_empty()
            && self.recorded.is_empty()
            && self.unrecorded.is_empty()
            && self.dropped_changesets.is_empty()
            && self.account_activations.is_empty()
            && self.removed_accounts.is_empty()
    }

    /// Soft-delete `entity` and record it in `changeset_id`.
    pub fn soft_delete(&mut self, changeset_id: Uuid, entity: EntityRef) {
        self.soft_deletes.push(entity);
        self.recorded.push(LedgerEntry {
            changeset_id,
            entity,
        });
    }

    /// Clear the deletion marker of `entity` and drop its record from
    /// `changeset_id`.
    pub fn restore(&mut self, changeset_id: Uuid, entity: EntityRef) {
        self.restores.push(entity);
        self.unrecorded.push(LedgerEntry {
            changeset_id,
            entity,
        });
    }

    /// Permanently remove `entity`, and its record in `changeset_id`
    /// when it had one.
    pub fn discard(&mut self, changeset_id: Option<Uuid>, entity: EntityRef) {
        self.hard_deletes.push(entity);
        if let Some(changeset_id) = changeset_id {
            self.unrecorded.push(LedgerEntry {
                changeset_id,
                entity,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::EntityKind;

    #[test]
    fn new_batch_is_empty() {
        assert!(ChangeBatch::new(Utc::now()).is_empty());
    }

    #[test]
    fn soft_delete_records_in_changeset() {
        let mut batch = ChangeBatch::new(Utc::now());
        let cs = Uuid::new_v4();
        let entity = EntityRef::new(EntityKind::AppliedRole, Uuid::new_v4());
        batch.soft_delete(cs, entity);
        assert_eq!(batch.soft_deletes, vec![entity]);
        assert_eq!(
            batch.recorded,
            vec![LedgerEntry {
                changeset_id: cs,
                entity
            }]
        );
        assert!(!batch.is_empty());
    }

    #[test]
    fn discard_without_changeset_only_deletes() {
        let mut batch = ChangeBatch::new(Utc::now());
        let entity = EntityRef::group(Uuid::new_v4());
        batch.discard(None, entity);
        assert_eq!(batch.hard_deletes, vec![entity]);
        assert!(batch.unrecorded.is_empty());
    }
}
