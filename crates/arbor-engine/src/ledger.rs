//! Changeset / soft-delete ledger.

use std::collections::HashMap;

use arbor_core::batch::ChangeBatch;
use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::changeset::{Changeset, SoftDeleteRecord};
use arbor_core::models::closure::GroupClosure;
use arbor_core::models::entity::{DeletionScope, EntityKind, EntityRef, SoftDeletable};
use arbor_core::models::group::Group;
use arbor_core::models::membership::GroupRelation;
use arbor_core::models::profile::Profile;
use arbor_core::models::quota::QuotaRelation;
use arbor_core::models::role::AppliedRole;
use arbor_core::repository::{
    AppliedRoleRepository, ChangesetRepository, ClosureRepository, GroupRepository,
    MembershipRepository, ProfileRepository, QuotaRepository, Store,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Open a changeset attributed to `actor_id` for a delete issued
/// against `entity`.
pub fn open_changeset(batch: &mut ChangeBatch, actor_id: Uuid, entity: EntityRef) -> Changeset {
    let changeset = Changeset {
        id: Uuid::new_v4(),
        actor_id,
        entity,
        created_at: batch.now,
    };
    batch.opened_changesets.push(changeset.clone());
    changeset
}

pub fn record_soft_delete(batch: &mut ChangeBatch, changeset: &Changeset, entity: EntityRef) {
    batch.soft_delete(changeset.id, entity);
}

pub fn record_undelete(batch: &mut ChangeBatch, changeset_id: Uuid, entity: EntityRef) {
    batch.restore(changeset_id, entity);
}

/// Find the changeset an undelete of `entity` should replay.
///
/// With an explicit `requested` id the changeset must exist and hold a
/// record for `entity`. Without one, the most recent changeset opened
/// by `actor_id` that holds such a record is used.
pub async fn resolve_changeset<S: Store>(
    store: &S,
    entity: EntityRef,
    actor_id: Uuid,
    requested: Option<Uuid>,
) -> ArborResult<Changeset> {
    let mismatch = |changeset: String| ArborError::ChangesetMismatch {
        entity: entity.kind.to_string(),
        id: entity.id.to_string(),
        changeset,
    };

    match requested {
        Some(id) => {
            let changeset = match store.changesets().get_by_id(id).await {
                Ok(changeset) => changeset,
                Err(ArborError::NotFound { .. }) => return Err(mismatch(id.to_string())),
                Err(e) => return Err(e),
            };
            let records = store.changesets().records(id).await?;
            if records.iter().any(|r| r.entity == entity) {
                Ok(changeset)
            } else {
                Err(mismatch(id.to_string()))
            }
        }
        None => store
            .changesets()
            .latest_for_entity(entity, actor_id)
            .await?
            .ok_or_else(|| mismatch("none".into())),
    }
}

/// A row the ledger can restore, loaded with its deletion marker.
#[derive(Debug, Clone)]
pub enum LedgerEntity {
    Group(Group),
    Closure(GroupClosure),
    Profile(Profile),
    Membership(GroupRelation),
    AppliedRole(AppliedRole),
    Quota(QuotaRelation),
}

impl SoftDeletable for LedgerEntity {
    fn entity_ref(&self) -> EntityRef {
        match self {
            LedgerEntity::Group(g) => g.entity_ref(),
            LedgerEntity::Closure(c) => c.entity_ref(),
            LedgerEntity::Profile(p) => p.entity_ref(),
            LedgerEntity::Membership(m) => m.entity_ref(),
            LedgerEntity::AppliedRole(r) => r.entity_ref(),
            LedgerEntity::Quota(q) => q.entity_ref(),
        }
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            LedgerEntity::Group(g) => g.deleted_at(),
            LedgerEntity::Closure(c) => c.deleted_at(),
            LedgerEntity::Profile(p) => p.deleted_at(),
            LedgerEntity::Membership(m) => m.deleted_at(),
            LedgerEntity::AppliedRole(r) => r.deleted_at(),
            LedgerEntity::Quota(q) => q.deleted_at(),
        }
    }
}

/// `Ok(None)` for a `NotFound`, everything else passes through.
fn found<T>(result: ArborResult<T>) -> ArborResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ArborError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Load every entity the records point to, in record order. Entities
/// that no longer exist map to `None`.
pub async fn load_entities<S: Store>(
    store: &S,
    records: &[SoftDeleteRecord],
) -> ArborResult<Vec<(EntityRef, Option<LedgerEntity>)>> {
    let closure_ids: Vec<Uuid> = records
        .iter()
        .filter(|r| r.entity.kind == EntityKind::GroupClosure)
        .map(|r| r.entity.id)
        .collect();
    let mut closure_rows: HashMap<Uuid, GroupClosure> = store
        .closure()
        .list_by_ids(&closure_ids, DeletionScope::All)
        .await?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    let all = DeletionScope::All;
    let mut loaded = Vec::with_capacity(records.len());
    for record in records {
        let entity = record.entity;
        let value = match entity.kind {
            EntityKind::GroupClosure => closure_rows.remove(&entity.id).map(LedgerEntity::Closure),
            EntityKind::Group => found(store.groups().get_by_id(entity.id, all).await)?
                .map(LedgerEntity::Group),
            EntityKind::Profile => found(store.profiles().get_by_id(entity.id, all).await)?
                .map(LedgerEntity::Profile),
            EntityKind::GroupRelation => {
                found(store.memberships().get_by_id(entity.id, all).await)?
                    .map(LedgerEntity::Membership)
            }
            EntityKind::AppliedRole => {
                found(store.applied_roles().get_by_id(entity.id, all).await)?
                    .map(LedgerEntity::AppliedRole)
            }
            EntityKind::QuotaRelation => found(store.quotas().get_by_id(entity.id, all).await)?
                .map(LedgerEntity::Quota),
        };
        loaded.push((entity, value));
    }

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_changeset_is_stamped_with_batch_time() {
        let now = Utc::now();
        let mut batch = ChangeBatch::new(now);
        let actor = Uuid::new_v4();
        let entity = EntityRef::group(Uuid::new_v4());

        let changeset = open_changeset(&mut batch, actor, entity);
        record_soft_delete(&mut batch, &changeset, entity);

        assert_eq!(changeset.created_at, now);
        assert_eq!(batch.opened_changesets.len(), 1);
        assert_eq!(batch.recorded[0].changeset_id, changeset.id);
        assert_eq!(batch.soft_deletes, vec![entity]);
    }

    #[test]
    fn ledger_entity_delegates_marker() {
        let now = Utc::now();
        let entity = LedgerEntity::Closure(GroupClosure {
            id: Uuid::new_v4(),
            ancestor_id: Uuid::new_v4(),
            descendant_id: Uuid::new_v4(),
            depth: 1,
            deleted_at: Some(now),
        });
        assert!(entity.is_deleted());
        assert_eq!(entity.entity_ref().kind, EntityKind::GroupClosure);
    }
}
