//! Changeset recovery.
//!
//! Recovery replays a changeset in reverse. Records the caller may not
//! restore stay soft-deleted in the changeset; closure rows whose old
//! position no longer fits the live tree are discarded so the group
//! comes back as a detached root.

use std::collections::BTreeSet;

use arbor_core::batch::{ChangeBatch, LedgerEntry};
use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::account::PrivilegeStatus;
use arbor_core::models::changeset::{Changeset, RecoveryStatus};
use arbor_core::models::closure::GroupClosure;
use arbor_core::models::entity::{DeletionScope, EntityKind, EntityRef, SoftDeletable};
use arbor_core::repository::{ChangesetRepository, ClosureRepository, Store};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::closure::shift_depth;
use crate::error::TreeError;
use crate::ledger::{LedgerEntity, load_entities, record_undelete};

/// How much of a changeset an undelete brings back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Every record the caller may restore.
    #[default]
    Full,
    /// Only the top-level entity. Its dependents stay deleted in the
    /// changeset; a group's old closure paths are discarded.
    TopLevelOnly,
}

/// Per-record restore permission.
pub trait RecoveryPolicy: Send + Sync {
    fn may_recover(&self, entity: &LedgerEntity) -> bool;
}

/// Permission by privilege tier: superusers restore anything, staff
/// anything but superuser grants, everyone else only tree structure
/// and memberships.
#[derive(Debug, Clone, Copy)]
pub struct PrivilegeRecoveryPolicy {
    pub tier: PrivilegeStatus,
    pub superuser_role_id: Uuid,
}

impl RecoveryPolicy for PrivilegeRecoveryPolicy {
    fn may_recover(&self, entity: &LedgerEntity) -> bool {
        match self.tier {
            PrivilegeStatus::Superuser => true,
            PrivilegeStatus::Staff => match entity {
                LedgerEntity::AppliedRole(role) => role.role_id != self.superuser_role_id,
                _ => true,
            },
            PrivilegeStatus::None => entity.entity_ref().kind.is_structural(),
        }
    }
}

/// Only the actor that opened a changeset, or a superuser, may replay
/// it.
pub fn authorize(changeset: &Changeset, actor_id: Uuid, tier: PrivilegeStatus) -> ArborResult<()> {
    if changeset.actor_id == actor_id || tier == PrivilegeStatus::Superuser {
        Ok(())
    } else {
        warn!(
            changeset = %changeset.id,
            actor = %actor_id,
            "Recovery refused: changeset belongs to another actor"
        );
        Err(ArborError::PermissionDenied {
            reason: format!("changeset {} was opened by another actor", changeset.id),
        })
    }
}

/// The single direct parent recorded in `group`'s deleted ancestor
/// rows, or `None` if it was a root.
pub fn deleted_parent(group: Uuid, rows: &[GroupClosure]) -> Result<Option<Uuid>, TreeError> {
    let ancestors: Vec<&GroupClosure> = rows
        .iter()
        .filter(|r| r.descendant_id == group && !r.is_self_row())
        .collect();
    if ancestors.is_empty() {
        return Ok(None);
    }
    let parents: Vec<Uuid> = ancestors
        .iter()
        .filter(|r| r.depth == 1)
        .map(|r| r.ancestor_id)
        .collect();
    match parents.as_slice() {
        [parent] => Ok(Some(*parent)),
        [] => Err(TreeError::MissingLink {
            group,
            side: "ancestor",
        }),
        _ => Err(TreeError::AmbiguousParent {
            group,
            count: parents.len(),
        }),
    }
}

/// Direct children recorded in `group`'s deleted descendant rows.
pub fn deleted_children(group: Uuid, rows: &[GroupClosure]) -> Result<Vec<Uuid>, TreeError> {
    let descendants: Vec<&GroupClosure> = rows
        .iter()
        .filter(|r| r.ancestor_id == group && !r.is_self_row())
        .collect();
    let children: Vec<Uuid> = descendants
        .iter()
        .filter(|r| r.depth == 1)
        .map(|r| r.descendant_id)
        .collect();
    if !descendants.is_empty() && children.is_empty() {
        return Err(TreeError::MissingLink {
            group,
            side: "descendant",
        });
    }
    Ok(children)
}

/// Live rows around a deleted group, read before deciding whether its
/// old closure rows still fit.
#[derive(Debug, Default)]
pub struct LiveNeighbourhood {
    /// Active rows with `descendant = parent`.
    pub parent_ancestors: Vec<GroupClosure>,
    /// Active rows whose ancestor is one of the deleted children.
    pub child_subtrees: Vec<GroupClosure>,
    /// Active rows whose descendant is one of the deleted children.
    pub child_ancestors: Vec<GroupClosure>,
}

/// Whether `group`'s deleted closure rows can be restored as they are.
///
/// The parent's live ancestor chain must equal the deleted ancestor
/// rows one level up, the children's live subtrees must equal the
/// deleted descendant rows one level down, and every child must still
/// sit directly under the parent (or be a root if the group was one).
pub fn topology_intact(
    group: Uuid,
    parent: Option<Uuid>,
    children: &[Uuid],
    deleted_rows: &[GroupClosure],
    live: &LiveNeighbourhood,
) -> bool {
    let expected_above: BTreeSet<(Uuid, u32)> = deleted_rows
        .iter()
        .filter(|r| r.descendant_id == group && !r.is_self_row())
        .map(|r| (r.ancestor_id, r.depth))
        .collect();
    let actual_above: BTreeSet<(Uuid, u32)> = match parent {
        Some(p) => live
            .parent_ancestors
            .iter()
            .filter(|r| r.descendant_id == p)
            .map(|r| (r.ancestor_id, r.depth + 1))
            .collect(),
        None => BTreeSet::new(),
    };
    if expected_above != actual_above {
        return false;
    }

    let expected_below: BTreeSet<(Uuid, u32)> = deleted_rows
        .iter()
        .filter(|r| r.ancestor_id == group && !r.is_self_row())
        .map(|r| (r.descendant_id, r.depth))
        .collect();
    let actual_below: BTreeSet<(Uuid, u32)> = live
        .child_subtrees
        .iter()
        .filter(|r| children.contains(&r.ancestor_id))
        .map(|r| (r.descendant_id, r.depth + 1))
        .collect();
    if expected_below != actual_below {
        return false;
    }

    children.iter().all(|child| {
        let mut above = live
            .child_ancestors
            .iter()
            .filter(|r| r.descendant_id == *child && !r.is_self_row());
        match parent {
            Some(p) => above.any(|r| r.ancestor_id == p && r.depth == 1),
            None => above.next().is_none(),
        }
    })
}

/// Everything a recovery will write, plus what it decided.
#[derive(Debug)]
pub struct RecoveryPlan {
    pub batch: ChangeBatch,
    pub status: RecoveryStatus,
    pub restored: Vec<EntityRef>,
    pub evicted: Vec<EntityRef>,
    pub discarded: Vec<EntityRef>,
}

impl RecoveryPlan {
    pub fn restored_kind(&self, kind: EntityKind) -> bool {
        self.restored.iter().any(|e| e.kind == kind)
    }
}

/// Compute the recovery of `changeset`. Nothing is written.
pub async fn plan_recovery<S: Store, P: RecoveryPolicy>(
    store: &S,
    changeset: &Changeset,
    policy: &P,
    mode: RecoveryMode,
    now: DateTime<Utc>,
) -> ArborResult<RecoveryPlan> {
    let records = store.changesets().records(changeset.id).await?;
    let mut batch = ChangeBatch::new(now);
    let mut restored = Vec::new();
    let mut evicted = Vec::new();
    let mut discarded = Vec::new();
    let mut settled = 0usize;

    let mut candidates = Vec::new();
    for (entity, loaded) in load_entities(store, &records).await? {
        match loaded {
            Some(value) if value.is_deleted() => candidates.push(value),
            Some(_) => {
                debug!(%entity, "Record already active, dropping from changeset");
                batch.unrecorded.push(LedgerEntry {
                    changeset_id: changeset.id,
                    entity,
                });
                settled += 1;
            }
            None => {
                warn!(%entity, changeset = %changeset.id, "Recorded entity no longer exists");
                batch.unrecorded.push(LedgerEntry {
                    changeset_id: changeset.id,
                    entity,
                });
                settled += 1;
            }
        }
    }

    let top = changeset.entity;
    let top_denied = candidates
        .iter()
        .any(|c| c.entity_ref() == top && !policy.may_recover(c));
    if top_denied {
        warn!(%top, changeset = %changeset.id, "Recovery refused for top-level entity");
        return Err(ArborError::PermissionDenied {
            reason: format!("not allowed to restore {top}"),
        });
    }

    let (closure_rows, others): (Vec<LedgerEntity>, Vec<LedgerEntity>) = candidates
        .into_iter()
        .partition(|c| matches!(c, LedgerEntity::Closure(_)));
    let closure_rows: Vec<GroupClosure> = closure_rows
        .into_iter()
        .filter_map(|c| match c {
            LedgerEntity::Closure(row) => Some(row),
            _ => None,
        })
        .collect();

    // Closure rows.
    let (self_rows, linked_rows): (Vec<GroupClosure>, Vec<GroupClosure>) =
        closure_rows.into_iter().partition(GroupClosure::is_self_row);
    for row in &self_rows {
        record_undelete(&mut batch, changeset.id, row.entity_ref());
        restored.push(row.entity_ref());
    }
    if !linked_rows.is_empty() {
        let keep = match (mode, top.kind) {
            (RecoveryMode::Full, EntityKind::Group) => {
                restore_links(store, top.id, &linked_rows, &mut batch).await?
            }
            (RecoveryMode::Full, _) => true,
            (RecoveryMode::TopLevelOnly, _) => false,
        };
        for row in &linked_rows {
            if keep {
                record_undelete(&mut batch, changeset.id, row.entity_ref());
                restored.push(row.entity_ref());
            } else {
                batch.discard(Some(changeset.id), row.entity_ref());
                discarded.push(row.entity_ref());
            }
        }
    }

    // Everything else.
    for value in &others {
        let entity = value.entity_ref();
        let wanted = match mode {
            RecoveryMode::Full => true,
            RecoveryMode::TopLevelOnly => entity == top,
        };
        if !wanted {
            evicted.push(entity);
        } else if policy.may_recover(value) {
            record_undelete(&mut batch, changeset.id, entity);
            restored.push(entity);
        } else {
            warn!(%entity, changeset = %changeset.id, "Record evicted from recovery");
            evicted.push(entity);
        }
    }

    settled += restored.len() + discarded.len();
    if settled >= records.len() {
        batch.dropped_changesets.push(changeset.id);
    }

    let status = if restored.is_empty() {
        RecoveryStatus::Nothing
    } else if evicted.is_empty() && discarded.is_empty() {
        RecoveryStatus::DoneFull
    } else {
        RecoveryStatus::DonePartial
    };

    debug!(
        changeset = %changeset.id,
        restored = restored.len(),
        evicted = evicted.len(),
        discarded = discarded.len(),
        ?status,
        "Recovery planned"
    );

    Ok(RecoveryPlan {
        batch,
        status,
        restored,
        evicted,
        discarded,
    })
}

/// Check whether `group`'s deleted non-self rows still fit; if so, add
/// the +1 depth shift that undoes the delete to `batch`.
async fn restore_links<S: Store>(
    store: &S,
    group: Uuid,
    rows: &[GroupClosure],
    batch: &mut ChangeBatch,
) -> ArborResult<bool> {
    let parent = deleted_parent(group, rows)?;
    let children = deleted_children(group, rows)?;

    let live = LiveNeighbourhood {
        parent_ancestors: match parent {
            Some(p) => {
                store
                    .closure()
                    .ancestors_of(&[p], DeletionScope::Active)
                    .await?
            }
            None => Vec::new(),
        },
        child_subtrees: store
            .closure()
            .descendants_of(&children, DeletionScope::Active)
            .await?,
        child_ancestors: store
            .closure()
            .ancestors_of(&children, DeletionScope::Active)
            .await?,
    };

    if !topology_intact(group, parent, &children, rows, &live) {
        warn!(%group, "Closure paths no longer fit the tree, restoring as root");
        return Ok(false);
    }

    let above: Vec<Uuid> = rows
        .iter()
        .filter(|r| r.descendant_id == group)
        .map(|r| r.ancestor_id)
        .collect();
    let below: Vec<Uuid> = rows
        .iter()
        .filter(|r| r.ancestor_id == group)
        .map(|r| r.descendant_id)
        .collect();
    let through = store
        .closure()
        .paths_between(&above, &below, DeletionScope::Active)
        .await?;
    batch.depth_updates.extend(shift_depth(&through, 1)?);

    Ok(true)
}
