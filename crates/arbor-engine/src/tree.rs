//! Tree Mutation Engine.
//!
//! Group create, delete, undelete and move. Every mutation runs under
//! the context's tree lock and lands as one `ChangeBatch`.

use std::collections::{BTreeSet, HashMap};

use arbor_core::batch::{ChangeBatch, NewGroup};
use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::changeset::{Changeset, RecoveryStatus};
use arbor_core::models::closure::GroupClosure;
use arbor_core::models::entity::{DeletionScope, EntityRef, SoftDeletable, Subject};
use arbor_core::models::group::{CreateGroup, Group};
use arbor_core::repository::{
    AppliedRoleRepository, ChangesetRepository, ClosureRepository, GroupRepository,
    MembershipRepository, QuotaRepository, Store, UnitOfWork,
};
use arbor_core::task::PrivilegeRefreshTask;
use tracing::{debug, info};
use uuid::Uuid;

use crate::closure::{detach_reattach, insert_subtree, paths_through_node, shift_depth};
use crate::context::{ActorContext, EngineContext};
use crate::ledger::{open_changeset, record_soft_delete, resolve_changeset};
use crate::privilege::PrivilegeResolver;
use crate::recovery::{PrivilegeRecoveryPolicy, RecoveryMode, authorize, plan_recovery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Reversible through the changeset ledger.
    #[default]
    Soft,
    /// Permanent; nothing is recorded.
    Hard,
}

pub struct TreeService<S: Store> {
    ctx: EngineContext<S>,
    privileges: PrivilegeResolver<S>,
}

impl<S: Store> Clone for TreeService<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            privileges: self.privileges.clone(),
        }
    }
}

fn validate_name(name: &str) -> ArborResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ArborError::Validation {
            message: "group name must not be empty".into(),
        });
    }
    Ok(name.to_string())
}

fn group_not_found(id: Uuid) -> ArborError {
    ArborError::NotFound {
        entity: "group".into(),
        id: id.to_string(),
    }
}

impl<S: Store> TreeService<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        let privileges = PrivilegeResolver::new(ctx.clone());
        Self { ctx, privileges }
    }

    /// Create a group, as a root or under an active parent.
    pub async fn create_group(&self, actor: ActorContext, input: CreateGroup) -> ArborResult<Group> {
        let name = validate_name(&input.name)?;
        let _guard = self.ctx.tree_lock.lock().await;

        let parent_ancestors = match input.parent_id {
            Some(parent) => {
                let rows = self
                    .ctx
                    .store
                    .closure()
                    .ancestors_of(&[parent], DeletionScope::Active)
                    .await?;
                if rows.is_empty() {
                    return Err(group_not_found(parent));
                }
                rows
            }
            None => Vec::new(),
        };

        let id = Uuid::new_v4();
        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        batch.new_groups.push(NewGroup { id, name });
        batch.new_paths = insert_subtree(id, &parent_ancestors);
        self.ctx.store.writer().commit(batch).await?;

        info!(
            group = %id,
            parent = ?input.parent_id,
            actor = %actor.actor_id,
            "Group created"
        );
        self.ctx.store.groups().get_by_id(id, DeletionScope::Active).await
    }

    pub async fn rename_group(&self, id: Uuid, name: &str) -> ArborResult<Group> {
        let name = validate_name(name)?;
        let group = self.ctx.store.groups().rename(id, name).await?;
        debug!(group = %id, name = %group.name, "Group renamed");
        Ok(group)
    }

    /// Delete a group.
    ///
    /// A soft delete shortens every path running through the group by
    /// one, then soft-deletes the group, its own closure rows, roles,
    /// quota and memberships under a new changeset, which is returned.
    /// Soft-deleting a group that is already deleted does nothing.
    ///
    /// A hard delete removes all of it permanently, along with the
    /// changesets the group was the top-level entity of.
    pub async fn delete_group(
        &self,
        actor: ActorContext,
        id: Uuid,
        mode: DeleteMode,
    ) -> ArborResult<Option<Changeset>> {
        let _guard = self.ctx.tree_lock.lock().await;
        let group = self.ctx.store.groups().get_by_id(id, DeletionScope::All).await?;

        match mode {
            DeleteMode::Soft if group.is_deleted() => {
                debug!(group = %id, "Group already deleted");
                Ok(None)
            }
            DeleteMode::Soft => self.soft_delete(actor, &group).await.map(Some),
            DeleteMode::Hard => self.hard_delete(actor, &group).await.map(|()| None),
        }
    }

    async fn soft_delete(&self, actor: ActorContext, group: &Group) -> ArborResult<Changeset> {
        let store = &self.ctx.store;
        let scope = DeletionScope::Active;

        let through = paths_through_node(store, group.id, scope).await?;
        let own_rows = self.own_rows(group.id, scope).await?;
        let subject = [Subject::Group(group.id)];
        let roles = store.applied_roles().list_for_subjects(&subject, scope).await?;
        let quotas = store.quotas().list_for_subjects(&subject, scope).await?;
        let members = store.memberships().list_by_groups(&[group.id], scope).await?;

        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        batch.depth_updates = shift_depth(&through, -1)?;

        let changeset = open_changeset(&mut batch, actor.actor_id, group.entity_ref());
        let cascade = std::iter::once(group.entity_ref())
            .chain(own_rows.iter().map(SoftDeletable::entity_ref))
            .chain(roles.iter().map(SoftDeletable::entity_ref))
            .chain(quotas.iter().map(SoftDeletable::entity_ref))
            .chain(members.iter().map(SoftDeletable::entity_ref));
        for entity in cascade {
            record_soft_delete(&mut batch, &changeset, entity);
        }

        let recorded = batch.recorded.len();
        store.writer().commit(batch).await?;

        info!(
            group = %group.id,
            changeset = %changeset.id,
            actor = %actor.actor_id,
            shifted = through.len(),
            recorded,
            "Group soft-deleted"
        );
        self.ctx.dispatch(PrivilegeRefreshTask::Groups {
            group_ids: vec![group.id],
            deleted: true,
        });
        Ok(changeset)
    }

    async fn hard_delete(&self, actor: ActorContext, group: &Group) -> ArborResult<()> {
        let store = &self.ctx.store;
        let all = DeletionScope::All;

        let affected = self.privileges.affected_profiles(&[group.id], true).await?;

        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        if !group.is_deleted() {
            let through = paths_through_node(store, group.id, DeletionScope::Active).await?;
            batch.depth_updates = shift_depth(&through, -1)?;
        }

        let own_rows = self.own_rows(group.id, all).await?;
        let subject = [Subject::Group(group.id)];
        let roles = store.applied_roles().list_for_subjects(&subject, all).await?;
        let quotas = store.quotas().list_for_subjects(&subject, all).await?;
        let members = store.memberships().list_by_groups(&[group.id], all).await?;

        let doomed = std::iter::once(group.entity_ref())
            .chain(own_rows.iter().map(SoftDeletable::entity_ref))
            .chain(roles.iter().map(SoftDeletable::entity_ref))
            .chain(quotas.iter().map(SoftDeletable::entity_ref))
            .chain(members.iter().map(SoftDeletable::entity_ref));
        for entity in doomed {
            batch.discard(None, entity);
        }
        batch.dropped_changesets = store
            .changesets()
            .list_by_top_entity(group.entity_ref())
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let removed = batch.hard_deletes.len();
        store.writer().commit(batch).await?;

        info!(
            group = %group.id,
            actor = %actor.actor_id,
            removed,
            "Group hard-deleted"
        );
        self.ctx.dispatch(PrivilegeRefreshTask::Profiles {
            profile_ids: affected.into_iter().collect(),
        });
        Ok(())
    }

    /// Bring a soft-deleted group back from `changeset`, or from the
    /// actor's latest changeset holding it when `None`.
    pub async fn undelete_group(
        &self,
        actor: ActorContext,
        id: Uuid,
        changeset: Option<Uuid>,
        mode: RecoveryMode,
    ) -> ArborResult<RecoveryStatus> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        let group = store.groups().get_by_id(id, DeletionScope::All).await?;
        let entity = group.entity_ref();
        if !group.is_deleted() {
            return Err(ArborError::ChangesetMismatch {
                entity: entity.kind.to_string(),
                id: id.to_string(),
                changeset: changeset.map_or_else(|| "none".into(), |c| c.to_string()),
            });
        }

        let changeset = resolve_changeset(store, entity, actor.actor_id, changeset).await?;
        let tier = self.privileges.privilege_status(actor.actor_id).await?;
        authorize(&changeset, actor.actor_id, tier)?;

        let policy = PrivilegeRecoveryPolicy {
            tier,
            superuser_role_id: self.ctx.config.superuser_role_id,
        };
        let plan = plan_recovery(store, &changeset, &policy, mode, self.ctx.clock.now()).await?;
        store.writer().commit(plan.batch).await?;

        info!(
            group = %id,
            changeset = %changeset.id,
            actor = %actor.actor_id,
            status = ?plan.status,
            restored = plan.restored.len(),
            evicted = plan.evicted.len(),
            discarded = plan.discarded.len(),
            "Group recovered"
        );
        self.ctx.dispatch(PrivilegeRefreshTask::Groups {
            group_ids: vec![id],
            deleted: false,
        });
        Ok(plan.status)
    }

    /// Move `id` and its subtree under `new_parent`, or out to a root.
    /// Fails with `LoopDetected` when `new_parent` lies in the subtree;
    /// nothing is written then.
    pub async fn move_group(
        &self,
        actor: ActorContext,
        id: Uuid,
        new_parent: Option<Uuid>,
    ) -> ArborResult<()> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        store.groups().get_by_id(id, DeletionScope::Active).await?;

        let current = self.parent_id(id).await?;
        if current == new_parent {
            debug!(group = %id, "Group already under requested parent");
            return Ok(());
        }

        let plan = detach_reattach(store, id, new_parent).await?;
        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        for row in &plan.removed {
            batch.discard(None, EntityRef::closure(*row));
        }
        let (removed, added) = (plan.removed.len(), plan.added.len());
        batch.new_paths = plan.added;
        store.writer().commit(batch).await?;

        info!(
            group = %id,
            from = ?current,
            to = ?new_parent,
            actor = %actor.actor_id,
            removed,
            added,
            "Group moved"
        );
        self.ctx.dispatch(PrivilegeRefreshTask::Groups {
            group_ids: vec![id],
            deleted: false,
        });
        Ok(())
    }

    pub async fn get_group(&self, id: Uuid, scope: DeletionScope) -> ArborResult<Group> {
        self.ctx.store.groups().get_by_id(id, scope).await
    }

    pub async fn paths_through_node(
        &self,
        id: Uuid,
        scope: DeletionScope,
    ) -> ArborResult<Vec<GroupClosure>> {
        paths_through_node(&self.ctx.store, id, scope).await
    }

    /// Active proper ancestors of `id`, nearest first.
    pub async fn ancestors(&self, id: Uuid) -> ArborResult<Vec<Group>> {
        let rows = self
            .ctx
            .store
            .closure()
            .ancestors_of(&[id], DeletionScope::Active)
            .await?;
        self.groups_in_order(rows.iter().filter(|r| r.depth > 0).map(|r| r.ancestor_id))
            .await
    }

    /// Active proper descendants of `id`, shallowest first.
    pub async fn descendants(&self, id: Uuid) -> ArborResult<Vec<Group>> {
        let rows = self
            .ctx
            .store
            .closure()
            .descendants_of(&[id], DeletionScope::Active)
            .await?;
        self.groups_in_order(rows.iter().filter(|r| r.depth > 0).map(|r| r.descendant_id))
            .await
    }

    pub async fn parent(&self, id: Uuid) -> ArborResult<Option<Group>> {
        match self.parent_id(id).await? {
            Some(parent) => self
                .ctx
                .store
                .groups()
                .get_by_id(parent, DeletionScope::Active)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    pub async fn children(&self, id: Uuid) -> ArborResult<Vec<Group>> {
        let rows = self
            .ctx
            .store
            .closure()
            .descendants_of(&[id], DeletionScope::Active)
            .await?;
        self.groups_in_order(rows.iter().filter(|r| r.depth == 1).map(|r| r.descendant_id))
            .await
    }

    async fn parent_id(&self, id: Uuid) -> ArborResult<Option<Uuid>> {
        let rows = self
            .ctx
            .store
            .closure()
            .ancestors_of(&[id], DeletionScope::Active)
            .await?;
        Ok(rows.iter().find(|r| r.depth == 1).map(|r| r.ancestor_id))
    }

    /// Rows with the group at either end, each once.
    async fn own_rows(&self, id: Uuid, scope: DeletionScope) -> ArborResult<Vec<GroupClosure>> {
        let closure = self.ctx.store.closure();
        let mut rows = closure.ancestors_of(&[id], scope).await?;
        rows.extend(closure.descendants_of(&[id], scope).await?);
        let mut seen = BTreeSet::new();
        rows.retain(|r| seen.insert(r.id));
        Ok(rows)
    }

    async fn groups_in_order(&self, ids: impl Iterator<Item = Uuid>) -> ArborResult<Vec<Group>> {
        let ids: Vec<Uuid> = ids.collect();
        let mut by_id: HashMap<Uuid, Group> = self
            .ctx
            .store
            .groups()
            .list_by_ids(&ids, DeletionScope::Active)
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert!(matches!(
            validate_name("   "),
            Err(ArborError::Validation { .. })
        ));
        assert_eq!(validate_name("  ops ").ok().as_deref(), Some("ops"));
    }

    #[test]
    fn soft_is_the_default_delete() {
        assert_eq!(DeleteMode::default(), DeleteMode::Soft);
    }
}
