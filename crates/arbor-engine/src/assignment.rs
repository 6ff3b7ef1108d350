//! Role, quota and membership assignment.

use arbor_core::batch::ChangeBatch;
use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::account::PrivilegeStatus;
use arbor_core::models::entity::{DeletionScope, SoftDeletable, Subject};
use arbor_core::models::membership::{CreateGroupRelation, GroupRelation};
use arbor_core::models::quota::{
    CreateQuotaMaterial, CreateQuotaRelation, QuotaMaterial, QuotaRelation,
};
use arbor_core::models::role::{AppliedRole, CreateAppliedRole, CreateRole, Role};
use arbor_core::repository::{
    AccountRepository, AppliedRoleRepository, GroupRepository, MembershipRepository,
    ProfileRepository, QuotaRepository, RoleRepository, Store, UnitOfWork,
};
use arbor_core::task::PrivilegeRefreshTask;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{ActorContext, EngineContext};
use crate::privilege::PrivilegeResolver;

/// Refresh task covering everyone a grant on `subject` reaches.
fn refresh_for(subject: Subject) -> PrivilegeRefreshTask {
    match subject {
        Subject::Group(id) => PrivilegeRefreshTask::Groups {
            group_ids: vec![id],
            deleted: false,
        },
        Subject::Profile(id) => PrivilegeRefreshTask::Profiles {
            profile_ids: vec![id],
        },
    }
}

pub struct AssignmentService<S: Store> {
    ctx: EngineContext<S>,
    privileges: PrivilegeResolver<S>,
}

impl<S: Store> Clone for AssignmentService<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            privileges: self.privileges.clone(),
        }
    }
}

impl<S: Store> AssignmentService<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        let privileges = PrivilegeResolver::new(ctx.clone());
        Self { ctx, privileges }
    }

    /// Create the reserved superuser and staff roles if missing.
    pub async fn ensure_reserved_roles(&self) -> ArborResult<()> {
        let reserved = [
            (self.ctx.config.superuser_role_id, "superuser", "Full administrative access"),
            (self.ctx.config.staff_role_id, "staff", "Staff access"),
        ];
        let roles = self.ctx.store.roles();
        for (id, name, description) in reserved {
            if roles.find_by_id(id).await?.is_some() {
                continue;
            }
            roles
                .create(CreateRole {
                    id: Some(id),
                    name: name.into(),
                    description: description.into(),
                    permissions: Vec::new(),
                })
                .await?;
            info!(role = %id, name, "Reserved role created");
        }
        Ok(())
    }

    pub async fn create_role(&self, input: CreateRole) -> ArborResult<Role> {
        if input.name.trim().is_empty() {
            return Err(ArborError::Validation {
                message: "role name must not be empty".into(),
            });
        }
        let role = self.ctx.store.roles().create(input).await?;
        info!(role = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    /// Callers hold the tree lock until their insert commits.
    async fn ensure_active(&self, subject: Subject) -> ArborResult<()> {
        let store = &self.ctx.store;
        match subject {
            Subject::Group(id) => {
                store.groups().get_by_id(id, DeletionScope::Active).await?;
            }
            Subject::Profile(id) => {
                store.profiles().get_by_id(id, DeletionScope::Active).await?;
            }
        }
        Ok(())
    }

    /// Apply a role to a group or profile. Granting the reserved
    /// superuser role takes a superuser, except while no active
    /// superuser exists at all.
    pub async fn apply_role(
        &self,
        actor: ActorContext,
        mut input: CreateAppliedRole,
    ) -> ArborResult<AppliedRole> {
        let _guard = self.ctx.tree_lock.lock().await;
        self.ensure_active(input.subject).await?;
        let store = &self.ctx.store;
        store.roles().get_by_id(input.role_id).await?;

        if input.role_id == self.ctx.config.superuser_role_id {
            let bootstrap = store.accounts().count_active_superusers().await? == 0;
            let tier = self.privileges.privilege_status(actor.actor_id).await?;
            if !bootstrap && tier != PrivilegeStatus::Superuser {
                warn!(actor = %actor.actor_id, "Superuser grant refused");
                return Err(ArborError::PermissionDenied {
                    reason: "only a superuser may grant the superuser role".into(),
                });
            }
        }

        input.approved_by = input.approved_by.or(Some(actor.actor_id));
        let applied = store.applied_roles().create(input).await?;
        info!(
            applied_role = %applied.id,
            role = %applied.role_id,
            subject = %applied.subject.entity_ref(),
            actor = %actor.actor_id,
            "Role applied"
        );
        self.ctx.dispatch(refresh_for(applied.subject));
        Ok(applied)
    }

    /// Permanently remove an applied role.
    pub async fn revoke_role(&self, actor: ActorContext, applied_role_id: Uuid) -> ArborResult<()> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        let applied = store
            .applied_roles()
            .get_by_id(applied_role_id, DeletionScope::All)
            .await?;

        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        batch.discard(None, applied.entity_ref());
        store.writer().commit(batch).await?;

        info!(
            applied_role = %applied.id,
            role = %applied.role_id,
            actor = %actor.actor_id,
            "Role revoked"
        );
        self.ctx.dispatch(refresh_for(applied.subject));
        Ok(())
    }

    pub async fn create_material(&self, input: CreateQuotaMaterial) -> ArborResult<QuotaMaterial> {
        if input.app_code.trim().is_empty() || input.mat_code.trim().is_empty() {
            return Err(ArborError::Validation {
                message: "quota material codes must not be empty".into(),
            });
        }
        let material = self.ctx.store.quotas().create_material(input).await?;
        info!(
            material = %material.id,
            app = %material.app_code,
            code = %material.mat_code,
            "Quota material created"
        );
        Ok(material)
    }

    /// Quota does not feed privilege, so no refresh is enqueued.
    pub async fn assign_quota(
        &self,
        actor: ActorContext,
        input: CreateQuotaRelation,
    ) -> ArborResult<QuotaRelation> {
        let _guard = self.ctx.tree_lock.lock().await;
        self.ensure_active(input.subject).await?;
        let store = &self.ctx.store;
        store.quotas().get_material(input.material_id).await?;

        let quota = store.quotas().create(input).await?;
        info!(
            quota = %quota.id,
            material = %quota.material_id,
            maxnum = quota.maxnum,
            subject = %quota.subject.entity_ref(),
            actor = %actor.actor_id,
            "Quota assigned"
        );
        Ok(quota)
    }

    pub async fn revoke_quota(&self, actor: ActorContext, quota_id: Uuid) -> ArborResult<()> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        let quota = store.quotas().get_by_id(quota_id, DeletionScope::All).await?;

        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        batch.discard(None, quota.entity_ref());
        store.writer().commit(batch).await?;

        info!(quota = %quota.id, actor = %actor.actor_id, "Quota revoked");
        Ok(())
    }

    /// Add `profile_id` to `group_id`. An active membership for the
    /// pair is `AlreadyExists`.
    pub async fn add_member(
        &self,
        actor: ActorContext,
        group_id: Uuid,
        profile_id: Uuid,
    ) -> ArborResult<GroupRelation> {
        let _guard = self.ctx.tree_lock.lock().await;
        self.ensure_active(Subject::Group(group_id)).await?;
        self.ensure_active(Subject::Profile(profile_id)).await?;
        let memberships = self.ctx.store.memberships();
        if memberships
            .find(group_id, profile_id, DeletionScope::Active)
            .await?
            .is_some()
        {
            return Err(ArborError::AlreadyExists {
                entity: "group_relation".into(),
            });
        }

        let relation = memberships
            .create(CreateGroupRelation {
                group_id,
                profile_id,
                approved_by: Some(actor.actor_id),
            })
            .await?;
        info!(
            group = %group_id,
            profile = %profile_id,
            actor = %actor.actor_id,
            "Member added"
        );
        self.ctx.dispatch(PrivilegeRefreshTask::Profiles {
            profile_ids: vec![profile_id],
        });
        Ok(relation)
    }

    pub async fn remove_member(
        &self,
        actor: ActorContext,
        group_id: Uuid,
        profile_id: Uuid,
    ) -> ArborResult<()> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        let relation = store
            .memberships()
            .find(group_id, profile_id, DeletionScope::Active)
            .await?
            .ok_or_else(|| ArborError::NotFound {
                entity: "group_relation".into(),
                id: format!("{group_id}/{profile_id}"),
            })?;

        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        batch.discard(None, relation.entity_ref());
        store.writer().commit(batch).await?;

        info!(
            group = %group_id,
            profile = %profile_id,
            actor = %actor.actor_id,
            "Member removed"
        );
        self.ctx.dispatch(PrivilegeRefreshTask::Profiles {
            profile_ids: vec![profile_id],
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_grants_refresh_the_group() {
        let id = Uuid::new_v4();
        assert_eq!(
            refresh_for(Subject::Group(id)),
            PrivilegeRefreshTask::Groups {
                group_ids: vec![id],
                deleted: false,
            }
        );
        assert_eq!(
            refresh_for(Subject::Profile(id)),
            PrivilegeRefreshTask::Profiles {
                profile_ids: vec![id],
            }
        );
    }
}
