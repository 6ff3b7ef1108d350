//! Profile and login account lifecycle.

use arbor_core::batch::{AccountActivation, ChangeBatch};
use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::account::{CreateLoginAccount, LoginAccount};
use arbor_core::models::changeset::{Changeset, RecoveryStatus};
use arbor_core::models::entity::{DeletionScope, EntityKind, SoftDeletable, Subject};
use arbor_core::models::profile::{CreateProfile, Profile};
use arbor_core::repository::{
    AccountRepository, AppliedRoleRepository, ChangesetRepository, MembershipRepository,
    ProfileRepository, QuotaRepository, Store, UnitOfWork,
};
use arbor_core::task::PrivilegeRefreshTask;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::{ActorContext, EngineContext};
use crate::ledger::{open_changeset, record_soft_delete, resolve_changeset};
use crate::privilege::PrivilegeResolver;
use crate::recovery::{PrivilegeRecoveryPolicy, RecoveryMode, authorize, plan_recovery};
use crate::tree::DeleteMode;

/// Username and plaintext password for a new login account.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub username: String,
    pub password: String,
}

pub struct ProfileService<S: Store> {
    ctx: EngineContext<S>,
    privileges: PrivilegeResolver<S>,
}

impl<S: Store> Clone for ProfileService<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            privileges: self.privileges.clone(),
        }
    }
}

fn account_not_found(profile_id: Uuid) -> ArborError {
    ArborError::NotFound {
        entity: "login_account".into(),
        id: profile_id.to_string(),
    }
}

impl<S: Store> ProfileService<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        let privileges = PrivilegeResolver::new(ctx.clone());
        Self { ctx, privileges }
    }

    pub async fn create_profile(&self, input: CreateProfile) -> ArborResult<Profile> {
        let profile = self.ctx.store.profiles().create(input).await?;
        info!(profile = %profile.id, "Profile created");
        Ok(profile)
    }

    pub async fn get_profile(&self, id: Uuid, scope: DeletionScope) -> ArborResult<Profile> {
        self.ctx.store.profiles().get_by_id(id, scope).await
    }

    /// Delete a profile with its roles, quota and memberships.
    ///
    /// Soft delete records everything in a new changeset and deactivates
    /// the login account; hard delete removes the account too. Either
    /// fails with `PermissionDenied` when the account is the last active
    /// superuser.
    pub async fn delete_profile(
        &self,
        actor: ActorContext,
        id: Uuid,
        mode: DeleteMode,
    ) -> ArborResult<Option<Changeset>> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        let profile = store.profiles().get_by_id(id, DeletionScope::All).await?;
        if mode == DeleteMode::Soft && profile.is_deleted() {
            debug!(profile = %id, "Profile already deleted");
            return Ok(None);
        }

        let account = store.accounts().find_by_profile(id).await?;
        if let Some(account) = &account {
            self.privileges.ensure_not_last_superuser(account).await?;
        }

        let scope = match mode {
            DeleteMode::Soft => DeletionScope::Active,
            DeleteMode::Hard => DeletionScope::All,
        };
        let subject = [Subject::Profile(id)];
        let roles = store.applied_roles().list_for_subjects(&subject, scope).await?;
        let quotas = store.quotas().list_for_subjects(&subject, scope).await?;
        let members = store.memberships().list_by_profile(id, scope).await?;
        let cascade: Vec<_> = std::iter::once(profile.entity_ref())
            .chain(roles.iter().map(SoftDeletable::entity_ref))
            .chain(quotas.iter().map(SoftDeletable::entity_ref))
            .chain(members.iter().map(SoftDeletable::entity_ref))
            .collect();

        let mut batch = ChangeBatch::new(self.ctx.clock.now());
        let changeset = match mode {
            DeleteMode::Soft => {
                let changeset = open_changeset(&mut batch, actor.actor_id, profile.entity_ref());
                for entity in &cascade {
                    record_soft_delete(&mut batch, &changeset, *entity);
                }
                if account.is_some() {
                    batch.account_activations.push(AccountActivation {
                        profile_id: id,
                        is_active: false,
                    });
                }
                Some(changeset)
            }
            DeleteMode::Hard => {
                for entity in &cascade {
                    batch.discard(None, *entity);
                }
                batch.dropped_changesets = store
                    .changesets()
                    .list_by_top_entity(profile.entity_ref())
                    .await?
                    .into_iter()
                    .map(|c| c.id)
                    .collect();
                if account.is_some() {
                    batch.removed_accounts.push(id);
                }
                None
            }
        };
        store.writer().commit(batch).await?;

        info!(
            profile = %id,
            actor = %actor.actor_id,
            mode = ?mode,
            cascade = cascade.len(),
            "Profile deleted"
        );
        if mode == DeleteMode::Soft {
            self.ctx.dispatch(PrivilegeRefreshTask::Profiles {
                profile_ids: vec![id],
            });
        }
        Ok(changeset)
    }

    /// Recover a soft-deleted profile. The login account is reactivated
    /// when the profile itself comes back.
    pub async fn undelete_profile(
        &self,
        actor: ActorContext,
        id: Uuid,
        changeset: Option<Uuid>,
        mode: RecoveryMode,
    ) -> ArborResult<RecoveryStatus> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        let profile = store.profiles().get_by_id(id, DeletionScope::All).await?;
        let entity = profile.entity_ref();
        if !profile.is_deleted() {
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
        let mut plan =
            plan_recovery(store, &changeset, &policy, mode, self.ctx.clock.now()).await?;
        if plan.restored_kind(EntityKind::Profile) {
            let account = store.accounts().find_by_profile(id).await?;
            if account.is_some_and(|a| !a.is_active) {
                plan.batch.account_activations.push(AccountActivation {
                    profile_id: id,
                    is_active: true,
                });
            }
        }
        store.writer().commit(plan.batch).await?;

        info!(
            profile = %id,
            changeset = %changeset.id,
            actor = %actor.actor_id,
            status = ?plan.status,
            restored = plan.restored.len(),
            evicted = plan.evicted.len(),
            "Profile recovered"
        );
        self.ctx.dispatch(PrivilegeRefreshTask::Profiles {
            profile_ids: vec![id],
        });
        Ok(plan.status)
    }

    /// Create the profile's login account, or reactivate an existing
    /// one, then bring its privilege flags up to date.
    pub async fn activate_account(
        &self,
        profile_id: Uuid,
        credentials: Option<AccountCredentials>,
    ) -> ArborResult<LoginAccount> {
        let store = &self.ctx.store;
        let guard = self.ctx.tree_lock.lock().await;
        store.profiles().get_by_id(profile_id, DeletionScope::Active).await?;

        match store.accounts().find_by_profile(profile_id).await? {
            Some(account) if account.is_active => {
                debug!(profile = %profile_id, "Account already active");
            }
            Some(_) => {
                store.accounts().set_active(profile_id, true).await?;
                info!(profile = %profile_id, "Account reactivated");
            }
            None => {
                let credentials = credentials.ok_or_else(|| ArborError::Validation {
                    message: "credentials are required to create an account".into(),
                })?;
                store
                    .accounts()
                    .create(CreateLoginAccount {
                        profile_id,
                        username: credentials.username,
                        password: credentials.password,
                    })
                    .await?;
                info!(profile = %profile_id, "Account created");
            }
        }
        drop(guard);

        self.privileges.sync_account_privilege(profile_id).await?;
        store
            .accounts()
            .find_by_profile(profile_id)
            .await?
            .ok_or_else(|| account_not_found(profile_id))
    }

    /// Deactivate the profile's login account, or delete it when
    /// `remove` is set. Refused for the last active superuser.
    pub async fn deactivate_account(
        &self,
        actor: ActorContext,
        profile_id: Uuid,
        remove: bool,
    ) -> ArborResult<()> {
        let _guard = self.ctx.tree_lock.lock().await;
        let store = &self.ctx.store;
        let account = store
            .accounts()
            .find_by_profile(profile_id)
            .await?
            .ok_or_else(|| account_not_found(profile_id))?;
        self.privileges.ensure_not_last_superuser(&account).await?;

        if remove {
            let mut batch = ChangeBatch::new(self.ctx.clock.now());
            batch.removed_accounts.push(profile_id);
            store.writer().commit(batch).await?;
        } else {
            store.accounts().set_active(profile_id, false).await?;
        }

        info!(
            profile = %profile_id,
            actor = %actor.actor_id,
            removed = remove,
            "Account deactivated"
        );
        Ok(())
    }
}
