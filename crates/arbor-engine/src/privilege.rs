//! Role inheritance and privilege synchronization.

use std::collections::{BTreeSet, HashMap};

use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::account::{LoginAccount, PrivilegeStatus};
use arbor_core::models::entity::{DeletionScope, Subject, is_effective};
use arbor_core::models::role::AppliedRole;
use arbor_core::repository::{
    AccountRepository, AppliedRoleRepository, ClosureRepository, MembershipRepository, Store,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::closure::ancestor_chains;
use crate::config::EngineConfig;
use crate::context::EngineContext;

/// Memo for one resolution pass over many profiles: group ancestor
/// chains and the instant expiry is judged against. Dropped when the
/// pass ends.
#[derive(Debug)]
pub struct ResolutionPass {
    now: DateTime<Utc>,
    group_ancestors: HashMap<Uuid, Vec<Uuid>>,
}

impl ResolutionPass {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            group_ancestors: HashMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Active ancestors of `groups`, each group itself included.
    pub async fn ancestors_of<S: Store>(
        &mut self,
        store: &S,
        groups: &[Uuid],
    ) -> ArborResult<BTreeSet<Uuid>> {
        let missing: Vec<Uuid> = groups
            .iter()
            .filter(|g| !self.group_ancestors.contains_key(g))
            .copied()
            .collect();
        if !missing.is_empty() {
            let rows = store
                .closure()
                .ancestors_of(&missing, DeletionScope::Active)
                .await?;
            let mut chains = ancestor_chains(&rows);
            for group in missing {
                let chain = chains.remove(&group).unwrap_or_default();
                self.group_ancestors.insert(group, chain);
            }
        }
        Ok(groups
            .iter()
            .filter_map(|g| self.group_ancestors.get(g))
            .flatten()
            .copied()
            .collect())
    }
}

/// Tier implied by a set of role ids. Superuser wins over staff
/// whatever the origin of either grant.
pub fn tier_for(role_ids: &BTreeSet<Uuid>, config: &EngineConfig) -> PrivilegeStatus {
    if role_ids.contains(&config.superuser_role_id) {
        PrivilegeStatus::Superuser
    } else if role_ids.contains(&config.staff_role_id) {
        PrivilegeStatus::Staff
    } else {
        PrivilegeStatus::None
    }
}

/// `(to_add, to_remove)` taking `current` to `target`.
pub fn grant_diff(current: &BTreeSet<Uuid>, target: &BTreeSet<Uuid>) -> (Vec<Uuid>, Vec<Uuid>) {
    (
        target.difference(current).copied().collect(),
        current.difference(target).copied().collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub profile_id: Uuid,
    pub status: PrivilegeStatus,
    pub flags_changed: bool,
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.flags_changed || !self.added.is_empty() || !self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The profile has no login account; nothing to sync.
    NoAccount,
    Synced(SyncReport),
}

pub struct PrivilegeResolver<S: Store> {
    ctx: EngineContext<S>,
}

impl<S: Store> Clone for PrivilegeResolver<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: Store> PrivilegeResolver<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    pub fn begin_pass(&self) -> ResolutionPass {
        ResolutionPass::new(self.ctx.clock.now())
    }

    /// Unexpired roles applied to the profile itself.
    pub async fn direct_roles(&self, profile_id: Uuid) -> ArborResult<Vec<AppliedRole>> {
        let pass = self.begin_pass();
        self.direct_roles_at(pass.now(), profile_id).await
    }

    async fn direct_roles_at(
        &self,
        now: DateTime<Utc>,
        profile_id: Uuid,
    ) -> ArborResult<Vec<AppliedRole>> {
        let roles = self
            .ctx
            .store
            .applied_roles()
            .list_for_subjects(&[Subject::Profile(profile_id)], DeletionScope::Active)
            .await?;
        Ok(roles
            .into_iter()
            .filter(|r| is_effective(r.expiry, now))
            .collect())
    }

    /// Unexpired roles applied to any group the profile belongs to, or
    /// to any ancestor of such a group.
    pub async fn inherited_roles(&self, profile_id: Uuid) -> ArborResult<Vec<AppliedRole>> {
        let mut pass = self.begin_pass();
        self.inherited_roles_with(&mut pass, profile_id).await
    }

    pub async fn inherited_roles_with(
        &self,
        pass: &mut ResolutionPass,
        profile_id: Uuid,
    ) -> ArborResult<Vec<AppliedRole>> {
        let groups: Vec<Uuid> = self
            .ctx
            .store
            .memberships()
            .list_by_profile(profile_id, DeletionScope::Active)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let subjects: Vec<Subject> = pass
            .ancestors_of(&self.ctx.store, &groups)
            .await?
            .into_iter()
            .map(Subject::Group)
            .collect();
        let roles = self
            .ctx
            .store
            .applied_roles()
            .list_for_subjects(&subjects, DeletionScope::Active)
            .await?;
        Ok(roles
            .into_iter()
            .filter(|r| is_effective(r.expiry, pass.now()))
            .collect())
    }

    /// Direct and inherited role ids of the profile.
    pub async fn role_ids_with(
        &self,
        pass: &mut ResolutionPass,
        profile_id: Uuid,
    ) -> ArborResult<BTreeSet<Uuid>> {
        let direct = self.direct_roles_at(pass.now(), profile_id).await?;
        let inherited = self.inherited_roles_with(pass, profile_id).await?;
        Ok(direct
            .iter()
            .chain(inherited.iter())
            .map(|r| r.role_id)
            .collect())
    }

    pub async fn privilege_status(&self, profile_id: Uuid) -> ArborResult<PrivilegeStatus> {
        let mut pass = self.begin_pass();
        let roles = self.role_ids_with(&mut pass, profile_id).await?;
        Ok(tier_for(&roles, &self.ctx.config))
    }

    /// Bring the profile's account flags and role grants in line with
    /// its roles. Repeated calls without a role change write nothing.
    pub async fn sync_account_privilege(&self, profile_id: Uuid) -> ArborResult<SyncOutcome> {
        let mut pass = self.begin_pass();
        self.sync_with(&mut pass, profile_id).await
    }

    pub async fn sync_with(
        &self,
        pass: &mut ResolutionPass,
        profile_id: Uuid,
    ) -> ArborResult<SyncOutcome> {
        let accounts = self.ctx.store.accounts();
        let Some(account) = accounts.find_by_profile(profile_id).await? else {
            debug!(profile = %profile_id, "No login account, skipping sync");
            return Ok(SyncOutcome::NoAccount);
        };

        let roles = self.role_ids_with(pass, profile_id).await?;
        let status = tier_for(&roles, &self.ctx.config);
        let (is_superuser, is_staff) = status.flags();

        let flags_changed = account.is_superuser != is_superuser || account.is_staff != is_staff;
        if flags_changed {
            accounts
                .set_privilege_flags(profile_id, is_superuser, is_staff)
                .await?;
        }

        let current: BTreeSet<Uuid> = accounts.role_grants(profile_id).await?.into_iter().collect();
        let (added, removed) = grant_diff(&current, &roles);
        accounts.grant_roles(profile_id, &added).await?;
        accounts.revoke_roles(profile_id, &removed).await?;

        let report = SyncReport {
            profile_id,
            status,
            flags_changed,
            added,
            removed,
        };
        if report.changed() {
            info!(
                profile = %profile_id,
                status = ?status,
                added = report.added.len(),
                removed = report.removed.len(),
                "Account privilege synchronized"
            );
        }
        Ok(SyncOutcome::Synced(report))
    }

    /// Profiles with a login account that belong to any group in the
    /// subtrees of `group_ids`. `include_deleted` also follows
    /// soft-deleted closure rows and memberships.
    pub async fn affected_profiles(
        &self,
        group_ids: &[Uuid],
        include_deleted: bool,
    ) -> ArborResult<BTreeSet<Uuid>> {
        let scope = DeletionScope::from_include_deleted(include_deleted);
        let store = &self.ctx.store;

        let mut groups: BTreeSet<Uuid> = group_ids.iter().copied().collect();
        groups.extend(
            store
                .closure()
                .descendants_of(group_ids, scope)
                .await?
                .into_iter()
                .map(|r| r.descendant_id),
        );
        let groups: Vec<Uuid> = groups.into_iter().collect();

        let profiles: BTreeSet<Uuid> = store
            .memberships()
            .list_by_groups(&groups, scope)
            .await?
            .into_iter()
            .map(|m| m.profile_id)
            .collect();
        let profiles: Vec<Uuid> = profiles.into_iter().collect();

        Ok(store
            .accounts()
            .list_by_profiles(&profiles)
            .await?
            .into_iter()
            .map(|a| a.profile_id)
            .collect())
    }

    /// Refuse to remove or deactivate the last active superuser.
    pub async fn ensure_not_last_superuser(&self, account: &LoginAccount) -> ArborResult<()> {
        if !(account.is_superuser && account.is_active) {
            return Ok(());
        }
        let remaining = self.ctx.store.accounts().count_active_superusers().await?;
        if remaining <= 1 {
            warn!(profile = %account.profile_id, "Refusing to drop the last active superuser");
            return Err(ArborError::PermissionDenied {
                reason: "cannot remove the last active superuser".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_checked_before_staff() {
        let config = EngineConfig::default();
        let both: BTreeSet<Uuid> = [config.staff_role_id, config.superuser_role_id]
            .into_iter()
            .collect();
        assert_eq!(tier_for(&both, &config), PrivilegeStatus::Superuser);

        let staff: BTreeSet<Uuid> = [config.staff_role_id].into_iter().collect();
        assert_eq!(tier_for(&staff, &config), PrivilegeStatus::Staff);

        assert_eq!(tier_for(&BTreeSet::new(), &config), PrivilegeStatus::None);
    }

    #[test]
    fn grant_diff_is_a_set_difference() {
        let (a, b, c) = (Uuid::from_u128(10), Uuid::from_u128(11), Uuid::from_u128(12));
        let current: BTreeSet<Uuid> = [a, b].into_iter().collect();
        let target: BTreeSet<Uuid> = [b, c].into_iter().collect();
        assert_eq!(grant_diff(&current, &target), (vec![c], vec![a]));
        assert_eq!(grant_diff(&target, &target), (vec![], vec![]));
    }
}
