//! Repository trait definitions for data access abstraction.
//!
//! Reads go through the per-table repositories. Every write that
//! touches the group tree or the changeset ledger goes through
//! [`UnitOfWork::commit`] so it lands atomically.

use uuid::Uuid;

use crate::batch::ChangeBatch;
use crate::error::ArborResult;
use crate::models::{
    account::{CreateLoginAccount, LoginAccount},
    changeset::{Changeset, SoftDeleteRecord},
    closure::GroupClosure,
    entity::{DeletionScope, EntityRef, Subject},
    group::Group,
    membership::{CreateGroupRelation, GroupRelation},
    profile::{CreateProfile, Profile},
    quota::{CreateQuotaMaterial, CreateQuotaRelation, QuotaMaterial, QuotaRelation},
    role::{AppliedRole, CreateAppliedRole, CreateRole, Role},
};

// ---------------------------------------------------------------------------
// Group tree
// ---------------------------------------------------------------------------

pub trait GroupRepository: Send + Sync {
    fn get_by_id(
        &self,
        id: Uuid,
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Group>> + Send;
    fn list_by_ids(
        &self,
        ids: &[Uuid],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<Group>>> + Send;
    fn rename(&self, id: Uuid, name: String) -> impl Future<Output = ArborResult<Group>> + Send;
}

pub trait ClosureRepository: Send + Sync {
    fn list_by_ids(
        &self,
        ids: &[Uuid],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<GroupClosure>>> + Send;
    /// Rows whose descendant is one of `descendants` (self rows
    /// included), ordered by depth.
    fn ancestors_of(
        &self,
        descendants: &[Uuid],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<GroupClosure>>> + Send;
    /// Rows whose ancestor is one of `ancestors` (self rows included),
    /// ordered by depth.
    fn descendants_of(
        &self,
        ancestors: &[Uuid],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<GroupClosure>>> + Send;
    /// Rows linking any of `ancestors` to any of `descendants`.
    fn paths_between(
        &self,
        ancestors: &[Uuid],
        descendants: &[Uuid],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<GroupClosure>>> + Send;
}

// ---------------------------------------------------------------------------
// Profiles and accounts
// ---------------------------------------------------------------------------

pub trait ProfileRepository: Send + Sync {
    fn create(&self, input: CreateProfile) -> impl Future<Output = ArborResult<Profile>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Profile>> + Send;
    fn list_by_ids(
        &self,
        ids: &[Uuid],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<Profile>>> + Send;
}

pub trait AccountRepository: Send + Sync {
    /// Create an account; the plaintext password is hashed with
    /// Argon2id. Fails with `AlreadyExists` if the profile already has
    /// an account or the username is taken.
    fn create(
        &self,
        input: CreateLoginAccount,
    ) -> impl Future<Output = ArborResult<LoginAccount>> + Send;
    fn find_by_profile(
        &self,
        profile_id: Uuid,
    ) -> impl Future<Output = ArborResult<Option<LoginAccount>>> + Send;
    fn list_by_profiles(
        &self,
        profile_ids: &[Uuid],
    ) -> impl Future<Output = ArborResult<Vec<LoginAccount>>> + Send;
    fn set_privilege_flags(
        &self,
        profile_id: Uuid,
        is_superuser: bool,
        is_staff: bool,
    ) -> impl Future<Output = ArborResult<()>> + Send;
    fn set_active(
        &self,
        profile_id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = ArborResult<()>> + Send;
    fn count_active_superusers(&self) -> impl Future<Output = ArborResult<u64>> + Send;
    /// Role ids currently materialized on the account.
    fn role_grants(&self, profile_id: Uuid)
    -> impl Future<Output = ArborResult<Vec<Uuid>>> + Send;
    fn grant_roles(
        &self,
        profile_id: Uuid,
        role_ids: &[Uuid],
    ) -> impl Future<Output = ArborResult<()>> + Send;
    fn revoke_roles(
        &self,
        profile_id: Uuid,
        role_ids: &[Uuid],
    ) -> impl Future<Output = ArborResult<()>> + Send;
}

pub trait MembershipRepository: Send + Sync {
    fn create(
        &self,
        input: CreateGroupRelation,
    ) -> impl Future<Output = ArborResult<GroupRelation>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<GroupRelation>> + Send;
    fn find(
        &self,
        group_id: Uuid,
        profile_id: Uuid,
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Option<GroupRelation>>> + Send;
    fn list_by_groups(
        &self,
        group_ids: &[Uuid],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<GroupRelation>>> + Send;
    fn list_by_profile(
        &self,
        profile_id: Uuid,
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<GroupRelation>>> + Send;
}

// ---------------------------------------------------------------------------
// Roles and quota
// ---------------------------------------------------------------------------

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = ArborResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ArborResult<Role>> + Send;
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = ArborResult<Option<Role>>> + Send;
}

pub trait AppliedRoleRepository: Send + Sync {
    fn create(
        &self,
        input: CreateAppliedRole,
    ) -> impl Future<Output = ArborResult<AppliedRole>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<AppliedRole>> + Send;
    fn list_for_subjects(
        &self,
        subjects: &[Subject],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<AppliedRole>>> + Send;
}

pub trait QuotaRepository: Send + Sync {
    fn create_material(
        &self,
        input: CreateQuotaMaterial,
    ) -> impl Future<Output = ArborResult<QuotaMaterial>> + Send;
    fn get_material(&self, id: Uuid) -> impl Future<Output = ArborResult<QuotaMaterial>> + Send;
    fn create(
        &self,
        input: CreateQuotaRelation,
    ) -> impl Future<Output = ArborResult<QuotaRelation>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<QuotaRelation>> + Send;
    fn list_for_subjects(
        &self,
        subjects: &[Subject],
        scope: DeletionScope,
    ) -> impl Future<Output = ArborResult<Vec<QuotaRelation>>> + Send;
}

// ---------------------------------------------------------------------------
// Changeset ledger
// ---------------------------------------------------------------------------

pub trait ChangesetRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ArborResult<Changeset>> + Send;
    fn records(
        &self,
        changeset_id: Uuid,
    ) -> impl Future<Output = ArborResult<Vec<SoftDeleteRecord>>> + Send;
    /// Most recent changeset opened by `actor_id` that holds a record
    /// for `entity`.
    fn latest_for_entity(
        &self,
        entity: EntityRef,
        actor_id: Uuid,
    ) -> impl Future<Output = ArborResult<Option<Changeset>>> + Send;
    /// Changesets whose top-level entity is `entity`.
    fn list_by_top_entity(
        &self,
        entity: EntityRef,
    ) -> impl Future<Output = ArborResult<Vec<Changeset>>> + Send;
}

/// Atomic application of a [`ChangeBatch`]: either every change lands
/// or none does.
pub trait UnitOfWork: Send + Sync {
    fn commit(&self, batch: ChangeBatch) -> impl Future<Output = ArborResult<()>> + Send;
}

/// Bundle of every repository a backend provides.
pub trait Store: Clone + Send + Sync + 'static {
    type Groups: GroupRepository;
    type Closure: ClosureRepository;
    type Profiles: ProfileRepository;
    type Accounts: AccountRepository;
    type Memberships: MembershipRepository;
    type Roles: RoleRepository;
    type AppliedRoles: AppliedRoleRepository;
    type Quotas: QuotaRepository;
    type Changesets: ChangesetRepository;
    type Writer: UnitOfWork;

    fn groups(&self) -> &Self::Groups;
    fn closure(&self) -> &Self::Closure;
    fn profiles(&self) -> &Self::Profiles;
    fn accounts(&self) -> &Self::Accounts;
    fn memberships(&self) -> &Self::Memberships;
    fn roles(&self) -> &Self::Roles;
    fn applied_roles(&self) -> &Self::AppliedRoles;
    fn quotas(&self) -> &Self::Quotas;
    fn changesets(&self) -> &Self::Changesets;
    fn writer(&self) -> &Self::Writer;
}
