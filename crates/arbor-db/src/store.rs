//! SurrealDB-backed [`Store`] bundle.

use arbor_core::repository::Store;
use surrealdb::{Connection, Surreal};

use crate::repository::{
    SurrealAccountRepository, SurrealAppliedRoleRepository, SurrealChangesetRepository,
    SurrealClosureRepository, SurrealGroupRepository, SurrealMembershipRepository,
    SurrealProfileRepository, SurrealQuotaRepository, SurrealRoleRepository,
};
use crate::unit_of_work::SurrealUnitOfWork;

/// Every repository over one shared SurrealDB handle.
pub struct SurrealStore<C: Connection> {
    groups: SurrealGroupRepository<C>,
    closure: SurrealClosureRepository<C>,
    profiles: SurrealProfileRepository<C>,
    accounts: SurrealAccountRepository<C>,
    memberships: SurrealMembershipRepository<C>,
    roles: SurrealRoleRepository<C>,
    applied_roles: SurrealAppliedRoleRepository<C>,
    quotas: SurrealQuotaRepository<C>,
    changesets: SurrealChangesetRepository<C>,
    writer: SurrealUnitOfWork<C>,
}

impl<C: Connection> SurrealStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            groups: SurrealGroupRepository::new(db.clone()),
            closure: SurrealClosureRepository::new(db.clone()),
            profiles: SurrealProfileRepository::new(db.clone()),
            accounts: SurrealAccountRepository::new(db.clone()),
            memberships: SurrealMembershipRepository::new(db.clone()),
            roles: SurrealRoleRepository::new(db.clone()),
            applied_roles: SurrealAppliedRoleRepository::new(db.clone()),
            quotas: SurrealQuotaRepository::new(db.clone()),
            changesets: SurrealChangesetRepository::new(db.clone()),
            writer: SurrealUnitOfWork::new(db),
        }
    }
}

impl<C: Connection> Clone for SurrealStore<C> {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
            closure: self.closure.clone(),
            profiles: self.profiles.clone(),
            accounts: self.accounts.clone(),
            memberships: self.memberships.clone(),
            roles: self.roles.clone(),
            applied_roles: self.applied_roles.clone(),
            quotas: self.quotas.clone(),
            changesets: self.changesets.clone(),
            writer: self.writer.clone(),
        }
    }
}

impl<C: Connection> Store for SurrealStore<C> {
    type Groups = SurrealGroupRepository<C>;
    type Closure = SurrealClosureRepository<C>;
    type Profiles = SurrealProfileRepository<C>;
    type Accounts = SurrealAccountRepository<C>;
    type Memberships = SurrealMembershipRepository<C>;
    type Roles = SurrealRoleRepository<C>;
    type AppliedRoles = SurrealAppliedRoleRepository<C>;
    type Quotas = SurrealQuotaRepository<C>;
    type Changesets = SurrealChangesetRepository<C>;
    type Writer = SurrealUnitOfWork<C>;

    fn groups(&self) -> &Self::Groups {
        &self.groups
    }

    fn closure(&self) -> &Self::Closure {
        &self.closure
    }

    fn profiles(&self) -> &Self::Profiles {
        &self.profiles
    }

    fn accounts(&self) -> &Self::Accounts {
        &self.accounts
    }

    fn memberships(&self) -> &Self::Memberships {
        &self.memberships
    }

    fn roles(&self) -> &Self::Roles {
        &self.roles
    }

    fn applied_roles(&self) -> &Self::AppliedRoles {
        &self.applied_roles
    }

    fn quotas(&self) -> &Self::Quotas {
        &self.quotas
    }

    fn changesets(&self) -> &Self::Changesets {
        &self.changesets
    }

    fn writer(&self) -> &Self::Writer {
        &self.writer
    }
}
