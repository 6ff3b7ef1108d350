//! SurrealDB repository implementations.

mod account;
mod applied_role;
mod changeset;
mod closure;
mod group;
mod membership;
mod profile;
mod quota;
mod role;

pub use account::{SurrealAccountRepository, verify_password};
pub use applied_role::SurrealAppliedRoleRepository;
pub use changeset::SurrealChangesetRepository;
pub use closure::SurrealClosureRepository;
pub use group::SurrealGroupRepository;
pub use membership::SurrealMembershipRepository;
pub use profile::SurrealProfileRepository;
pub use quota::SurrealQuotaRepository;
pub use role::SurrealRoleRepository;

use arbor_core::models::entity::{DeletionScope, Subject};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// `WHERE` fragment selecting rows visible in `scope`.
pub(crate) fn scope_clause(scope: DeletionScope) -> &'static str {
    match scope {
        DeletionScope::Active => "deleted_at = NONE",
        DeletionScope::Deleted => "deleted_at != NONE",
        DeletionScope::All => "true",
    }
}

pub(crate) fn parse_uuid(value: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Query(format!("invalid {what} UUID: {e}")))
}

pub(crate) fn parse_opt_uuid(value: Option<String>, what: &str) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(&v, what)).transpose()
}

pub(crate) fn id_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

pub(crate) fn parse_subject(kind: &str, id: &str) -> Result<Subject, DbError> {
    let id = parse_uuid(id, "subject")?;
    Subject::from_parts(kind, id)
        .ok_or_else(|| DbError::Query(format!("unknown subject kind: {kind}")))
}

/// Split subjects into (group ids, profile ids) for binding.
pub(crate) fn split_subjects(subjects: &[Subject]) -> (Vec<String>, Vec<String>) {
    let mut groups = Vec::new();
    let mut profiles = Vec::new();
    for subject in subjects {
        match subject {
            Subject::Group(id) => groups.push(id.to_string()),
            Subject::Profile(id) => profiles.push(id.to_string()),
        }
    }
    (groups, profiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_split_by_kind() {
        let g = Uuid::new_v4();
        let p = Uuid::new_v4();
        let (groups, profiles) = split_subjects(&[Subject::Group(g), Subject::Profile(p)]);
        assert_eq!(groups, vec![g.to_string()]);
        assert_eq!(profiles, vec![p.to_string()]);
    }

    #[test]
    fn unknown_subject_kind_is_rejected() {
        assert!(parse_subject("tenant", &Uuid::new_v4().to_string()).is_err());
        assert!(parse_subject("group", "not-a-uuid").is_err());
    }
}
