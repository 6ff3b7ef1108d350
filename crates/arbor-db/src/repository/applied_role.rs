//! SurrealDB implementation of [`AppliedRoleRepository`].

use arbor_core::error::ArborResult;
use arbor_core::models::entity::{DeletionScope, Subject};
use arbor_core::models::role::{AppliedRole, CreateAppliedRole};
use arbor_core::repository::AppliedRoleRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_opt_uuid, parse_subject, parse_uuid, scope_clause, split_subjects};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AppliedRoleRowWithId {
    record_id: String,
    subject_kind: String,
    subject_id: String,
    role_id: String,
    expiry: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl AppliedRoleRowWithId {
    fn try_into_applied_role(self) -> Result<AppliedRole, DbError> {
        Ok(AppliedRole {
            id: parse_uuid(&self.record_id, "applied_role")?,
            subject: parse_subject(&self.subject_kind, &self.subject_id)?,
            role_id: parse_uuid(&self.role_id, "role")?,
            expiry: self.expiry,
            approved_by: parse_opt_uuid(self.approved_by, "approver")?,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        })
    }
}

pub struct SurrealAppliedRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealAppliedRoleRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealAppliedRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AppliedRoleRepository for SurrealAppliedRoleRepository<C> {
    async fn create(&self, input: CreateAppliedRole) -> ArborResult<AppliedRole> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('applied_role', $id) SET \
                 subject_kind = $subject_kind, subject_id = $subject_id, \
                 role_id = $role_id, expiry = $expiry, \
                 approved_by = $approved_by",
            )
            .bind(("id", id.to_string()))
            .bind(("subject_kind", input.subject.kind_str()))
            .bind(("subject_id", input.subject.id().to_string()))
            .bind(("role_id", input.role_id.to_string()))
            .bind(("expiry", input.expiry))
            .bind(("approved_by", input.approved_by.map(|a| a.to_string())))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        self.get_by_id(id, DeletionScope::All).await
    }

    async fn get_by_id(&self, id: Uuid, scope: DeletionScope) -> ArborResult<AppliedRole> {
        let id_str = id.to_string();
        let query = format!(
            "SELECT meta::id(id) AS record_id, * \
             FROM type::record('applied_role', $id) WHERE {}",
            scope_clause(scope)
        );

        let mut result = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AppliedRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "applied_role".into(),
            id: id_str,
        })?;

        Ok(row.try_into_applied_role()?)
    }

    async fn list_for_subjects(
        &self,
        subjects: &[Subject],
        scope: DeletionScope,
    ) -> ArborResult<Vec<AppliedRole>> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }
        let (groups, profiles) = split_subjects(subjects);
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM applied_role \
             WHERE ((subject_kind = 'group' AND subject_id IN $groups) \
                 OR (subject_kind = 'profile' AND subject_id IN $profiles)) \
             AND {} \
             ORDER BY created_at ASC",
            scope_clause(scope)
        );

        let mut result = self
            .db
            .query(query)
            .bind(("groups", groups))
            .bind(("profiles", profiles))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AppliedRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let roles = rows
            .into_iter()
            .map(|row| row.try_into_applied_role())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(roles)
    }
}
