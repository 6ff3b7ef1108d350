//! SurrealDB implementation of [`MembershipRepository`].

use arbor_core::error::ArborResult;
use arbor_core::models::entity::DeletionScope;
use arbor_core::models::membership::{CreateGroupRelation, GroupRelation};
use arbor_core::repository::MembershipRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{id_strings, parse_opt_uuid, parse_uuid, scope_clause};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct RelationRowWithId {
    record_id: String,
    group_id: String,
    profile_id: String,
    approved_by: Option<String>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl RelationRowWithId {
    fn try_into_relation(self) -> Result<GroupRelation, DbError> {
        Ok(GroupRelation {
            id: parse_uuid(&self.record_id, "group_relation")?,
            group_id: parse_uuid(&self.group_id, "group")?,
            profile_id: parse_uuid(&self.profile_id, "profile")?,
            approved_by: parse_opt_uuid(self.approved_by, "approver")?,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        })
    }
}

pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealMembershipRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select(
        &self,
        condition: &str,
        scope: DeletionScope,
        binds: Vec<(&'static str, Vec<String>)>,
    ) -> Result<Vec<GroupRelation>, DbError> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM group_relation \
             WHERE {condition} AND {} \
             ORDER BY created_at ASC",
            scope_clause(scope)
        );

        let mut builder = self.db.query(query);
        for bind in binds {
            builder = builder.bind(bind);
        }
        let mut result = builder.await?;

        let rows: Vec<RelationRowWithId> = result.take(0)?;
        rows.into_iter()
            .map(|row| row.try_into_relation())
            .collect()
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn create(&self, input: CreateGroupRelation) -> ArborResult<GroupRelation> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        self.db
            .query(
                "CREATE type::record('group_relation', $id) SET \
                 group_id = $group_id, profile_id = $profile_id, \
                 approved_by = $approved_by",
            )
            .bind(("id", id_str.clone()))
            .bind(("group_id", input.group_id.to_string()))
            .bind(("profile_id", input.profile_id.to_string()))
            .bind(("approved_by", input.approved_by.map(|a| a.to_string())))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        self.get_by_id(id, DeletionScope::All).await
    }

    async fn get_by_id(&self, id: Uuid, scope: DeletionScope) -> ArborResult<GroupRelation> {
        let rows = self
            .select(
                "meta::id(id) IN $ids",
                scope,
                vec![("ids", vec![id.to_string()])],
            )
            .await?;
        let relation = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "group_relation".into(),
            id: id.to_string(),
        })?;

        Ok(relation)
    }

    async fn find(
        &self,
        group_id: Uuid,
        profile_id: Uuid,
        scope: DeletionScope,
    ) -> ArborResult<Option<GroupRelation>> {
        let rows = self
            .select(
                "group_id IN $groups AND profile_id IN $profiles",
                scope,
                vec![
                    ("groups", vec![group_id.to_string()]),
                    ("profiles", vec![profile_id.to_string()]),
                ],
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn list_by_groups(
        &self,
        group_ids: &[Uuid],
        scope: DeletionScope,
    ) -> ArborResult<Vec<GroupRelation>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .select(
                "group_id IN $groups",
                scope,
                vec![("groups", id_strings(group_ids))],
            )
            .await?)
    }

    async fn list_by_profile(
        &self,
        profile_id: Uuid,
        scope: DeletionScope,
    ) -> ArborResult<Vec<GroupRelation>> {
        Ok(self
            .select(
                "profile_id IN $profiles",
                scope,
                vec![("profiles", vec![profile_id.to_string()])],
            )
            .await?)
    }
}
