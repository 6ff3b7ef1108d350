//! SurrealDB implementation of [`ClosureRepository`].

use arbor_core::error::ArborResult;
use arbor_core::models::closure::GroupClosure;
use arbor_core::models::entity::DeletionScope;
use arbor_core::repository::ClosureRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{id_strings, parse_uuid, scope_clause};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ClosureRowWithId {
    record_id: String,
    ancestor_id: String,
    descendant_id: String,
    depth: u32,
    deleted_at: Option<DateTime<Utc>>,
}

impl ClosureRowWithId {
    fn try_into_closure(self) -> Result<GroupClosure, DbError> {
        Ok(GroupClosure {
            id: parse_uuid(&self.record_id, "closure")?,
            ancestor_id: parse_uuid(&self.ancestor_id, "ancestor")?,
            descendant_id: parse_uuid(&self.descendant_id, "descendant")?,
            depth: self.depth,
            deleted_at: self.deleted_at,
        })
    }
}

pub struct SurrealClosureRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealClosureRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealClosureRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select(
        &self,
        condition: &str,
        scope: DeletionScope,
        binds: Vec<(&'static str, Vec<String>)>,
    ) -> Result<Vec<GroupClosure>, DbError> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM group_closure \
             WHERE {condition} AND {} \
             ORDER BY depth ASC",
            scope_clause(scope)
        );

        let mut builder = self.db.query(query);
        for bind in binds {
            builder = builder.bind(bind);
        }
        let mut result = builder.await?;

        let rows: Vec<ClosureRowWithId> = result.take(0)?;
        rows.into_iter()
            .map(|row| row.try_into_closure())
            .collect()
    }
}

impl<C: Connection> ClosureRepository for SurrealClosureRepository<C> {
    async fn list_by_ids(
        &self,
        ids: &[Uuid],
        scope: DeletionScope,
    ) -> ArborResult<Vec<GroupClosure>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .select("meta::id(id) IN $ids", scope, vec![("ids", id_strings(ids))])
            .await?)
    }

    async fn ancestors_of(
        &self,
        descendants: &[Uuid],
        scope: DeletionScope,
    ) -> ArborResult<Vec<GroupClosure>> {
        if descendants.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .select(
                "descendant_id IN $descendants",
                scope,
                vec![("descendants", id_strings(descendants))],
            )
            .await?)
    }

    async fn descendants_of(
        &self,
        ancestors: &[Uuid],
        scope: DeletionScope,
    ) -> ArborResult<Vec<GroupClosure>> {
        if ancestors.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .select(
                "ancestor_id IN $ancestors",
                scope,
                vec![("ancestors", id_strings(ancestors))],
            )
            .await?)
    }

    async fn paths_between(
        &self,
        ancestors: &[Uuid],
        descendants: &[Uuid],
        scope: DeletionScope,
    ) -> ArborResult<Vec<GroupClosure>> {
        if ancestors.is_empty() || descendants.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .select(
                "ancestor_id IN $ancestors AND descendant_id IN $descendants",
                scope,
                vec![
                    ("ancestors", id_strings(ancestors)),
                    ("descendants", id_strings(descendants)),
                ],
            )
            .await?)
    }
}
