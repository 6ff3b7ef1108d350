//! SurrealDB implementation of [`ChangesetRepository`].
//!
//! Changesets and their records are written only by the unit of work.

use arbor_core::error::ArborResult;
use arbor_core::models::changeset::{Changeset, SoftDeleteRecord};
use arbor_core::models::entity::{EntityKind, EntityRef};
use arbor_core::repository::ChangesetRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ChangesetRowWithId {
    record_id: String,
    actor_id: String,
    entity_kind: String,
    entity_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct RecordRow {
    changeset_id: String,
    entity_kind: String,
    entity_id: String,
    created_at: DateTime<Utc>,
}

fn parse_entity(kind: &str, id: &str) -> Result<EntityRef, DbError> {
    let kind = EntityKind::parse(kind)
        .ok_or_else(|| DbError::Query(format!("unknown entity kind: {kind}")))?;
    Ok(EntityRef::new(kind, parse_uuid(id, "entity")?))
}

impl ChangesetRowWithId {
    fn try_into_changeset(self) -> Result<Changeset, DbError> {
        Ok(Changeset {
            id: parse_uuid(&self.record_id, "changeset")?,
            actor_id: parse_uuid(&self.actor_id, "actor")?,
            entity: parse_entity(&self.entity_kind, &self.entity_id)?,
            created_at: self.created_at,
        })
    }
}

impl RecordRow {
    fn try_into_record(self) -> Result<SoftDeleteRecord, DbError> {
        Ok(SoftDeleteRecord {
            changeset_id: parse_uuid(&self.changeset_id, "changeset")?,
            entity: parse_entity(&self.entity_kind, &self.entity_id)?,
            created_at: self.created_at,
        })
    }
}

pub struct SurrealChangesetRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealChangesetRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealChangesetRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ChangesetRepository for SurrealChangesetRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> ArborResult<Changeset> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('changeset', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ChangesetRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "changeset".into(),
            id: id_str,
        })?;

        Ok(row.try_into_changeset()?)
    }

    async fn records(&self, changeset_id: Uuid) -> ArborResult<Vec<SoftDeleteRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT changeset_id, entity_kind, entity_id, created_at \
                 FROM soft_delete_record WHERE changeset_id = $changeset_id \
                 ORDER BY created_at ASC",
            )
            .bind(("changeset_id", changeset_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecordRow> = result.take(0).map_err(DbError::from)?;
        let records = rows
            .into_iter()
            .map(|row| row.try_into_record())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(records)
    }

    async fn latest_for_entity(
        &self,
        entity: EntityRef,
        actor_id: Uuid,
    ) -> ArborResult<Option<Changeset>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM changeset \
                 WHERE actor_id = $actor_id \
                 AND meta::id(id) IN (\
                     SELECT VALUE changeset_id FROM soft_delete_record \
                     WHERE entity_kind = $entity_kind AND entity_id = $entity_id\
                 ) \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("actor_id", actor_id.to_string()))
            .bind(("entity_kind", entity.kind.as_str()))
            .bind(("entity_id", entity.id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ChangesetRowWithId> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_changeset()?)),
            None => Ok(None),
        }
    }

    async fn list_by_top_entity(&self, entity: EntityRef) -> ArborResult<Vec<Changeset>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM changeset \
                 WHERE entity_kind = $entity_kind AND entity_id = $entity_id \
                 ORDER BY created_at ASC",
            )
            .bind(("entity_kind", entity.kind.as_str()))
            .bind(("entity_id", entity.id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ChangesetRowWithId> = result.take(0).map_err(DbError::from)?;
        let changesets = rows
            .into_iter()
            .map(|row| row.try_into_changeset())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(changesets)
    }
}
