//! SurrealDB implementation of [`GroupRepository`].

use arbor_core::error::ArborResult;
use arbor_core::models::entity::DeletionScope;
use arbor_core::models::group::Group;
use arbor_core::repository::GroupRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{id_strings, parse_uuid, scope_clause};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct GroupRow {
    name: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl GroupRow {
    fn into_group(self, id: Uuid) -> Group {
        Group {
            id,
            name: self.name,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct GroupRowWithId {
    record_id: String,
    name: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl GroupRowWithId {
    fn try_into_group(self) -> Result<Group, DbError> {
        Ok(Group {
            id: parse_uuid(&self.record_id, "group")?,
            name: self.name,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        })
    }
}

/// SurrealDB implementation of the Group repository. Groups are
/// created only through a `ChangeBatch` together with their closure
/// rows.
pub struct SurrealGroupRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealGroupRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealGroupRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> GroupRepository for SurrealGroupRepository<C> {
    async fn get_by_id(&self, id: Uuid, scope: DeletionScope) -> ArborResult<Group> {
        let id_str = id.to_string();
        let query = format!(
            "SELECT * FROM type::record('user_group', $id) WHERE {}",
            scope_clause(scope)
        );

        let mut result = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "group".into(),
            id: id_str,
        })?;

        Ok(row.into_group(id))
    }

    async fn list_by_ids(&self, ids: &[Uuid], scope: DeletionScope) -> ArborResult<Vec<Group>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user_group \
             WHERE meta::id(id) IN $ids AND {} \
             ORDER BY created_at ASC",
            scope_clause(scope)
        );

        let mut result = self
            .db
            .query(query)
            .bind(("ids", id_strings(ids)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRowWithId> = result.take(0).map_err(DbError::from)?;
        let groups = rows
            .into_iter()
            .map(|row| row.try_into_group())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(groups)
    }

    async fn rename(&self, id: Uuid, name: String) -> ArborResult<Group> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user_group', $id) SET name = $name \
                 WHERE deleted_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", name))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "group".into(),
            id: id_str,
        })?;

        Ok(row.into_group(id))
    }
}
