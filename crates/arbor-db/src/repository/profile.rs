//! SurrealDB implementation of [`ProfileRepository`].

use arbor_core::error::ArborResult;
use arbor_core::models::entity::DeletionScope;
use arbor_core::models::profile::{CreateProfile, Profile};
use arbor_core::repository::ProfileRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{id_strings, parse_uuid, scope_clause};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ProfileRow {
    first_name: String,
    last_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    fn into_profile(self, id: Uuid) -> Profile {
        Profile {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct ProfileRowWithId {
    record_id: String,
    first_name: String,
    last_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl ProfileRowWithId {
    fn try_into_profile(self) -> Result<Profile, DbError> {
        Ok(Profile {
            id: parse_uuid(&self.record_id, "profile")?,
            first_name: self.first_name,
            last_name: self.last_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

pub struct SurrealProfileRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealProfileRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealProfileRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ProfileRepository for SurrealProfileRepository<C> {
    async fn create(&self, input: CreateProfile) -> ArborResult<Profile> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('profile', $id) SET \
                 first_name = $first_name, last_name = $last_name",
            )
            .bind(("id", id_str.clone()))
            .bind(("first_name", input.first_name))
            .bind(("last_name", input.last_name))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<ProfileRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "profile".into(),
            id: id_str,
        })?;

        Ok(row.into_profile(id))
    }

    async fn get_by_id(&self, id: Uuid, scope: DeletionScope) -> ArborResult<Profile> {
        let id_str = id.to_string();
        let query = format!(
            "SELECT * FROM type::record('profile', $id) WHERE {}",
            scope_clause(scope)
        );

        let mut result = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ProfileRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "profile".into(),
            id: id_str,
        })?;

        Ok(row.into_profile(id))
    }

    async fn list_by_ids(&self, ids: &[Uuid], scope: DeletionScope) -> ArborResult<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM profile \
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

        let rows: Vec<ProfileRowWithId> = result.take(0).map_err(DbError::from)?;
        let profiles = rows
            .into_iter()
            .map(|row| row.try_into_profile())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(profiles)
    }
}
