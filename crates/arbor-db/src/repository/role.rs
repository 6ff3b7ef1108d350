//! SurrealDB implementation of [`RoleRepository`].

use arbor_core::error::ArborResult;
use arbor_core::models::role::{CreateRole, Role};
use arbor_core::repository::RoleRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct RoleRow {
    name: String,
    description: String,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
}

impl RoleRow {
    fn into_role(self, id: Uuid) -> Role {
        Role {
            id,
            name: self.name,
            description: self.description,
            permissions: self.permissions,
            created_at: self.created_at,
        }
    }
}

/// SurrealDB implementation of the Role repository.
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealRoleRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> ArborResult<Role> {
        let id = input.id.unwrap_or_else(Uuid::new_v4);
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('role', $id) SET \
                 name = $name, description = $description, \
                 permissions = $permissions",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("permissions", input.permissions))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?;

        Ok(row.into_role(id))
    }

    async fn get_by_id(&self, id: Uuid) -> ArborResult<Role> {
        self.find_by_id(id).await?.ok_or_else(|| {
            DbError::NotFound {
                entity: "role".into(),
                id: id.to_string(),
            }
            .into()
        })
    }

    async fn find_by_id(&self, id: Uuid) -> ArborResult<Option<Role>> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('role', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(|row| row.into_role(id)))
    }
}
