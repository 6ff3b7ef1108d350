//! SurrealDB implementation of [`QuotaRepository`].

use arbor_core::error::ArborResult;
use arbor_core::models::entity::{DeletionScope, Subject};
use arbor_core::models::quota::{
    CreateQuotaMaterial, CreateQuotaRelation, QuotaMaterial, QuotaRelation,
};
use arbor_core::repository::QuotaRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_subject, parse_uuid, scope_clause, split_subjects};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct MaterialRow {
    app_code: String,
    mat_code: String,
    description: String,
}

#[derive(Debug, SurrealValue)]
struct QuotaRowWithId {
    record_id: String,
    subject_kind: String,
    subject_id: String,
    material_id: String,
    maxnum: u32,
    expiry: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl QuotaRowWithId {
    fn try_into_quota(self) -> Result<QuotaRelation, DbError> {
        Ok(QuotaRelation {
            id: parse_uuid(&self.record_id, "quota_relation")?,
            subject: parse_subject(&self.subject_kind, &self.subject_id)?,
            material_id: parse_uuid(&self.material_id, "material")?,
            maxnum: self.maxnum,
            expiry: self.expiry,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        })
    }
}

pub struct SurrealQuotaRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealQuotaRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealQuotaRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> QuotaRepository for SurrealQuotaRepository<C> {
    async fn create_material(&self, input: CreateQuotaMaterial) -> ArborResult<QuotaMaterial> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('quota_material', $id) SET \
                 app_code = $app_code, mat_code = $mat_code, \
                 description = $description",
            )
            .bind(("id", id_str.clone()))
            .bind(("app_code", input.app_code))
            .bind(("mat_code", input.mat_code))
            .bind(("description", input.description))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<MaterialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "quota_material".into(),
            id: id_str,
        })?;

        Ok(QuotaMaterial {
            id,
            app_code: row.app_code,
            mat_code: row.mat_code,
            description: row.description,
        })
    }

    async fn get_material(&self, id: Uuid) -> ArborResult<QuotaMaterial> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query("SELECT * FROM type::record('quota_material', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MaterialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "quota_material".into(),
            id: id_str,
        })?;

        Ok(QuotaMaterial {
            id,
            app_code: row.app_code,
            mat_code: row.mat_code,
            description: row.description,
        })
    }

    async fn create(&self, input: CreateQuotaRelation) -> ArborResult<QuotaRelation> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('quota_relation', $id) SET \
                 subject_kind = $subject_kind, subject_id = $subject_id, \
                 material_id = $material_id, maxnum = $maxnum, \
                 expiry = $expiry",
            )
            .bind(("id", id.to_string()))
            .bind(("subject_kind", input.subject.kind_str()))
            .bind(("subject_id", input.subject.id().to_string()))
            .bind(("material_id", input.material_id.to_string()))
            .bind(("maxnum", input.maxnum))
            .bind(("expiry", input.expiry))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        self.get_by_id(id, DeletionScope::All).await
    }

    async fn get_by_id(&self, id: Uuid, scope: DeletionScope) -> ArborResult<QuotaRelation> {
        let id_str = id.to_string();
        let query = format!(
            "SELECT meta::id(id) AS record_id, * \
             FROM type::record('quota_relation', $id) WHERE {}",
            scope_clause(scope)
        );

        let mut result = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<QuotaRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "quota_relation".into(),
            id: id_str,
        })?;

        Ok(row.try_into_quota()?)
    }

    async fn list_for_subjects(
        &self,
        subjects: &[Subject],
        scope: DeletionScope,
    ) -> ArborResult<Vec<QuotaRelation>> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }
        let (groups, profiles) = split_subjects(subjects);
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM quota_relation \
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

        let rows: Vec<QuotaRowWithId> = result.take(0).map_err(DbError::from)?;
        let quotas = rows
            .into_iter()
            .map(|row| row.try_into_quota())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(quotas)
    }
}
