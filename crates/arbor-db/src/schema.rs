//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings; every soft-deletable table carries an optional
//! `deleted_at` marker.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "group_tree_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Group tree
-- =======================================================================
DEFINE TABLE user_group SCHEMAFULL;
DEFINE FIELD name ON TABLE user_group TYPE string;
DEFINE FIELD created_at ON TABLE user_group TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE user_group TYPE option<datetime>;

DEFINE TABLE group_closure SCHEMAFULL;
DEFINE FIELD ancestor_id ON TABLE group_closure TYPE string;
DEFINE FIELD descendant_id ON TABLE group_closure TYPE string;
DEFINE FIELD depth ON TABLE group_closure TYPE int ASSERT $value >= 0;
DEFINE FIELD deleted_at ON TABLE group_closure TYPE option<datetime>;
DEFINE INDEX idx_closure_pair ON TABLE group_closure \
    COLUMNS ancestor_id, descendant_id UNIQUE;
DEFINE INDEX idx_closure_descendant ON TABLE group_closure \
    COLUMNS descendant_id;

-- =======================================================================
-- Profiles and login accounts
-- =======================================================================
DEFINE TABLE profile SCHEMAFULL;
DEFINE FIELD first_name ON TABLE profile TYPE string;
DEFINE FIELD last_name ON TABLE profile TYPE string;
DEFINE FIELD created_at ON TABLE profile TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE profile TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE profile TYPE option<datetime>;

-- Record id equals the owning profile id.
DEFINE TABLE login_account SCHEMAFULL;
DEFINE FIELD username ON TABLE login_account TYPE string;
DEFINE FIELD password_hash ON TABLE login_account TYPE string;
DEFINE FIELD is_active ON TABLE login_account TYPE bool DEFAULT true;
DEFINE FIELD is_superuser ON TABLE login_account TYPE bool DEFAULT false;
DEFINE FIELD is_staff ON TABLE login_account TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE login_account TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_account_username ON TABLE login_account \
    COLUMNS username UNIQUE;

-- Materialized role grants of an account.
DEFINE TABLE account_role SCHEMAFULL;
DEFINE FIELD profile_id ON TABLE account_role TYPE string;
DEFINE FIELD role_id ON TABLE account_role TYPE string;
DEFINE INDEX idx_account_role_pair ON TABLE account_role \
    COLUMNS profile_id, role_id UNIQUE;

DEFINE TABLE group_relation SCHEMAFULL;
DEFINE FIELD group_id ON TABLE group_relation TYPE string;
DEFINE FIELD profile_id ON TABLE group_relation TYPE string;
DEFINE FIELD approved_by ON TABLE group_relation TYPE option<string>;
DEFINE FIELD created_at ON TABLE group_relation TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE group_relation TYPE option<datetime>;
DEFINE INDEX idx_relation_group ON TABLE group_relation \
    COLUMNS group_id;
DEFINE INDEX idx_relation_profile ON TABLE group_relation \
    COLUMNS profile_id;

-- =======================================================================
-- Roles
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD description ON TABLE role TYPE string DEFAULT '';
DEFINE FIELD permissions ON TABLE role TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_name ON TABLE role COLUMNS name UNIQUE;

DEFINE TABLE applied_role SCHEMAFULL;
DEFINE FIELD subject_kind ON TABLE applied_role TYPE string \
    ASSERT $value IN ['group', 'profile'];
DEFINE FIELD subject_id ON TABLE applied_role TYPE string;
DEFINE FIELD role_id ON TABLE applied_role TYPE string;
DEFINE FIELD expiry ON TABLE applied_role TYPE option<datetime>;
DEFINE FIELD approved_by ON TABLE applied_role TYPE option<string>;
DEFINE FIELD created_at ON TABLE applied_role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE applied_role TYPE option<datetime>;
DEFINE INDEX idx_applied_role_subject ON TABLE applied_role \
    COLUMNS subject_kind, subject_id;

-- =======================================================================
-- Quota
-- =======================================================================
DEFINE TABLE quota_material SCHEMAFULL;
DEFINE FIELD app_code ON TABLE quota_material TYPE string;
DEFINE FIELD mat_code ON TABLE quota_material TYPE string;
DEFINE FIELD description ON TABLE quota_material TYPE string DEFAULT '';
DEFINE INDEX idx_quota_material_code ON TABLE quota_material \
    COLUMNS app_code, mat_code UNIQUE;

DEFINE TABLE quota_relation SCHEMAFULL;
DEFINE FIELD subject_kind ON TABLE quota_relation TYPE string \
    ASSERT $value IN ['group', 'profile'];
DEFINE FIELD subject_id ON TABLE quota_relation TYPE string;
DEFINE FIELD material_id ON TABLE quota_relation TYPE string;
DEFINE FIELD maxnum ON TABLE quota_relation TYPE int ASSERT $value >= 0;
DEFINE FIELD expiry ON TABLE quota_relation TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE quota_relation TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE quota_relation TYPE option<datetime>;
DEFINE INDEX idx_quota_relation_subject ON TABLE quota_relation \
    COLUMNS subject_kind, subject_id;

-- =======================================================================
-- Changeset ledger
-- =======================================================================
DEFINE TABLE changeset SCHEMAFULL;
DEFINE FIELD actor_id ON TABLE changeset TYPE string;
DEFINE FIELD entity_kind ON TABLE changeset TYPE string;
DEFINE FIELD entity_id ON TABLE changeset TYPE string;
DEFINE FIELD created_at ON TABLE changeset TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_changeset_entity ON TABLE changeset \
    COLUMNS entity_kind, entity_id;

DEFINE TABLE soft_delete_record SCHEMAFULL;
DEFINE FIELD changeset_id ON TABLE soft_delete_record TYPE string;
DEFINE FIELD entity_kind ON TABLE soft_delete_record TYPE string;
DEFINE FIELD entity_id ON TABLE soft_delete_record TYPE string;
DEFINE FIELD created_at ON TABLE soft_delete_record TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_soft_delete_record_entry ON TABLE soft_delete_record \
    COLUMNS changeset_id, entity_kind, entity_id UNIQUE;
";

/// Run all pending migrations against the given SurrealDB instance.
///
/// Safe to call on every start-up: already applied versions are
/// skipped.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
    {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn every_soft_deletable_table_has_marker() {
        for table in [
            "user_group",
            "group_closure",
            "profile",
            "group_relation",
            "applied_role",
            "quota_relation",
        ] {
            let field = format!("DEFINE FIELD deleted_at ON TABLE {table} TYPE option<datetime>");
            assert!(SCHEMA_V1.contains(&field), "{table} lacks deleted_at");
        }
    }
}
