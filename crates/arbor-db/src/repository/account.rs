//! SurrealDB implementation of [`AccountRepository`].

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::account::{CreateLoginAccount, LoginAccount};
use arbor_core::repository::AccountRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, id_strings, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AccountRowWithId {
    record_id: String,
    username: String,
    password_hash: String,
    is_active: bool,
    is_superuser: bool,
    is_staff: bool,
    created_at: DateTime<Utc>,
}

impl AccountRowWithId {
    fn try_into_account(self) -> Result<LoginAccount, DbError> {
        Ok(LoginAccount {
            profile_id: parse_uuid(&self.record_id, "profile")?,
            username: self.username,
            password_hash: self.password_hash,
            is_active: self.is_active,
            is_superuser: self.is_superuser,
            is_staff: self.is_staff,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct RoleGrantRow {
    role_id: String,
}

/// Hash a password using Argon2id with OWASP-recommended parameters.
fn hash_password(password: &str) -> Result<String, DbError> {
    // m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Query(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Query(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// Check a plaintext password against a stored Argon2id hash. Nothing
/// in the engine signs accounts in; this is the check that stored
/// hashes verify, used by the repository and engine tests.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, DbError> {
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| DbError::Query(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(DbError::Query(format!("verify error: {e}"))),
    }
}

/// SurrealDB implementation of the login account repository. The
/// account record shares its id with the owning profile.
pub struct SurrealAccountRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealAccountRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealAccountRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AccountRepository for SurrealAccountRepository<C> {
    async fn create(&self, input: CreateLoginAccount) -> ArborResult<LoginAccount> {
        if self.find_by_profile(input.profile_id).await?.is_some() {
            return Err(ArborError::AlreadyExists {
                entity: format!("login_account for profile {}", input.profile_id),
            });
        }

        let password_hash = hash_password(&input.password)?;
        let id_str = input.profile_id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('login_account', $id) SET \
                 username = $username, password_hash = $password_hash; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('login_account', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("username", input.username))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<AccountRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or(DbError::NotFound {
            entity: "login_account".into(),
            id: id_str,
        })?;

        Ok(row.try_into_account()?)
    }

    async fn find_by_profile(&self, profile_id: Uuid) -> ArborResult<Option<LoginAccount>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('login_account', $id)",
            )
            .bind(("id", profile_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRowWithId> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_account()?)),
            None => Ok(None),
        }
    }

    async fn list_by_profiles(&self, profile_ids: &[Uuid]) -> ArborResult<Vec<LoginAccount>> {
        if profile_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM login_account \
                 WHERE meta::id(id) IN $ids",
            )
            .bind(("ids", id_strings(profile_ids)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRowWithId> = result.take(0).map_err(DbError::from)?;
        let accounts = rows
            .into_iter()
            .map(|row| row.try_into_account())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(accounts)
    }

    async fn set_privilege_flags(
        &self,
        profile_id: Uuid,
        is_superuser: bool,
        is_staff: bool,
    ) -> ArborResult<()> {
        self.db
            .query(
                "UPDATE type::record('login_account', $id) SET \
                 is_superuser = $is_superuser, is_staff = $is_staff",
            )
            .bind(("id", profile_id.to_string()))
            .bind(("is_superuser", is_superuser))
            .bind(("is_staff", is_staff))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn set_active(&self, profile_id: Uuid, is_active: bool) -> ArborResult<()> {
        self.db
            .query("UPDATE type::record('login_account', $id) SET is_active = $is_active")
            .bind(("id", profile_id.to_string()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn count_active_superusers(&self) -> ArborResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM login_account \
                 WHERE is_superuser = true AND is_active = true GROUP ALL",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn role_grants(&self, profile_id: Uuid) -> ArborResult<Vec<Uuid>> {
        let mut result = self
            .db
            .query("SELECT role_id FROM account_role WHERE profile_id = $profile_id")
            .bind(("profile_id", profile_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleGrantRow> = result.take(0).map_err(DbError::from)?;
        let ids = rows
            .into_iter()
            .map(|row| parse_uuid(&row.role_id, "role"))
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(ids)
    }

    async fn grant_roles(&self, profile_id: Uuid, role_ids: &[Uuid]) -> ArborResult<()> {
        if role_ids.is_empty() {
            return Ok(());
        }
        self.db
            .query(
                "FOR $role_id IN $role_ids { \
                     UPSERT type::record('account_role', [$profile_id, $role_id]) \
                     SET profile_id = $profile_id, role_id = $role_id; \
                 };",
            )
            .bind(("profile_id", profile_id.to_string()))
            .bind(("role_ids", id_strings(role_ids)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn revoke_roles(&self, profile_id: Uuid, role_ids: &[Uuid]) -> ArborResult<()> {
        if role_ids.is_empty() {
            return Ok(());
        }
        self.db
            .query(
                "DELETE account_role WHERE profile_id = $profile_id \
                 AND role_id IN $role_ids",
            )
            .bind(("profile_id", profile_id.to_string()))
            .bind(("role_ids", id_strings(role_ids)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }
}
