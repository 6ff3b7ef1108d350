//! Integration tests for profile, account, role and grant repositories
//! using in-memory SurrealDB.

use arbor_core::error::ArborError;
use arbor_core::models::account::CreateLoginAccount;
use arbor_core::models::entity::{DeletionScope, Subject};
use arbor_core::models::membership::CreateGroupRelation;
use arbor_core::models::profile::CreateProfile;
use arbor_core::models::quota::{CreateQuotaMaterial, CreateQuotaRelation};
use arbor_core::models::role::{CreateAppliedRole, CreateRole};
use arbor_core::repository::{
    AccountRepository, AppliedRoleRepository, MembershipRepository, ProfileRepository,
    QuotaRepository, RoleRepository, Store,
};
use arbor_db::SurrealStore;
use arbor_db::repository::verify_password;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> SurrealStore<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    arbor_db::run_migrations(&db).await.unwrap();
    SurrealStore::new(db)
}

async fn create_profile(store: &SurrealStore<Db>, first: &str) -> Uuid {
    store
        .profiles()
        .create(CreateProfile {
            first_name: first.into(),
            last_name: "Tester".into(),
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn create_and_get_profile() {
    let store = setup().await;
    let id = create_profile(&store, "Ada").await;

    let profile = store
        .profiles()
        .get_by_id(id, DeletionScope::Active)
        .await
        .unwrap();
    assert_eq!(profile.display_name(), "Ada Tester");
    assert!(profile.deleted_at.is_none());

    let listed = store
        .profiles()
        .list_by_ids(&[id, Uuid::new_v4()], DeletionScope::All)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn account_hashes_password_and_tracks_flags() {
    let store = setup().await;
    let id = create_profile(&store, "Ada").await;

    let account = store
        .accounts()
        .create(CreateLoginAccount {
            profile_id: id,
            username: "ada".into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap();
    assert!(account.is_active);
    assert!(!account.is_superuser);
    assert!(verify_password("correct horse", &account.password_hash).unwrap());

    store
        .accounts()
        .set_privilege_flags(id, true, true)
        .await
        .unwrap();
    assert_eq!(store.accounts().count_active_superusers().await.unwrap(), 1);

    store.accounts().set_active(id, false).await.unwrap();
    assert_eq!(store.accounts().count_active_superusers().await.unwrap(), 0);

    let duplicate = store
        .accounts()
        .create(CreateLoginAccount {
            profile_id: id,
            username: "ada2".into(),
            password: "pw".into(),
        })
        .await;
    assert!(matches!(duplicate, Err(ArborError::AlreadyExists { .. })));
}

#[tokio::test]
async fn role_grants_are_a_set() {
    let store = setup().await;
    let id = create_profile(&store, "Ada").await;
    let r1 = Uuid::new_v4();
    let r2 = Uuid::new_v4();

    store.accounts().grant_roles(id, &[r1, r2]).await.unwrap();
    store.accounts().grant_roles(id, &[r1]).await.unwrap();
    let mut grants = store.accounts().role_grants(id).await.unwrap();
    grants.sort();
    let mut expected = vec![r1, r2];
    expected.sort();
    assert_eq!(grants, expected);

    store.accounts().revoke_roles(id, &[r1]).await.unwrap();
    assert_eq!(store.accounts().role_grants(id).await.unwrap(), vec![r2]);
}

#[tokio::test]
async fn reserved_role_keeps_fixed_id() {
    let store = setup().await;
    let fixed = Uuid::from_u128(1);

    let role = store
        .roles()
        .create(CreateRole {
            id: Some(fixed),
            name: "superuser".into(),
            description: "Full access".into(),
            permissions: vec!["*".into()],
        })
        .await
        .unwrap();
    assert_eq!(role.id, fixed);

    let fetched = store.roles().get_by_id(fixed).await.unwrap();
    assert_eq!(fetched.permissions, vec!["*".to_string()]);
    assert!(
        store
            .roles()
            .find_by_id(Uuid::new_v4())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn grants_are_listed_per_subject() {
    let store = setup().await;
    let profile = create_profile(&store, "Ada").await;
    let group = Uuid::new_v4();
    let role = Uuid::new_v4();

    store
        .applied_roles()
        .create(CreateAppliedRole {
            subject: Subject::Group(group),
            role_id: role,
            expiry: None,
            approved_by: None,
        })
        .await
        .unwrap();
    store
        .applied_roles()
        .create(CreateAppliedRole {
            subject: Subject::Profile(profile),
            role_id: role,
            expiry: None,
            approved_by: Some(profile),
        })
        .await
        .unwrap();

    let by_group = store
        .applied_roles()
        .list_for_subjects(&[Subject::Group(group)], DeletionScope::Active)
        .await
        .unwrap();
    assert_eq!(by_group.len(), 1);
    assert_eq!(by_group[0].subject, Subject::Group(group));

    let both = store
        .applied_roles()
        .list_for_subjects(
            &[Subject::Group(group), Subject::Profile(profile)],
            DeletionScope::Active,
        )
        .await
        .unwrap();
    assert_eq!(both.len(), 2);

    let material = store
        .quotas()
        .create_material(CreateQuotaMaterial {
            app_code: "mail".into(),
            mat_code: "daily".into(),
            description: "Mails per day".into(),
        })
        .await
        .unwrap();
    let quota = store
        .quotas()
        .create(CreateQuotaRelation {
            subject: Subject::Group(group),
            material_id: material.id,
            maxnum: 5,
            expiry: None,
        })
        .await
        .unwrap();
    assert_eq!(quota.maxnum, 5);
    let quotas = store
        .quotas()
        .list_for_subjects(&[Subject::Group(group)], DeletionScope::Active)
        .await
        .unwrap();
    assert_eq!(quotas.len(), 1);
    assert_eq!(quotas[0].material_id, material.id);
}

#[tokio::test]
async fn memberships_are_found_by_group_and_profile() {
    let store = setup().await;
    let profile = create_profile(&store, "Ada").await;
    let group = Uuid::new_v4();

    let relation = store
        .memberships()
        .create(CreateGroupRelation {
            group_id: group,
            profile_id: profile,
            approved_by: None,
        })
        .await
        .unwrap();

    let found = store
        .memberships()
        .find(group, profile, DeletionScope::Active)
        .await
        .unwrap()
        .expect("membership should exist");
    assert_eq!(found.id, relation.id);

    let by_group = store
        .memberships()
        .list_by_groups(&[group], DeletionScope::Active)
        .await
        .unwrap();
    assert_eq!(by_group.len(), 1);

    let by_profile = store
        .memberships()
        .list_by_profile(profile, DeletionScope::Deleted)
        .await
        .unwrap();
    assert!(by_profile.is_empty());
}
