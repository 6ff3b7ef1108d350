//! Profile and account lifecycle tests against in-memory SurrealDB.

use std::sync::Arc;

use arbor_core::clock::FixedClock;
use arbor_core::error::ArborError;
use arbor_core::models::changeset::RecoveryStatus;
use arbor_core::models::entity::{DeletionScope, EntityRef};
use arbor_core::models::group::CreateGroup;
use arbor_core::models::profile::CreateProfile;
use arbor_core::repository::{AccountRepository, ChangesetRepository, MembershipRepository, Store};
use arbor_db::SurrealStore;
use arbor_db::repository::verify_password;
use arbor_engine::{
    AccountCredentials, ActorContext, ChannelTaskSink, DeleteMode, Engine, EngineConfig,
    RecoveryMode,
};
use chrono::Utc;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> (Engine<SurrealStore<Db>>, ActorContext) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    arbor_db::run_migrations(&db).await.unwrap();

    let (sink, _rx) = ChannelTaskSink::channel(64);
    let engine = Engine::new(
        SurrealStore::new(db),
        EngineConfig::default(),
        Arc::new(FixedClock::new(Utc::now())),
        Arc::new(sink),
    );
    let operator = engine
        .profiles
        .create_profile(CreateProfile {
            first_name: "Op".into(),
            last_name: "Erator".into(),
        })
        .await
        .unwrap();
    (engine, ActorContext::new(operator.id))
}

async fn member_with_account(
    engine: &Engine<SurrealStore<Db>>,
    actor: ActorContext,
) -> (Uuid, Uuid) {
    let group = engine
        .tree
        .create_group(
            actor,
            CreateGroup {
                name: "team".into(),
                parent_id: None,
            },
        )
        .await
        .unwrap()
        .id;
    let profile = engine
        .profiles
        .create_profile(CreateProfile {
            first_name: "Jo".into(),
            last_name: "Member".into(),
        })
        .await
        .unwrap()
        .id;
    engine
        .profiles
        .activate_account(
            profile,
            Some(AccountCredentials {
                username: "jo".into(),
                password: "hunter22".into(),
            }),
        )
        .await
        .unwrap();
    engine
        .assignments
        .add_member(actor, group, profile)
        .await
        .unwrap();
    (group, profile)
}

#[tokio::test]
async fn activate_creates_hashed_account() {
    let (engine, _) = setup().await;
    let profile = engine
        .profiles
        .create_profile(CreateProfile {
            first_name: "New".into(),
            last_name: "Comer".into(),
        })
        .await
        .unwrap();

    let missing = engine.profiles.activate_account(profile.id, None).await;
    assert!(matches!(missing, Err(ArborError::Validation { .. })));

    let account = engine
        .profiles
        .activate_account(
            profile.id,
            Some(AccountCredentials {
                username: "newcomer".into(),
                password: "correct horse".into(),
            }),
        )
        .await
        .unwrap();
    assert!(account.is_active);
    assert!(!account.is_staff && !account.is_superuser);
    assert!(verify_password("correct horse", &account.password_hash).unwrap());
    assert!(!verify_password("wrong", &account.password_hash).unwrap());
}

#[tokio::test]
async fn soft_delete_deactivates_and_undelete_reactivates() {
    let (engine, actor) = setup().await;
    let (group, profile) = member_with_account(&engine, actor).await;
    let store = engine.context().store();

    let changeset = engine
        .profiles
        .delete_profile(actor, profile, DeleteMode::Soft)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(changeset.entity, EntityRef::profile(profile));
    let account = store.accounts().find_by_profile(profile).await.unwrap().unwrap();
    assert!(!account.is_active);
    assert!(
        store
            .memberships()
            .find(group, profile, DeletionScope::Active)
            .await
            .unwrap()
            .is_none()
    );

    let status = engine
        .profiles
        .undelete_profile(actor, profile, None, RecoveryMode::Full)
        .await
        .unwrap();
    assert_eq!(status, RecoveryStatus::DoneFull);
    let account = store.accounts().find_by_profile(profile).await.unwrap().unwrap();
    assert!(account.is_active);
    assert!(
        store
            .memberships()
            .find(group, profile, DeletionScope::Active)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        engine
            .profiles
            .get_profile(profile, DeletionScope::Active)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn hard_delete_removes_account_and_ledger() {
    let (engine, actor) = setup().await;
    let (group, profile) = member_with_account(&engine, actor).await;
    let store = engine.context().store();

    engine
        .profiles
        .delete_profile(actor, profile, DeleteMode::Soft)
        .await
        .unwrap();
    engine
        .profiles
        .delete_profile(actor, profile, DeleteMode::Hard)
        .await
        .unwrap();

    assert!(matches!(
        engine.profiles.get_profile(profile, DeletionScope::All).await,
        Err(ArborError::NotFound { .. })
    ));
    assert!(store.accounts().find_by_profile(profile).await.unwrap().is_none());
    assert!(
        store
            .memberships()
            .find(group, profile, DeletionScope::All)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .changesets()
            .list_by_top_entity(EntityRef::profile(profile))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn duplicate_membership_is_rejected() {
    let (engine, actor) = setup().await;
    let (group, profile) = member_with_account(&engine, actor).await;

    let again = engine.assignments.add_member(actor, group, profile).await;
    assert!(matches!(again, Err(ArborError::AlreadyExists { .. })));

    engine
        .assignments
        .remove_member(actor, group, profile)
        .await
        .unwrap();
    let missing = engine.assignments.remove_member(actor, group, profile).await;
    assert!(matches!(missing, Err(ArborError::NotFound { .. })));
    engine
        .assignments
        .add_member(actor, group, profile)
        .await
        .unwrap();
}

#[tokio::test]
async fn deactivate_and_remove_account() {
    let (engine, actor) = setup().await;
    let (_, profile) = member_with_account(&engine, actor).await;
    let store = engine.context().store();

    engine
        .profiles
        .deactivate_account(actor, profile, false)
        .await
        .unwrap();
    assert!(
        !store
            .accounts()
            .find_by_profile(profile)
            .await
            .unwrap()
            .unwrap()
            .is_active
    );

    let reactivated = engine.profiles.activate_account(profile, None).await.unwrap();
    assert!(reactivated.is_active);

    engine
        .profiles
        .deactivate_account(actor, profile, true)
        .await
        .unwrap();
    assert!(store.accounts().find_by_profile(profile).await.unwrap().is_none());
    let missing = engine.profiles.deactivate_account(actor, profile, true).await;
    assert!(matches!(missing, Err(ArborError::NotFound { .. })));
}
