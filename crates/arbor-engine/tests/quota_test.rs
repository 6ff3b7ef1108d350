//! Quota resolution tests against in-memory SurrealDB.

use std::sync::Arc;

use arbor_core::clock::{Clock, FixedClock};
use arbor_core::models::entity::{DeletionScope, Subject};
use arbor_core::models::group::CreateGroup;
use arbor_core::models::profile::CreateProfile;
use arbor_core::models::quota::{CreateQuotaMaterial, CreateQuotaRelation};
use arbor_core::repository::{ClosureRepository, Store};
use arbor_db::SurrealStore;
use arbor_engine::{
    ActorContext, ChannelTaskSink, DeleteMode, Engine, EngineConfig, RecoveryMode,
};
use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

struct Harness {
    engine: Engine<SurrealStore<Db>>,
    clock: Arc<FixedClock>,
    actor: ActorContext,
}

async fn setup() -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    arbor_db::run_migrations(&db).await.unwrap();

    let clock = Arc::new(FixedClock::new(Utc::now()));
    let (sink, _rx) = ChannelTaskSink::channel(64);
    let engine = Engine::new(
        SurrealStore::new(db),
        EngineConfig::default(),
        clock.clone(),
        Arc::new(sink),
    );
    let actor = engine
        .profiles
        .create_profile(CreateProfile {
            first_name: "Quota".into(),
            last_name: "Admin".into(),
        })
        .await
        .unwrap();

    Harness {
        engine,
        clock,
        actor: ActorContext::new(actor.id),
    }
}

impl Harness {
    async fn group(&self, name: &str, parent: Option<Uuid>) -> Uuid {
        self.engine
            .tree
            .create_group(
                self.actor,
                CreateGroup {
                    name: name.into(),
                    parent_id: parent,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn material(&self, code: &str) -> Uuid {
        self.engine
            .assignments
            .create_material(CreateQuotaMaterial {
                app_code: "mail".into(),
                mat_code: code.into(),
                description: String::new(),
            })
            .await
            .unwrap()
            .id
    }

    async fn quota(&self, subject: Subject, material: Uuid, maxnum: u32) -> Uuid {
        self.engine
            .assignments
            .assign_quota(
                self.actor,
                CreateQuotaRelation {
                    subject,
                    material_id: material,
                    maxnum,
                    expiry: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn depth(&self, ancestor: Uuid, descendant: Uuid) -> Option<u32> {
        self.engine
            .context()
            .store()
            .closure()
            .paths_between(&[ancestor], &[descendant], DeletionScope::Active)
            .await
            .unwrap()
            .first()
            .map(|r| r.depth)
    }

    async fn member(&self, group: Uuid) -> Uuid {
        let profile = self
            .engine
            .profiles
            .create_profile(CreateProfile {
                first_name: "Member".into(),
                last_name: String::new(),
            })
            .await
            .unwrap();
        self.engine
            .assignments
            .add_member(self.actor, group, profile.id)
            .await
            .unwrap();
        profile.id
    }
}

#[tokio::test]
async fn nested_group_scenario() {
    let h = setup().await;
    let a = h.group("A", None).await;
    let b = h.group("B", Some(a)).await;
    let c = h.group("C", Some(b)).await;
    let m = h.material("max_emails").await;
    h.quota(Subject::Group(a), m, 5).await;
    let profile = h.member(c).await;

    let effective = h.engine.quota.resolve_effective_quota(profile).await.unwrap();
    assert_eq!(effective.get(&m), Some(&5));

    h.quota(Subject::Profile(profile), m, 9).await;
    let effective = h.engine.quota.resolve_effective_quota(profile).await.unwrap();
    assert_eq!(effective.get(&m), Some(&9));

    let through_b = h
        .engine
        .tree
        .paths_through_node(b, DeletionScope::Active)
        .await
        .unwrap();
    assert!(through_b.iter().any(|r| r.ancestor_id == a && r.descendant_id == c));
    assert_eq!(h.depth(a, c).await, Some(2));

    h.engine
        .tree
        .delete_group(h.actor, b, DeleteMode::Soft)
        .await
        .unwrap();
    assert_eq!(h.depth(a, c).await, Some(1));

    h.engine
        .tree
        .undelete_group(h.actor, b, None, RecoveryMode::Full)
        .await
        .unwrap();
    assert_eq!(h.depth(a, c).await, Some(2));

    // Quota still flows from A after the round trip.
    let inherited = h.engine.quota.estimate_inherited_quota(&[c]).await.unwrap();
    assert_eq!(inherited.get(&m), Some(&5));
}

#[tokio::test]
async fn descendants_inherit_at_least_ancestor_quota() {
    let h = setup().await;
    let a = h.group("A", None).await;
    let b = h.group("B", Some(a)).await;
    let d = h.group("D", Some(b)).await;
    let m = h.material("storage").await;
    h.quota(Subject::Group(a), m, 7).await;

    let at_a = h.engine.quota.estimate_inherited_quota(&[a]).await.unwrap();
    for group in [b, d] {
        let below = h.engine.quota.estimate_inherited_quota(&[group]).await.unwrap();
        assert!(below.get(&m) >= at_a.get(&m));
    }
}

#[tokio::test]
async fn largest_ancestor_quota_wins() {
    let h = setup().await;
    let a = h.group("A", None).await;
    let b = h.group("B", Some(a)).await;
    let other = h.group("Other", None).await;
    let m = h.material("seats").await;
    h.quota(Subject::Group(a), m, 3).await;
    h.quota(Subject::Group(b), m, 2).await;
    h.quota(Subject::Group(other), m, 11).await;

    let inherited = h.engine.quota.estimate_inherited_quota(&[b]).await.unwrap();
    assert_eq!(inherited.get(&m), Some(&3));

    let both = h
        .engine
        .quota
        .estimate_inherited_quota(&[b, other])
        .await
        .unwrap();
    assert_eq!(both.get(&m), Some(&11));
}

#[tokio::test]
async fn expired_and_zero_quota_is_ignored() {
    let h = setup().await;
    let a = h.group("A", None).await;
    let (m, z) = (h.material("expiring").await, h.material("zero").await);
    h.engine
        .assignments
        .assign_quota(
            h.actor,
            CreateQuotaRelation {
                subject: Subject::Group(a),
                material_id: m,
                maxnum: 4,
                expiry: Some(h.clock.now() + Duration::hours(1)),
            },
        )
        .await
        .unwrap();
    h.quota(Subject::Group(a), z, 0).await;

    let inherited = h.engine.quota.estimate_inherited_quota(&[a]).await.unwrap();
    assert_eq!(inherited.get(&m), Some(&4));
    assert!(!inherited.contains_key(&z));

    h.clock.advance(Duration::hours(2));
    let inherited = h.engine.quota.estimate_inherited_quota(&[a]).await.unwrap();
    assert!(inherited.is_empty());
}

#[tokio::test]
async fn quota_expiring_now_no_longer_applies() {
    let h = setup().await;
    let a = h.group("A", None).await;
    let m = h.material("boundary").await;
    let profile = h.member(a).await;
    for subject in [Subject::Group(a), Subject::Profile(profile)] {
        h.engine
            .assignments
            .assign_quota(
                h.actor,
                CreateQuotaRelation {
                    subject,
                    material_id: m,
                    maxnum: 6,
                    expiry: Some(h.clock.now()),
                },
            )
            .await
            .unwrap();
    }

    let inherited = h.engine.quota.estimate_inherited_quota(&[a]).await.unwrap();
    assert!(!inherited.contains_key(&m));
    let effective = h.engine.quota.resolve_effective_quota(profile).await.unwrap();
    assert!(!effective.contains_key(&m));
}

#[tokio::test]
async fn quota_of_a_deleted_group_stops_applying() {
    let h = setup().await;
    let a = h.group("A", None).await;
    let b = h.group("B", Some(a)).await;
    let m = h.material("cpu").await;
    h.quota(Subject::Group(b), m, 6).await;
    let profile = h.member(b).await;

    let before = h.engine.quota.resolve_effective_quota(profile).await.unwrap();
    assert_eq!(before.get(&m), Some(&6));

    h.engine
        .tree
        .delete_group(h.actor, b, DeleteMode::Soft)
        .await
        .unwrap();
    let after = h.engine.quota.resolve_effective_quota(profile).await.unwrap();
    assert!(after.is_empty());
}
