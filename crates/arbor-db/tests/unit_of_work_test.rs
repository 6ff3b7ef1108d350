//! Integration tests for atomic change batches using in-memory SurrealDB.

use arbor_core::batch::{ChangeBatch, DepthUpdate, NewGroup, NewPath};
use arbor_core::error::ArborError;
use arbor_core::models::changeset::Changeset;
use arbor_core::models::entity::{DeletionScope, EntityKind, EntityRef};
use arbor_core::repository::{
    ChangesetRepository, ClosureRepository, GroupRepository, Store, UnitOfWork,
};
use arbor_db::SurrealStore;
use chrono::Utc;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> SurrealStore<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    arbor_db::run_migrations(&db).await.unwrap();
    SurrealStore::new(db)
}

/// Root `a` with child `b`; returns (a, b, path a->b).
async fn seed_pair(store: &SurrealStore<Db>) -> (Uuid, Uuid, NewPath) {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let link = NewPath::new(a, b, 1);
    let mut batch = ChangeBatch::new(Utc::now());
    batch.new_groups.push(NewGroup {
        id: a,
        name: "A".into(),
    });
    batch.new_groups.push(NewGroup {
        id: b,
        name: "B".into(),
    });
    batch.new_paths.push(NewPath::new(a, a, 0));
    batch.new_paths.push(NewPath::new(b, b, 0));
    batch.new_paths.push(link.clone());
    store.writer().commit(batch).await.unwrap();
    (a, b, link)
}

#[tokio::test]
async fn batch_creates_groups_and_paths() {
    let store = setup().await;
    let (a, b, _) = seed_pair(&store).await;

    let group = store
        .groups()
        .get_by_id(b, DeletionScope::Active)
        .await
        .unwrap();
    assert_eq!(group.name, "B");

    let ancestors = store
        .closure()
        .ancestors_of(&[b], DeletionScope::Active)
        .await
        .unwrap();
    let pairs: Vec<(Uuid, u32)> = ancestors.iter().map(|r| (r.ancestor_id, r.depth)).collect();
    assert_eq!(pairs, vec![(b, 0), (a, 1)]);
}

#[tokio::test]
async fn failing_statement_rolls_back_whole_batch() {
    let store = setup().await;
    let (a, b, _) = seed_pair(&store).await;

    let c = Uuid::new_v4();
    let mut batch = ChangeBatch::new(Utc::now());
    batch.new_groups.push(NewGroup {
        id: c,
        name: "C".into(),
    });
    batch.new_paths.push(NewPath::new(c, c, 0));
    // Duplicate pair violates the unique closure index.
    batch.new_paths.push(NewPath::new(a, b, 1));

    assert!(store.writer().commit(batch).await.is_err());

    let result = store.groups().get_by_id(c, DeletionScope::All).await;
    assert!(matches!(result, Err(ArborError::NotFound { .. })));
}

#[tokio::test]
async fn soft_delete_and_restore_toggle_marker_and_ledger() {
    let store = setup().await;
    let (_, b, _) = seed_pair(&store).await;
    let actor = Uuid::new_v4();

    let changeset = Changeset {
        id: Uuid::new_v4(),
        actor_id: actor,
        entity: EntityRef::group(b),
        created_at: Utc::now(),
    };
    let mut batch = ChangeBatch::new(Utc::now());
    batch.opened_changesets.push(changeset.clone());
    batch.soft_delete(changeset.id, EntityRef::group(b));
    store.writer().commit(batch).await.unwrap();

    let deleted = store
        .groups()
        .get_by_id(b, DeletionScope::Deleted)
        .await
        .unwrap();
    assert!(deleted.deleted_at.is_some());
    assert!(
        store
            .groups()
            .get_by_id(b, DeletionScope::Active)
            .await
            .is_err()
    );

    let found = store
        .changesets()
        .latest_for_entity(EntityRef::group(b), actor)
        .await
        .unwrap()
        .expect("changeset should be found");
    assert_eq!(found.id, changeset.id);
    assert_eq!(found.entity, EntityRef::group(b));

    let other_actor = store
        .changesets()
        .latest_for_entity(EntityRef::group(b), Uuid::new_v4())
        .await
        .unwrap();
    assert!(other_actor.is_none());

    let mut batch = ChangeBatch::new(Utc::now());
    batch.restore(changeset.id, EntityRef::group(b));
    store.writer().commit(batch).await.unwrap();

    let restored = store
        .groups()
        .get_by_id(b, DeletionScope::Active)
        .await
        .unwrap();
    assert!(restored.deleted_at.is_none());
    assert!(
        store
            .changesets()
            .records(changeset.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn depth_updates_and_hard_deletes_apply() {
    let store = setup().await;
    let (a, b, link) = seed_pair(&store).await;

    let mut batch = ChangeBatch::new(Utc::now());
    batch.depth_updates.push(DepthUpdate {
        id: link.id,
        depth: 2,
    });
    store.writer().commit(batch).await.unwrap();

    let rows = store
        .closure()
        .paths_between(&[a], &[b], DeletionScope::Active)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].depth, 2);

    let mut batch = ChangeBatch::new(Utc::now());
    batch.discard(None, EntityRef::new(EntityKind::GroupClosure, link.id));
    store.writer().commit(batch).await.unwrap();

    let rows = store
        .closure()
        .paths_between(&[a], &[b], DeletionScope::All)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn dropped_changeset_takes_its_records() {
    let store = setup().await;
    let (a, _, _) = seed_pair(&store).await;

    let changeset = Changeset {
        id: Uuid::new_v4(),
        actor_id: Uuid::new_v4(),
        entity: EntityRef::group(a),
        created_at: Utc::now(),
    };
    let mut batch = ChangeBatch::new(Utc::now());
    batch.opened_changesets.push(changeset.clone());
    batch.soft_delete(changeset.id, EntityRef::group(a));
    store.writer().commit(batch).await.unwrap();

    let listed = store
        .changesets()
        .list_by_top_entity(EntityRef::group(a))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let mut batch = ChangeBatch::new(Utc::now());
    batch.dropped_changesets.push(changeset.id);
    store.writer().commit(batch).await.unwrap();

    assert!(
        store
            .changesets()
            .get_by_id(changeset.id)
            .await
            .is_err()
    );
    assert!(
        store
            .changesets()
            .records(changeset.id)
            .await
            .unwrap()
            .is_empty()
    );
}
