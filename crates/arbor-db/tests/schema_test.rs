//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    arbor_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "user_group",
        "group_closure",
        "profile",
        "login_account",
        "account_role",
        "group_relation",
        "applied_role",
        "quota_material",
        "quota_relation",
        "changeset",
        "soft_delete_record",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    arbor_db::run_migrations(&db).await.unwrap();
    arbor_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT VALUE version FROM _migration").await.unwrap();
    let versions: Vec<u32> = result.take(0).unwrap();
    assert_eq!(versions, vec![1]);
}
