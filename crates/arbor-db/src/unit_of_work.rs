//! Atomic application of a [`ChangeBatch`].

use arbor_core::batch::{ChangeBatch, LedgerEntry};
use arbor_core::error::ArborResult;
use arbor_core::models::entity::EntityRef;
use arbor_core::repository::UnitOfWork;
use serde_json::{Value, json};
use surrealdb::{Connection, Surreal};
use tracing::debug;

use crate::error::DbError;

/// Statements run inside one transaction, in `ChangeBatch` field order.
/// Hard deletes come first so re-inserted closure pairs never collide
/// with the unique `(ancestor_id, descendant_id)` index.
const APPLY_BATCH: &str = "\
BEGIN TRANSACTION;
FOR $e IN $hard_deletes {
    DELETE type::record($e.tb, $e.id);
    DELETE soft_delete_record WHERE entity_kind = $e.kind AND entity_id = $e.id;
};
FOR $g IN $new_groups {
    CREATE type::record('user_group', $g.id) SET name = $g.name, created_at = $now;
};
FOR $p IN $new_paths {
    CREATE type::record('group_closure', $p.id) SET
        ancestor_id = $p.ancestor_id,
        descendant_id = $p.descendant_id,
        depth = $p.depth;
};
FOR $u IN $depth_updates {
    UPDATE type::record('group_closure', $u.id) SET depth = $u.depth;
};
FOR $e IN $soft_deletes {
    UPDATE type::record($e.tb, $e.id) SET deleted_at = $now;
};
FOR $e IN $restores {
    UPDATE type::record($e.tb, $e.id) SET deleted_at = NONE;
};
FOR $c IN $opened_changesets {
    CREATE type::record('changeset', $c.id) SET
        actor_id = $c.actor_id,
        entity_kind = $c.entity_kind,
        entity_id = $c.entity_id,
        created_at = $now;
};
FOR $r IN $recorded {
    CREATE soft_delete_record SET
        changeset_id = $r.changeset_id,
        entity_kind = $r.entity_kind,
        entity_id = $r.entity_id,
        created_at = $now;
};
FOR $r IN $unrecorded {
    DELETE soft_delete_record WHERE changeset_id = $r.changeset_id
        AND entity_kind = $r.entity_kind AND entity_id = $r.entity_id;
};
FOR $c IN $dropped_changesets {
    DELETE soft_delete_record WHERE changeset_id = $c;
    DELETE type::record('changeset', $c);
};
FOR $a IN $account_activations {
    UPDATE type::record('login_account', $a.profile_id) SET is_active = $a.is_active;
};
FOR $a IN $removed_accounts {
    DELETE account_role WHERE profile_id = $a;
    DELETE type::record('login_account', $a);
};
COMMIT TRANSACTION;
";

fn entity_value(entity: &EntityRef) -> Value {
    json!({
        "tb": entity.kind.table(),
        "kind": entity.kind.as_str(),
        "id": entity.id.to_string(),
    })
}

fn ledger_value(entry: &LedgerEntry) -> Value {
    json!({
        "changeset_id": entry.changeset_id.to_string(),
        "entity_kind": entry.entity.kind.as_str(),
        "entity_id": entry.entity.id.to_string(),
    })
}

/// Bind parameters for [`APPLY_BATCH`].
fn batch_params(batch: &ChangeBatch) -> Vec<(&'static str, Value)> {
    vec![
        (
            "hard_deletes",
            Value::Array(batch.hard_deletes.iter().map(entity_value).collect()),
        ),
        (
            "new_groups",
            Value::Array(
                batch
                    .new_groups
                    .iter()
                    .map(|g| json!({ "id": g.id.to_string(), "name": g.name }))
                    .collect(),
            ),
        ),
        (
            "new_paths",
            Value::Array(
                batch
                    .new_paths
                    .iter()
                    .map(|p| {
                        json!({
                            "id": p.id.to_string(),
                            "ancestor_id": p.ancestor_id.to_string(),
                            "descendant_id": p.descendant_id.to_string(),
                            "depth": p.depth,
                        })
                    })
                    .collect(),
            ),
        ),
        (
            "depth_updates",
            Value::Array(
                batch
                    .depth_updates
                    .iter()
                    .map(|u| json!({ "id": u.id.to_string(), "depth": u.depth }))
                    .collect(),
            ),
        ),
        (
            "soft_deletes",
            Value::Array(batch.soft_deletes.iter().map(entity_value).collect()),
        ),
        (
            "restores",
            Value::Array(batch.restores.iter().map(entity_value).collect()),
        ),
        (
            "opened_changesets",
            Value::Array(
                batch
                    .opened_changesets
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id.to_string(),
                            "actor_id": c.actor_id.to_string(),
                            "entity_kind": c.entity.kind.as_str(),
                            "entity_id": c.entity.id.to_string(),
                        })
                    })
                    .collect(),
            ),
        ),
        (
            "recorded",
            Value::Array(batch.recorded.iter().map(ledger_value).collect()),
        ),
        (
            "unrecorded",
            Value::Array(batch.unrecorded.iter().map(ledger_value).collect()),
        ),
        (
            "dropped_changesets",
            Value::Array(
                batch
                    .dropped_changesets
                    .iter()
                    .map(|id| Value::String(id.to_string()))
                    .collect(),
            ),
        ),
        (
            "account_activations",
            Value::Array(
                batch
                    .account_activations
                    .iter()
                    .map(|a| {
                        json!({
                            "profile_id": a.profile_id.to_string(),
                            "is_active": a.is_active,
                        })
                    })
                    .collect(),
            ),
        ),
        (
            "removed_accounts",
            Value::Array(
                batch
                    .removed_accounts
                    .iter()
                    .map(|id| Value::String(id.to_string()))
                    .collect(),
            ),
        ),
    ]
}

pub struct SurrealUnitOfWork<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealUnitOfWork<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealUnitOfWork<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UnitOfWork for SurrealUnitOfWork<C> {
    async fn commit(&self, batch: ChangeBatch) -> ArborResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        debug!(
            hard_deletes = batch.hard_deletes.len(),
            new_paths = batch.new_paths.len(),
            depth_updates = batch.depth_updates.len(),
            soft_deletes = batch.soft_deletes.len(),
            restores = batch.restores.len(),
            "Applying change batch"
        );

        let mut builder = self.db.query(APPLY_BATCH).bind(("now", batch.now));
        for param in batch_params(&batch) {
            builder = builder.bind(param);
        }

        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::models::entity::EntityKind;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn entity_value_carries_table_and_kind() {
        let id = Uuid::new_v4();
        let value = entity_value(&EntityRef::new(EntityKind::GroupRelation, id));
        assert_eq!(value["tb"], "group_relation");
        assert_eq!(value["kind"], "GroupRelation");
        assert_eq!(value["id"], id.to_string());
    }

    #[test]
    fn every_statement_parameter_is_bound() {
        let params = batch_params(&ChangeBatch::new(Utc::now()));
        for (name, _) in &params {
            assert!(
                APPLY_BATCH.contains(&format!("${name}")),
                "unused parameter {name}"
            );
        }
        assert_eq!(params.len(), 12);
    }
}
