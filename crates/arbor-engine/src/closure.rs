//! Closure store operations.
//!
//! The pure functions here compute closure-row changes; the async ones
//! read the rows they need through the store. Nothing in this module
//! writes: callers collect the results into a `ChangeBatch`.

use std::collections::{BTreeSet, HashMap};

use arbor_core::batch::{DepthUpdate, NewPath};
use arbor_core::error::{ArborError, ArborResult};
use arbor_core::models::closure::GroupClosure;
use arbor_core::models::entity::DeletionScope;
use arbor_core::repository::{ClosureRepository, Store};
use tracing::error;
use uuid::Uuid;

use crate::error::TreeError;

/// New depths for `rows` after adding `delta`. Self rows never move and
/// no non-self row may start or end below depth 1: either case means
/// the table was already inconsistent.
pub fn shift_depth(rows: &[GroupClosure], delta: i32) -> Result<Vec<DepthUpdate>, TreeError> {
    rows.iter()
        .map(|row| {
            if row.is_self_row() {
                return Err(TreeError::SelfRowShift { row: row.id });
            }
            let shifted = i64::from(row.depth) + i64::from(delta);
            if row.depth < 1 || shifted < 1 {
                error!(row = %row.id, depth = row.depth, delta, "Closure depth underflow");
                return Err(TreeError::DepthUnderflow {
                    row: row.id,
                    depth: row.depth,
                    delta,
                });
            }
            Ok(DepthUpdate {
                id: row.id,
                depth: shifted as u32,
            })
        })
        .collect()
}

/// Rows for a new group: its self row plus one row per ancestor of the
/// parent. `parent_ancestors` are the parent's rows with
/// `descendant = parent`, its self row included.
pub fn insert_subtree(new_node: Uuid, parent_ancestors: &[GroupClosure]) -> Vec<NewPath> {
    let mut rows = Vec::with_capacity(parent_ancestors.len() + 1);
    rows.push(NewPath::new(new_node, new_node, 0));
    rows.extend(
        parent_ancestors
            .iter()
            .map(|a| NewPath::new(a.ancestor_id, new_node, a.depth + 1)),
    );
    rows
}

/// Cross product of a new parent's ancestor chain with a subtree being
/// attached under it.
pub fn attach_rows(parent_ancestors: &[GroupClosure], subtree: &[GroupClosure]) -> Vec<NewPath> {
    parent_ancestors
        .iter()
        .flat_map(|a| {
            subtree
                .iter()
                .map(move |s| {
                    NewPath::new(a.ancestor_id, s.descendant_id, a.depth + s.depth + 1)
                })
        })
        .collect()
}

/// The loop a move of `node` under `new_parent` would close, from
/// `node` down to `new_parent`, or `None` if the move is acyclic.
///
/// `subtree` holds `node`'s rows with `ancestor = node`;
/// `parent_ancestors` holds `new_parent`'s rows with
/// `descendant = new_parent`.
pub fn cycle_chain(
    node: Uuid,
    new_parent: Uuid,
    subtree: &[GroupClosure],
    parent_ancestors: &[GroupClosure],
) -> Option<Vec<Uuid>> {
    if node == new_parent {
        return Some(vec![node]);
    }
    if !subtree.iter().any(|r| r.descendant_id == new_parent) {
        return None;
    }
    let above_parent: BTreeSet<Uuid> = parent_ancestors.iter().map(|r| r.ancestor_id).collect();
    let mut chain: Vec<&GroupClosure> = subtree
        .iter()
        .filter(|r| above_parent.contains(&r.descendant_id))
        .collect();
    chain.sort_by_key(|r| r.depth);
    Some(chain.into_iter().map(|r| r.descendant_id).collect())
}

fn non_self_ids<'a>(
    rows: impl Iterator<Item = &'a GroupClosure>,
    pick: fn(&GroupClosure) -> Uuid,
) -> Vec<Uuid> {
    rows.filter(|r| r.depth > 0).map(pick).collect()
}

/// Every row linking a proper ancestor of `node` to a proper
/// descendant of `node`: the paths that run through it.
pub async fn paths_through_node<S: Store>(
    store: &S,
    node: Uuid,
    scope: DeletionScope,
) -> ArborResult<Vec<GroupClosure>> {
    let ancestors = store.closure().ancestors_of(&[node], scope).await?;
    let descendants = store.closure().descendants_of(&[node], scope).await?;
    let above = non_self_ids(ancestors.iter(), |r| r.ancestor_id);
    let below = non_self_ids(descendants.iter(), |r| r.descendant_id);
    store.closure().paths_between(&above, &below, scope).await
}

/// Closure changes of moving `node` (with its subtree) under
/// `new_parent`, or out to a root when `new_parent` is `None`.
#[derive(Debug, Clone, Default)]
pub struct ReattachPlan {
    /// Rows linking old ancestors to the subtree.
    pub removed: Vec<Uuid>,
    /// Rows linking the new ancestor chain to the subtree.
    pub added: Vec<NewPath>,
}

impl ReattachPlan {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Plan a subtree move. Fails with `LoopDetected` when `new_parent` is
/// `node` or lies inside its subtree.
pub async fn detach_reattach<S: Store>(
    store: &S,
    node: Uuid,
    new_parent: Option<Uuid>,
) -> ArborResult<ReattachPlan> {
    let subtree = store
        .closure()
        .descendants_of(&[node], DeletionScope::Active)
        .await?;
    if !subtree.iter().any(GroupClosure::is_self_row) {
        return Err(TreeError::MissingSelfRow { group: node }.into());
    }

    let parent_ancestors = match new_parent {
        Some(parent) => {
            let rows = store
                .closure()
                .ancestors_of(&[parent], DeletionScope::Active)
                .await?;
            if rows.is_empty() {
                return Err(ArborError::NotFound {
                    entity: "group".into(),
                    id: parent.to_string(),
                });
            }
            if let Some(nodes) = cycle_chain(node, parent, &subtree, &rows) {
                return Err(TreeError::Loop { nodes }.into());
            }
            rows
        }
        None => Vec::new(),
    };

    let old_ancestors = store
        .closure()
        .ancestors_of(&[node], DeletionScope::Active)
        .await?;
    let above = non_self_ids(old_ancestors.iter(), |r| r.ancestor_id);
    let members: Vec<Uuid> = subtree.iter().map(|r| r.descendant_id).collect();
    let removed = store
        .closure()
        .paths_between(&above, &members, DeletionScope::Active)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

    Ok(ReattachPlan {
        removed,
        added: attach_rows(&parent_ancestors, &subtree),
    })
}

/// Nearest-first ancestor chains, self included, keyed by the
/// descendant of each row.
pub fn ancestor_chains(rows: &[GroupClosure]) -> HashMap<Uuid, Vec<Uuid>> {
    let mut sorted: Vec<&GroupClosure> = rows.iter().collect();
    sorted.sort_by_key(|r| r.depth);
    let mut chains: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in sorted {
        chains
            .entry(row.descendant_id)
            .or_default()
            .push(row.ancestor_id);
    }
    chains
}
