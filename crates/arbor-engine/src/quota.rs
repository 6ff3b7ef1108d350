//! Quota resolution.
//!
//! Group quota is not inherited by descendant groups as such: it is
//! resolved only for member profiles, through the ancestor chains of
//! the groups they belong to.

use std::collections::BTreeMap;

use arbor_core::error::ArborResult;
use arbor_core::models::entity::{DeletionScope, Subject, is_effective};
use arbor_core::models::quota::QuotaRelation;
use arbor_core::repository::{ClosureRepository, MembershipRepository, QuotaRepository, Store};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::context::EngineContext;

/// Effective maximum per material id.
pub type QuotaMap = BTreeMap<Uuid, u32>;

/// Largest unexpired `maxnum` per material; materials whose best value
/// is zero are left out.
pub fn merge_max(rows: &[QuotaRelation], now: DateTime<Utc>) -> QuotaMap {
    let mut merged = QuotaMap::new();
    for row in rows.iter().filter(|r| is_effective(r.expiry, now)) {
        let entry = merged.entry(row.material_id).or_insert(0);
        *entry = (*entry).max(row.maxnum);
    }
    merged.retain(|_, max| *max > 0);
    merged
}

/// Direct rows replace inherited values outright, whatever their size.
pub fn apply_overrides(inherited: QuotaMap, direct: &[QuotaRelation], now: DateTime<Utc>) -> QuotaMap {
    let mut effective = inherited;
    let mut overrides = QuotaMap::new();
    for row in direct.iter().filter(|r| is_effective(r.expiry, now)) {
        let entry = overrides.entry(row.material_id).or_insert(0);
        *entry = (*entry).max(row.maxnum);
    }
    effective.extend(overrides);
    effective
}

pub struct QuotaResolver<S: Store> {
    ctx: EngineContext<S>,
}

impl<S: Store> Clone for QuotaResolver<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: Store> QuotaResolver<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Maximum quota per material over every ancestor (self included)
    /// of `groups`.
    pub async fn estimate_inherited_quota(&self, groups: &[Uuid]) -> ArborResult<QuotaMap> {
        let now = self.ctx.clock.now();
        self.estimate_at(groups, now).await
    }

    async fn estimate_at(&self, groups: &[Uuid], now: DateTime<Utc>) -> ArborResult<QuotaMap> {
        let store = &self.ctx.store;
        let mut ancestors: Vec<Uuid> = store
            .closure()
            .ancestors_of(groups, DeletionScope::Active)
            .await?
            .into_iter()
            .map(|r| r.ancestor_id)
            .collect();
        ancestors.sort();
        ancestors.dedup();

        let subjects: Vec<Subject> = ancestors.into_iter().map(Subject::Group).collect();
        let rows = store
            .quotas()
            .list_for_subjects(&subjects, DeletionScope::Active)
            .await?;
        Ok(merge_max(&rows, now))
    }

    /// Inherited quota of the profile's groups overlaid with the
    /// profile's own quota rows.
    pub async fn resolve_effective_quota(&self, profile_id: Uuid) -> ArborResult<QuotaMap> {
        let now = self.ctx.clock.now();
        let store = &self.ctx.store;

        let groups: Vec<Uuid> = store
            .memberships()
            .list_by_profile(profile_id, DeletionScope::Active)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();
        let inherited = self.estimate_at(&groups, now).await?;

        let direct = store
            .quotas()
            .list_for_subjects(&[Subject::Profile(profile_id)], DeletionScope::Active)
            .await?;
        let effective = apply_overrides(inherited, &direct, now);

        debug!(
            profile = %profile_id,
            groups = groups.len(),
            materials = effective.len(),
            "Effective quota resolved"
        );
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quota(material: Uuid, maxnum: u32, expiry: Option<DateTime<Utc>>) -> QuotaRelation {
        QuotaRelation {
            id: Uuid::new_v4(),
            subject: Subject::Group(Uuid::new_v4()),
            material_id: material,
            maxnum,
            expiry,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn merge_takes_the_maximum() {
        let now = Utc::now();
        let m = Uuid::new_v4();
        let merged = merge_max(&[quota(m, 3, None), quota(m, 7, None), quota(m, 5, None)], now);
        assert_eq!(merged.get(&m), Some(&7));
    }

    #[test]
    fn merge_skips_expired_and_zero() {
        let now = Utc::now();
        let (m, z) = (Uuid::new_v4(), Uuid::new_v4());
        let merged = merge_max(
            &[
                quota(m, 9, Some(now - Duration::days(1))),
                quota(m, 2, Some(now + Duration::days(1))),
                quota(z, 0, None),
            ],
            now,
        );
        assert_eq!(merged.get(&m), Some(&2));
        assert!(!merged.contains_key(&z));
    }

    #[test]
    fn direct_rows_win_even_when_smaller() {
        let now = Utc::now();
        let (m, n) = (Uuid::new_v4(), Uuid::new_v4());
        let inherited: QuotaMap = [(m, 10), (n, 4)].into_iter().collect();
        let effective = apply_overrides(inherited, &[quota(m, 1, None)], now);
        assert_eq!(effective.get(&m), Some(&1));
        assert_eq!(effective.get(&n), Some(&4));
    }

    #[test]
    fn expired_direct_row_keeps_inherited() {
        let now = Utc::now();
        let m = Uuid::new_v4();
        let inherited: QuotaMap = [(m, 5)].into_iter().collect();
        let effective =
            apply_overrides(inherited, &[quota(m, 9, Some(now - Duration::hours(1)))], now);
        assert_eq!(effective.get(&m), Some(&5));
    }
}
