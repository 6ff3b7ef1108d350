//! Entity addressing, deletion scopes and the soft-delete contract.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of entity that can be soft-deleted and recorded in a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Group,
    GroupClosure,
    Profile,
    GroupRelation,
    AppliedRole,
    QuotaRelation,
}

impl EntityKind {
    /// Storage table backing this kind.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Group => "user_group",
            EntityKind::GroupClosure => "group_closure",
            EntityKind::Profile => "profile",
            EntityKind::GroupRelation => "group_relation",
            EntityKind::AppliedRole => "applied_role",
            EntityKind::QuotaRelation => "quota_relation",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Group => "Group",
            EntityKind::GroupClosure => "GroupClosure",
            EntityKind::Profile => "Profile",
            EntityKind::GroupRelation => "GroupRelation",
            EntityKind::AppliedRole => "AppliedRole",
            EntityKind::QuotaRelation => "QuotaRelation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Group" => Some(EntityKind::Group),
            "GroupClosure" => Some(EntityKind::GroupClosure),
            "Profile" => Some(EntityKind::Profile),
            "GroupRelation" => Some(EntityKind::GroupRelation),
            "AppliedRole" => Some(EntityKind::AppliedRole),
            "QuotaRelation" => Some(EntityKind::QuotaRelation),
            _ => None,
        }
    }

    /// Tree structure and membership, as opposed to grants.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            EntityKind::Group
                | EntityKind::GroupClosure
                | EntityKind::Profile
                | EntityKind::GroupRelation
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed pointer to one soft-deletable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub fn group(id: Uuid) -> Self {
        Self::new(EntityKind::Group, id)
    }

    pub fn profile(id: Uuid) -> Self {
        Self::new(EntityKind::Profile, id)
    }

    pub fn closure(id: Uuid) -> Self {
        Self::new(EntityKind::GroupClosure, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Which rows a read should see with respect to soft deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionScope {
    /// Only rows without a deletion marker.
    #[default]
    Active,
    /// Only soft-deleted rows.
    Deleted,
    /// Both.
    All,
}

impl DeletionScope {
    pub fn from_include_deleted(include_deleted: bool) -> Self {
        if include_deleted {
            DeletionScope::All
        } else {
            DeletionScope::Active
        }
    }

    pub fn admits(self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            DeletionScope::Active => deleted_at.is_none(),
            DeletionScope::Deleted => deleted_at.is_some(),
            DeletionScope::All => true,
        }
    }
}

/// Common behaviour of every row the changeset ledger can hide and
/// bring back.
pub trait SoftDeletable {
    fn entity_ref(&self) -> EntityRef;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Holder of an applied role or quota row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    Group(Uuid),
    Profile(Uuid),
}

impl Subject {
    pub fn id(self) -> Uuid {
        match self {
            Subject::Group(id) | Subject::Profile(id) => id,
        }
    }

    pub fn kind_str(self) -> &'static str {
        match self {
            Subject::Group(_) => "group",
            Subject::Profile(_) => "profile",
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "group" => Some(Subject::Group(id)),
            "profile" => Some(Subject::Profile(id)),
            _ => None,
        }
    }

    /// The soft-deletable entity behind the subject.
    pub fn entity_ref(self) -> EntityRef {
        match self {
            Subject::Group(id) => EntityRef::group(id),
            Subject::Profile(id) => EntityRef::profile(id),
        }
    }
}

/// Expiry window check shared by role and quota grants: a grant with
/// no expiry never lapses, otherwise it holds while `expiry` is still
/// in the future.
pub fn is_effective(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiry.is_none_or(|at| at > now)
}
