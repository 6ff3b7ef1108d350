//! Arbor engine: closure-table group tree, changeset ledger with
//! recovery, quota inheritance and role/privilege synchronization.
//!
//! Every service is generic over a [`Store`](arbor_core::repository::Store)
//! so the engine has no dependency on the database crate.

pub mod assignment;
pub mod closure;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod privilege;
pub mod profile;
pub mod quota;
pub mod recovery;
pub mod tree;
pub mod worker;

pub use config::{EngineConfig, ROLE_ID_STAFF, ROLE_ID_SUPERUSER};
pub use context::{ActorContext, EngineContext};
pub use engine::Engine;
pub use error::TreeError;
pub use privilege::{PrivilegeResolver, SyncOutcome, SyncReport};
pub use profile::AccountCredentials;
pub use quota::{QuotaMap, QuotaResolver};
pub use recovery::{PrivilegeRecoveryPolicy, RecoveryMode, RecoveryPolicy};
pub use tree::DeleteMode;
pub use worker::{ChannelTaskSink, PrivilegeRefreshWorker, RefreshReport};
