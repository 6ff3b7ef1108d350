//! Shared collaborators of every engine service.

use std::sync::Arc;

use arbor_core::clock::Clock;
use arbor_core::repository::Store;
use arbor_core::task::{PrivilegeRefreshTask, TaskSink};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;

/// Caller identity of a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: Uuid,
}

impl ActorContext {
    pub fn new(actor_id: Uuid) -> Self {
        Self { actor_id }
    }
}

/// Store, configuration, clock, task sink and the tree lock, shared by
/// cloning.
pub struct EngineContext<S: Store> {
    pub(crate) store: S,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sink: Arc<dyn TaskSink>,
    /// Held for the whole read-compute-write cycle of every tree,
    /// membership, grant and account mutation.
    pub(crate) tree_lock: Arc<Mutex<()>>,
}

impl<S: Store> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            sink: Arc::clone(&self.sink),
            tree_lock: Arc::clone(&self.tree_lock),
        }
    }
}

impl<S: Store> EngineContext<S> {
    pub fn new(
        store: S,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn TaskSink>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            sink,
            tree_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hand a refresh task to the sink after a commit. A refused task
    /// is logged, not returned: the mutation has already landed.
    pub(crate) fn dispatch(&self, task: PrivilegeRefreshTask) {
        if task.is_empty() {
            return;
        }
        let name = task.name();
        match self.sink.enqueue(task) {
            Ok(()) => debug!(task = name, "Privilege refresh enqueued"),
            Err(e) => warn!(task = name, error = %e, "Privilege refresh not enqueued"),
        }
    }
}
