//! Engine facade wiring every service to one shared context.

use std::sync::Arc;

use arbor_core::clock::Clock;
use arbor_core::repository::Store;
use arbor_core::task::TaskSink;

use crate::assignment::AssignmentService;
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::privilege::PrivilegeResolver;
use crate::profile::ProfileService;
use crate::quota::QuotaResolver;
use crate::tree::TreeService;

pub struct Engine<S: Store> {
    pub tree: TreeService<S>,
    pub profiles: ProfileService<S>,
    pub assignments: AssignmentService<S>,
    pub quota: QuotaResolver<S>,
    pub privileges: PrivilegeResolver<S>,
    ctx: EngineContext<S>,
}

impl<S: Store> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self::from_context(self.ctx.clone())
    }
}

impl<S: Store> Engine<S> {
    pub fn new(
        store: S,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn TaskSink>,
    ) -> Self {
        Self::from_context(EngineContext::new(store, config, clock, sink))
    }

    pub fn from_context(ctx: EngineContext<S>) -> Self {
        Self {
            tree: TreeService::new(ctx.clone()),
            profiles: ProfileService::new(ctx.clone()),
            assignments: AssignmentService::new(ctx.clone()),
            quota: QuotaResolver::new(ctx.clone()),
            privileges: PrivilegeResolver::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &EngineContext<S> {
        &self.ctx
    }
}
