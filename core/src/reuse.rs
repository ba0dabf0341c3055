use crate::options::RouteReuse;
use crate::snapshot::RouteSnapshot;
use std::fmt::Debug;
use std::sync::Arc;

/// Decides whether a mounted route can stay in place for the next snapshot.
///
/// The guard diff, the router-state builder and the activation committer all ask the
/// same strategy, so the three passes agree on which nodes are reused.
pub trait RouteReuseStrategy: Send + Sync + Debug {
    fn should_reuse(&self, future: &RouteSnapshot, current: &RouteSnapshot) -> bool;
}

/// Reuse when both snapshots matched the same route-table entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigIdentity;

impl RouteReuseStrategy for ConfigIdentity {
    fn should_reuse(&self, future: &RouteSnapshot, current: &RouteSnapshot) -> bool {
        future.config_id() == current.config_id()
    }
}

/// Reuse only when the entry is the same and the params are equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigAndParams;

impl RouteReuseStrategy for ConfigAndParams {
    fn should_reuse(&self, future: &RouteSnapshot, current: &RouteSnapshot) -> bool {
        future.config_id() == current.config_id() && future.params == current.params
    }
}

impl RouteReuse {
    pub fn strategy(self) -> Arc<dyn RouteReuseStrategy> {
        match self {
            RouteReuse::Config => Arc::new(ConfigIdentity),
            RouteReuse::ConfigAndParams => Arc::new(ConfigAndParams),
        }
    }
}
