//! Live routes.
//!
//! An [`ActivatedRoute`] is the long-lived counterpart of a [`RouteSnapshot`]: it keeps its
//! identity for as long as the route stays mounted and exposes params, url and data as
//! observable cells. A navigation first sets the *future* snapshot, and the committer
//! later [advances](ActivatedRoute::advance) the route, publishing whatever changed.

use crate::cell::ObservableCell;
use crate::config::{Data, RouteConfig, RouteConfigId};
use crate::snapshot::{RouteSnapshot, RouterStateSnapshot};
use crate::tree::TreeNode;
use crate::url_tree::{Params, UrlSegment};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Router-wide cells shared by every route of every state.
#[derive(Debug, Clone, Default)]
pub struct SharedCells {
    pub query_params: Arc<ObservableCell<Params>>,
    pub fragment: Arc<ObservableCell<Option<String>>>,
}

impl SharedCells {
    /// Publish the snapshot's query params and fragment. Returns whether anything changed.
    pub fn publish(&self, snapshot: &RouterStateSnapshot) -> bool {
        let query_changed = self.query_params.publish(snapshot.query_params().clone());
        let fragment_changed = self
            .fragment
            .publish(snapshot.fragment().map(str::to_string));
        query_changed || fragment_changed
    }
}

struct Inner {
    params: ObservableCell<Params>,
    url: ObservableCell<Vec<UrlSegment>>,
    data: ObservableCell<Data>,
    shared: SharedCells,
    future: RwLock<Arc<RouteSnapshot>>,
    current: RwLock<Option<Arc<RouteSnapshot>>>,
}

/// Handle to a live route. Clones share identity.
#[derive(Clone)]
pub struct ActivatedRoute {
    inner: Arc<Inner>,
}

impl ActivatedRoute {
    /// A route that has not been activated yet: its cells hold the future values, but
    /// [`ActivatedRoute::current_snapshot`] is empty until the first `advance`.
    pub fn new(future: Arc<RouteSnapshot>, shared: SharedCells) -> Self {
        Self {
            inner: Arc::new(Inner {
                params: ObservableCell::new(future.params.clone()),
                url: ObservableCell::new(future.url.clone()),
                data: ObservableCell::new(future.data.clone()),
                shared,
                future: RwLock::new(future),
                current: RwLock::new(None),
            }),
        }
    }

    pub fn params(&self) -> &ObservableCell<Params> {
        &self.inner.params
    }

    pub fn url(&self) -> &ObservableCell<Vec<UrlSegment>> {
        &self.inner.url
    }

    pub fn data(&self) -> &ObservableCell<Data> {
        &self.inner.data
    }

    pub fn query_params(&self) -> &ObservableCell<Params> {
        &self.inner.shared.query_params
    }

    pub fn fragment(&self) -> &ObservableCell<Option<String>> {
        &self.inner.shared.fragment
    }

    pub fn shared(&self) -> &SharedCells {
        &self.inner.shared
    }

    /// The snapshot the in-flight (or last) navigation targets.
    pub fn future_snapshot(&self) -> Arc<RouteSnapshot> {
        self.inner.future.read().clone()
    }

    pub fn set_future_snapshot(&self, snapshot: Arc<RouteSnapshot>) {
        *self.inner.future.write() = snapshot;
    }

    /// The snapshot last published to subscribers, if the route was ever activated.
    pub fn current_snapshot(&self) -> Option<Arc<RouteSnapshot>> {
        self.inner.current.read().clone()
    }

    /// Current snapshot, or the future one before the first activation.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.current_snapshot()
            .unwrap_or_else(|| self.future_snapshot())
    }

    pub fn outlet(&self) -> String {
        self.future_snapshot().outlet.clone()
    }

    pub fn component(&self) -> Option<String> {
        self.future_snapshot().component.clone()
    }

    pub fn route_config(&self) -> Option<Arc<RouteConfig>> {
        self.future_snapshot().route_config.clone()
    }

    pub fn config_id(&self) -> Option<RouteConfigId> {
        self.future_snapshot().config_id()
    }

    /// Move the future snapshot into place and notify the cells whose values changed.
    pub fn advance(&self) {
        let next = self.future_snapshot();
        *self.inner.current.write() = Some(next.clone());

        // Cells were seeded from the first future snapshot; resolvers may have replaced it
        // since, so a first activation publishes too.
        self.inner.params.publish(next.params.clone());
        self.inner.url.publish(next.url.clone());
        self.inner.data.publish(next.data.clone());
    }

    pub fn same(&self, other: &ActivatedRoute) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ActivatedRoute {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for ActivatedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.future_snapshot();
        f.debug_struct("ActivatedRoute")
            .field("route", &snapshot.to_string())
            .field("outlet", &snapshot.outlet)
            .field("active", &self.inner.current.read().is_some())
            .finish()
    }
}

impl fmt::Display for ActivatedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current_snapshot() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "Future({})", self.future_snapshot()),
        }
    }
}

/// The live route tree paired with the snapshot it was built from.
#[derive(Debug, Clone)]
pub struct RouterState {
    pub snapshot: Arc<RouterStateSnapshot>,
    pub root: TreeNode<ActivatedRoute>,
    pub shared: SharedCells,
}

impl RouterState {
    /// The state before any navigation: an activated root and nothing else.
    pub fn empty() -> Self {
        let snapshot = Arc::new(RouterStateSnapshot::empty());
        let shared = SharedCells::default();
        let root = ActivatedRoute::new(snapshot.root.value.clone(), shared.clone());
        root.advance();
        Self {
            snapshot,
            root: TreeNode::leaf(root),
            shared,
        }
    }

    pub fn url(&self) -> &str {
        &self.snapshot.url
    }

    pub fn route(&self, path: &[usize]) -> Option<&ActivatedRoute> {
        self.root.node(path).map(|n| &n.value)
    }

    /// Every live route in pre-order.
    pub fn routes(&self) -> Vec<&ActivatedRoute> {
        let mut out = Vec::new();
        self.root.for_each(&mut |r| out.push(r));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(params: &[(&str, &str)]) -> Arc<RouteSnapshot> {
        let mut s = RouteSnapshot::root(Params::new(), None);
        s.params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(s)
    }

    #[tokio::test]
    async fn advance_notifies_only_changed_cells() {
        let route = ActivatedRoute::new(snapshot_with(&[("id", "1")]), SharedCells::default());
        route.advance();

        let mut params = route.params().subscribe();
        let mut url = route.url().subscribe();

        route.set_future_snapshot(snapshot_with(&[("id", "2")]));
        route.advance();

        assert!(params.has_changed().unwrap());
        assert!(!url.has_changed().unwrap());
        assert_eq!(params.borrow_and_update().get("id").map(String::as_str), Some("2"));
    }

    #[test]
    fn identity_is_shared_by_clones() {
        let a = ActivatedRoute::new(snapshot_with(&[]), SharedCells::default());
        let b = a.clone();
        let c = ActivatedRoute::new(snapshot_with(&[]), SharedCells::default());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_state_root_is_active() {
        let state = RouterState::empty();
        assert!(state.root.value.current_snapshot().is_some());
        assert_eq!(state.routes().len(), 1);
    }
}
