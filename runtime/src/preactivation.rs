//! # Guard and resolve orchestration
//!
//! Diffs the outgoing snapshot tree against the incoming one and records what the
//! navigation owes before it may commit: a deactivate check for every mounted component
//! that goes away (deepest first), an activate check for every route that is entered.
//! Checks keep discovery order; [`check_guards`] runs them in that order and
//! [`resolve_data`] fills in resolved data for every entered route.

use futures_util::future::try_join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use waypost_core::config::Data;
use waypost_core::error::NavigationError;
use waypost_core::guard::{Guard, GuardRequest, Lookup};
use waypost_core::options::{GuardExecution, ParamsInheritance};
use waypost_core::outlet::ComponentHandle;
use waypost_core::reuse::RouteReuseStrategy;
use waypost_core::slot::{Occupancy, RegistryId, SlotRegistry};
use waypost_core::snapshot::{RouteSnapshot, RouterStateSnapshot, inherited_params_data_resolve};
use waypost_core::tree::{NodePath, TreeNode};

/// One obligation recorded by the diff.
#[derive(Debug, Clone)]
pub enum Check {
    /// Entering the route at this path of the incoming tree.
    Activate(NodePath),
    /// Leaving `route`, mounted as `component` when it owns one.
    Deactivate {
        component: Option<ComponentHandle>,
        route: Arc<RouteSnapshot>,
    },
}

impl Check {
    pub fn is_activate(&self) -> bool {
        matches!(self, Check::Activate(_))
    }
}

/// Tree diff between the committed snapshot and an incoming one.
///
/// Routes that are reused with unchanged params take over the current data and resolved
/// data, which is why the incoming tree is borrowed mutably.
pub struct PreActivation<'a> {
    current: &'a RouterStateSnapshot,
    slots: &'a SlotRegistry,
    reuse: &'a dyn RouteReuseStrategy,
    checks: Vec<Check>,
    deactivated: HashSet<uuid::Uuid>,
}

impl<'a> PreActivation<'a> {
    pub fn new(
        current: &'a RouterStateSnapshot,
        slots: &'a SlotRegistry,
        reuse: &'a dyn RouteReuseStrategy,
    ) -> Self {
        Self {
            current,
            slots,
            reuse,
            checks: Vec::new(),
            deactivated: HashSet::new(),
        }
    }

    /// Diff `future` against the current tree, starting at the root slot registry.
    pub fn traverse(mut self, future: &mut TreeNode<Arc<RouteSnapshot>>) -> Vec<Check> {
        let current = self.current;
        let root = self.slots.root();
        self.traverse_child_routes(future, Some(&current.root), Some(root), &mut Vec::new());
        self.checks
    }

    fn traverse_child_routes(
        &mut self,
        future: &mut TreeNode<Arc<RouteSnapshot>>,
        curr: Option<&TreeNode<Arc<RouteSnapshot>>>,
        registry: Option<RegistryId>,
        path: &mut NodePath,
    ) {
        let mut previous: BTreeMap<&str, &TreeNode<Arc<RouteSnapshot>>> = curr
            .map(|c| {
                c.children
                    .iter()
                    .map(|child| (child.value.outlet.as_str(), child))
                    .collect()
            })
            .unwrap_or_default();

        for (i, child) in future.children.iter_mut().enumerate() {
            let prev = previous.remove(child.value.outlet.as_str());
            path.push(i);
            self.traverse_routes(child, prev, registry, path);
            path.pop();
        }

        for (_, leftover) in previous {
            self.deactivate_route(leftover, registry);
        }
    }

    fn traverse_routes(
        &mut self,
        future: &mut TreeNode<Arc<RouteSnapshot>>,
        curr: Option<&TreeNode<Arc<RouteSnapshot>>>,
        registry: Option<RegistryId>,
        path: &mut NodePath,
    ) {
        let occupancy = registry.and_then(|r| self.slots.occupancy(r, &future.value.outlet));

        match curr {
            Some(curr) if self.reuse.should_reuse(&future.value, &curr.value) => {
                if future.value.params != curr.value.params {
                    let component = match curr.value.component {
                        Some(_) => occupancy.as_ref().map(|o| o.component.clone()),
                        None => None,
                    };
                    self.push_deactivate(component, curr.value.clone());
                    self.checks.push(Check::Activate(path.clone()));
                } else {
                    let snapshot = Arc::make_mut(&mut future.value);
                    snapshot.data = curr.value.data.clone();
                    snapshot.resolved_data = curr.value.resolved_data.clone();
                }

                let nested = match future.value.component {
                    Some(_) => occupancy.map(|o| o.nested),
                    None => registry,
                };
                self.traverse_child_routes(future, Some(curr), nested, path);
            }
            curr => {
                if let Some(curr) = curr {
                    self.deactivate_route(curr, registry);
                }
                self.checks.push(Check::Activate(path.clone()));

                let nested = match future.value.component {
                    Some(_) => None,
                    None => registry,
                };
                self.traverse_child_routes(future, None, nested, path);
            }
        }
    }

    /// A route with a component gives up its own slot. A componentless route has no slot
    /// of its own, so everything mounted in the parent registry goes.
    fn deactivate_route(&mut self, curr: &TreeNode<Arc<RouteSnapshot>>, registry: Option<RegistryId>) {
        let Some(registry) = registry else {
            return;
        };
        if curr.value.component.is_some() {
            if let Some(occupancy) = self.slots.occupancy(registry, &curr.value.outlet) {
                self.deactivate_outlet_and_children(occupancy);
            }
        } else {
            self.deactivate_registry(registry);
        }
    }

    fn deactivate_registry(&mut self, registry: RegistryId) {
        for (_, occupancy) in self.slots.occupied(registry) {
            self.deactivate_outlet_and_children(occupancy);
        }
    }

    fn deactivate_outlet_and_children(&mut self, occupancy: Occupancy) {
        self.deactivate_registry(occupancy.nested);
        self.push_deactivate(Some(occupancy.component), occupancy.route.snapshot());
    }

    fn push_deactivate(&mut self, component: Option<ComponentHandle>, route: Arc<RouteSnapshot>) {
        if let Some(component) = &component {
            if !self.deactivated.insert(component.id()) {
                return;
            }
        }
        self.checks.push(Check::Deactivate { component, route });
    }
}

/// Expand checks into guard invocations, in execution order.
fn guard_requests(checks: &[Check], state: &Arc<RouterStateSnapshot>) -> Vec<(String, GuardRequest)> {
    let mut requests = Vec::new();
    for check in checks {
        match check {
            Check::Activate(path) => {
                let Some(node) = state.root.node(path) else {
                    continue;
                };
                let child = node.value.clone();
                let chain = state.root.path_from_root(path);
                for ancestor in chain.iter().rev().skip(1) {
                    for token in ancestor.can_activate_child() {
                        requests.push((
                            token.clone(),
                            GuardRequest::ActivateChild {
                                route: Arc::clone(ancestor),
                                child: child.clone(),
                                state: state.clone(),
                            },
                        ));
                    }
                }
                for token in child.can_activate() {
                    requests.push((
                        token.clone(),
                        GuardRequest::Activate {
                            route: child.clone(),
                            state: state.clone(),
                        },
                    ));
                }
            }
            Check::Deactivate { component, route } => {
                for token in route.can_deactivate() {
                    requests.push((
                        token.clone(),
                        GuardRequest::Deactivate {
                            component: component.clone(),
                            route: route.clone(),
                            state: state.clone(),
                        },
                    ));
                }
            }
        }
    }
    requests
}

fn lookup_guard(lookup: &dyn Lookup, token: &str) -> Result<Arc<dyn Guard>, NavigationError> {
    lookup
        .guard(token)
        .ok_or_else(|| NavigationError::MissingProvider(token.to_string()))
}

/// Run every guard the checks call for. `Ok(false)` means a guard denied the navigation.
pub async fn check_guards(
    checks: &[Check],
    state: &Arc<RouterStateSnapshot>,
    lookup: &dyn Lookup,
    mode: GuardExecution,
) -> Result<bool, NavigationError> {
    let requests = guard_requests(checks, state);
    if requests.is_empty() {
        return Ok(true);
    }
    tracing::debug!(guards = requests.len(), ?mode, "running guards");

    match mode {
        GuardExecution::Sequential => {
            for (token, request) in requests {
                let guard = lookup_guard(lookup, &token)?;
                match guard.check(&request).resolve().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(%token, kind = request.kind(), route = %request.route(), "guard denied");
                        return Ok(false);
                    }
                    Err(e) => return Err(NavigationError::guard(token, e)),
                }
            }
            Ok(true)
        }
        GuardExecution::Concurrent => {
            let mut pending = FuturesUnordered::new();
            for (token, request) in requests {
                let guard = lookup_guard(lookup, &token)?;
                let eventual = guard.check(&request);
                pending.push(async move { (token, request.kind(), eventual.resolve().await) });
            }
            while let Some((token, kind, result)) = pending.next().await {
                match result {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(%token, kind, "guard denied, dropping {} pending", pending.len());
                        return Ok(false);
                    }
                    Err(e) => return Err(NavigationError::guard(token, e)),
                }
            }
            Ok(true)
        }
    }
}

/// Run the resolvers of every entered route, parents before children, and merge the
/// results into each route's data.
pub async fn resolve_data(
    checks: &[Check],
    snapshot: &mut RouterStateSnapshot,
    lookup: &dyn Lookup,
    inheritance: ParamsInheritance,
) -> Result<(), NavigationError> {
    for check in checks {
        let Check::Activate(path) = check else {
            continue;
        };
        let Some(route) = snapshot.node(path).cloned() else {
            continue;
        };

        let resolved = run_resolvers(&route, snapshot, lookup).await?;
        if let Some(node) = snapshot.root.node_mut(path) {
            Arc::make_mut(&mut node.value).resolved_data = resolved;
        }

        let inherited = inherited_params_data_resolve(&snapshot.path_from_root(path), inheritance);
        if let Some(node) = snapshot.root.node_mut(path) {
            Arc::make_mut(&mut node.value).data.extend(inherited.resolve);
        }
    }
    Ok(())
}

async fn run_resolvers(
    route: &Arc<RouteSnapshot>,
    snapshot: &RouterStateSnapshot,
    lookup: &dyn Lookup,
) -> Result<Data, NavigationError> {
    let Some(config) = &route.route_config else {
        return Ok(Data::new());
    };
    if config.resolve.is_empty() {
        return Ok(Data::new());
    }

    let state = Arc::new(snapshot.clone());
    let pending = config
        .resolve
        .iter()
        .map(|(key, token)| {
            let resolver = lookup
                .resolver(token)
                .ok_or_else(|| NavigationError::MissingProvider(token.clone()))?;
            let eventual = resolver.resolve(route, &state);
            let (key, token) = (key.clone(), token.clone());
            Ok(async move {
                match eventual.resolve().await {
                    Ok(value) => Ok((key, value)),
                    Err(e) => Err(NavigationError::resolver(key, token, e)),
                }
            })
        })
        .collect::<Result<Vec<_>, NavigationError>>()?;

    tracing::debug!(route = %route, resolvers = pending.len(), "resolving data");
    Ok(try_join_all(pending).await?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::recognize;
    use parking_lot::Mutex;
    use serde_json::json;
    use waypost_core::config::{Route, RouteTable};
    use waypost_core::guard::{Eventual, Registry};
    use waypost_core::reuse::{ConfigAndParams, ConfigIdentity};
    use waypost_core::route::{ActivatedRoute, SharedCells};
    use waypost_core::serializer::{DefaultUrlSerializer, UrlSerializer};

    fn snapshot(table: &RouteTable, url: &str) -> RouterStateSnapshot {
        let tree = DefaultUrlSerializer.parse(url).unwrap();
        let root = recognize(&tree, table, ParamsInheritance::EmptyOnly).unwrap();
        RouterStateSnapshot::new(url, root)
    }

    /// Occupy `registry` with the route at `path`, returning the nested registry.
    fn mount(slots: &SlotRegistry, registry: RegistryId, state: &RouterStateSnapshot, path: &[usize]) -> RegistryId {
        let snapshot = state.node(path).unwrap().clone();
        let route = ActivatedRoute::new(snapshot.clone(), SharedCells::default());
        route.advance();
        let nested = slots.create_nested(registry).unwrap();
        let component = ComponentHandle::bare(snapshot.component.clone().unwrap());
        slots
            .occupy(registry, &snapshot.outlet, Occupancy { component, route, nested })
            .unwrap();
        nested
    }

    fn describe(checks: &[Check]) -> Vec<String> {
        checks
            .iter()
            .map(|c| match c {
                Check::Activate(path) => format!("activate {:?}", path),
                Check::Deactivate { component, route } => format!(
                    "deactivate {} {}",
                    component.as_ref().map(|c| c.component()).unwrap_or("-"),
                    route.path()
                ),
            })
            .collect()
    }

    fn team_table() -> RouteTable {
        RouteTable::compile(&[Route::new("team/:id")
            .component("TeamCmp")
            .children(vec![Route::new("user/:name").component("UserCmp")])])
        .unwrap()
    }

    #[test]
    fn param_change_under_reused_parent() {
        let table = team_table();
        let current = snapshot(&table, "/team/33/user/11");
        let slots = SlotRegistry::new();
        let team = mount(&slots, slots.root(), &current, &[0]);
        mount(&slots, team, &current, &[0, 0]);

        for strategy in [&ConfigIdentity as &dyn RouteReuseStrategy, &ConfigAndParams] {
            let mut future = snapshot(&table, "/team/33/user/22");
            let checks = PreActivation::new(&current, &slots, strategy).traverse(&mut future.root);
            assert_eq!(
                describe(&checks),
                vec!["deactivate UserCmp user/11", "activate [0, 0]"],
                "{:?}",
                strategy
            );
        }
    }

    #[test]
    fn identical_navigation_records_nothing_and_keeps_data() {
        let table = team_table();
        let mut current = snapshot(&table, "/team/33/user/11");
        Arc::make_mut(&mut current.root.children[0].value)
            .data
            .insert("resolved".into(), json!(true));
        let slots = SlotRegistry::new();
        let team = mount(&slots, slots.root(), &current, &[0]);
        mount(&slots, team, &current, &[0, 0]);

        let mut future = snapshot(&table, "/team/33/user/11");
        let checks = PreActivation::new(&current, &slots, &ConfigIdentity).traverse(&mut future.root);
        assert!(checks.is_empty());
        assert_eq!(future.root.children[0].value.data.get("resolved"), Some(&json!(true)));
    }

    #[test]
    fn componentless_route_deactivates_parent_registry_deepest_first() {
        let table = RouteTable::compile(&[
            Route::new("org/:org").children(vec![
                Route::new("").component("OrgHomeCmp"),
                Route::new("").component("OrgNavCmp").outlet("nav"),
            ]),
            Route::new("home").component("HomeCmp"),
        ])
        .unwrap();
        let current = snapshot(&table, "/org/acme");
        let slots = SlotRegistry::new();
        let home = mount(&slots, slots.root(), &current, &[0, 0]);
        mount(&slots, slots.root(), &current, &[0, 1]);
        let widget = slots.create_nested(home).unwrap();
        let widget_route = ActivatedRoute::new(current.node(&[0, 0]).unwrap().clone(), SharedCells::default());
        slots
            .occupy(
                home,
                "primary",
                Occupancy {
                    component: ComponentHandle::bare("WidgetCmp"),
                    route: widget_route,
                    nested: widget,
                },
            )
            .unwrap();

        let mut future = snapshot(&table, "/home");
        let checks = PreActivation::new(&current, &slots, &ConfigIdentity).traverse(&mut future.root);
        assert_eq!(
            describe(&checks),
            vec![
                "deactivate OrgNavCmp ",
                "deactivate WidgetCmp ",
                "deactivate OrgHomeCmp ",
                "activate [0]",
            ]
        );
    }

    #[test]
    fn vacated_named_outlet_is_deactivated() {
        let table = RouteTable::compile(&[
            Route::new("team/:id").component("TeamCmp"),
            Route::new("chat").component("ChatCmp").outlet("aux"),
        ])
        .unwrap();
        let current = snapshot(&table, "/team/1(aux:chat)");
        let slots = SlotRegistry::new();
        mount(&slots, slots.root(), &current, &[0]);
        mount(&slots, slots.root(), &current, &[1]);

        let mut future = snapshot(&table, "/team/1");
        let checks = PreActivation::new(&current, &slots, &ConfigIdentity).traverse(&mut future.root);
        assert_eq!(describe(&checks), vec!["deactivate ChatCmp chat"]);
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str, allow: bool) -> impl Guard + 'static {
        let log = log.clone();
        move |_: &GuardRequest| {
            log.lock().push(name.to_string());
            Eventual::now(allow)
        }
    }

    #[tokio::test]
    async fn guards_short_circuit_in_order() {
        let table = RouteTable::compile(&[Route::new("a")
            .component("ACmp")
            .can_activate("t1")
            .can_activate("t2")
            .can_activate("t3")
            .can_activate("t4")])
        .unwrap();
        let state = Arc::new(snapshot(&table, "/a"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = Registry::new()
            .with_guard("t1", recording(&log, "t1", true))
            .with_guard("t2", recording(&log, "t2", true))
            .with_guard("t3", recording(&log, "t3", false))
            .with_guard("t4", recording(&log, "t4", true));

        let checks = vec![Check::Activate(vec![0])];
        let allowed = check_guards(&checks, &state, &registry, GuardExecution::Sequential)
            .await
            .unwrap();
        assert!(!allowed);
        assert_eq!(*log.lock(), vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn child_guards_run_nearest_ancestor_first() {
        let table = RouteTable::compile(&[Route::new("outer")
            .component("OuterCmp")
            .can_activate_child("outer")
            .children(vec![Route::new("inner")
                .component("InnerCmp")
                .can_activate_child("inner")
                .children(vec![Route::new("leaf").component("LeafCmp").can_activate("own")])])])
        .unwrap();
        let state = Arc::new(snapshot(&table, "/outer/inner/leaf"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = Registry::new()
            .with_guard("outer", recording(&log, "outer", true))
            .with_guard("inner", recording(&log, "inner", true))
            .with_guard("own", recording(&log, "own", true));

        let checks = vec![Check::Activate(vec![0, 0, 0])];
        assert!(check_guards(&checks, &state, &registry, GuardExecution::Concurrent)
            .await
            .unwrap());
        log.lock().clear();
        assert!(check_guards(&checks, &state, &registry, GuardExecution::Sequential)
            .await
            .unwrap());
        assert_eq!(*log.lock(), vec!["inner", "outer", "own"]);
    }

    #[tokio::test]
    async fn guard_errors_and_missing_tokens_fail_the_navigation() {
        let table = RouteTable::compile(&[Route::new("a").component("ACmp").can_activate("boom")]).unwrap();
        let state = Arc::new(snapshot(&table, "/a"));
        let checks = vec![Check::Activate(vec![0])];

        let err = check_guards(&checks, &state, &Registry::new(), GuardExecution::Sequential)
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::MissingProvider(token) if token == "boom"));

        let registry = Registry::new().with_guard("boom", |_: &GuardRequest| {
            Eventual::<bool>::fail(anyhow::anyhow!("backend down"))
        });
        let err = check_guards(&checks, &state, &registry, GuardExecution::Concurrent)
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::Guard { token, .. } if token == "boom"));
    }

    #[tokio::test]
    async fn resolved_data_is_merged_and_inherited() {
        let table = RouteTable::compile(&[Route::new("team/:id")
            .component("TeamCmp")
            .data("title", json!("Team"))
            .resolve("team", "loadTeam")
            .children(vec![Route::new("").component("RosterCmp")])])
        .unwrap();
        let mut state = snapshot(&table, "/team/7");
        let registry = Registry::new().with_resolver(
            "loadTeam",
            |route: &Arc<RouteSnapshot>, _: &Arc<RouterStateSnapshot>| {
                let id = route.params.get("id").cloned().unwrap_or_default();
                Eventual::later(async move { Ok(json!({ "id": id })) })
            },
        );

        let checks = vec![Check::Activate(vec![0]), Check::Activate(vec![0, 0])];
        resolve_data(&checks, &mut state, &registry, ParamsInheritance::EmptyOnly)
            .await
            .unwrap();

        let team = state.node(&[0]).unwrap();
        assert_eq!(team.resolved_data.get("team"), Some(&json!({"id": "7"})));
        assert_eq!(team.data.get("title"), Some(&json!("Team")));
        let roster = state.node(&[0, 0]).unwrap();
        assert_eq!(roster.data.get("team"), Some(&json!({"id": "7"})));
        assert!(roster.resolved_data.is_empty());
    }
}
