//! # Activation
//!
//! Second walk over the transition, after guards and resolvers approved it. Where the
//! guard diff only recorded checks, this pass mutates: reused routes are advanced in
//! place, replaced routes are unmounted (deepest first) and new ones are mounted into
//! their slots with a fresh nested registry.
//!
//! Slots that exist before the walk are checked up front, so a missing slot fails the
//! transition before anything is unmounted. A failure past that point (a component that
//! refuses to mount, a slot its freshly mounted parent never registered) is undone with
//! [`ActivateRoutes::restore`], which brings the slots back in line with the current state.

use std::collections::BTreeMap;
use std::sync::Arc;
use waypost_core::context::MountContext;
use waypost_core::error::SlotError;
use waypost_core::outlet::MountRequest;
use waypost_core::route::{ActivatedRoute, RouterState};
use waypost_core::slot::{Occupancy, RegistryId, SlotRegistry};
use waypost_core::tree::TreeNode;

pub struct ActivateRoutes<'a> {
    future: &'a RouterState,
    current: &'a RouterState,
    slots: &'a SlotRegistry,
    context: &'a Arc<MountContext>,
}

impl<'a> ActivateRoutes<'a> {
    pub fn new(
        future: &'a RouterState,
        current: &'a RouterState,
        slots: &'a SlotRegistry,
        context: &'a Arc<MountContext>,
    ) -> Self {
        Self {
            future,
            current,
            slots,
            context,
        }
    }

    pub fn activate(&self) -> Result<(), SlotError> {
        self.preflight(&self.future.root, Some(&self.current.root), self.slots.root())?;
        if self.future.shared.publish(&self.future.snapshot) {
            tracing::debug!("published query params and fragment");
        }
        self.future.root.value.advance();
        self.activate_child_routes(&self.future.root, Some(&self.current.root), self.slots.root())
    }

    /// Read-only walk checking every slot the transition mounts into inside a registry
    /// that already exists. Registries of components mounted by this transition are filled
    /// by the component itself and can only be checked while mounting.
    fn preflight(
        &self,
        future: &TreeNode<ActivatedRoute>,
        curr: Option<&TreeNode<ActivatedRoute>>,
        registry: RegistryId,
    ) -> Result<(), SlotError> {
        let previous: BTreeMap<String, &TreeNode<ActivatedRoute>> = curr
            .map(|c| {
                c.children
                    .iter()
                    .map(|child| (child.value.snapshot().outlet.clone(), child))
                    .collect()
            })
            .unwrap_or_default();

        for child in &future.children {
            let route = &child.value;
            let slot = route.outlet();
            let prev = previous.get(&slot).copied().filter(|c| route.same(&c.value));
            match route.component() {
                Some(component) => {
                    let occupancy = self
                        .slots
                        .occupancy(registry, &slot)
                        .filter(|o| o.route.same(route));
                    match (prev, occupancy) {
                        (Some(prev), Some(occupancy)) => self.preflight(child, Some(prev), occupancy.nested)?,
                        _ if self.slots.outlet(registry, &slot).is_none() => {
                            return Err(SlotError::MissingSlot { slot, component });
                        }
                        _ => {}
                    }
                }
                None => self.preflight(child, prev, registry)?,
            }
        }
        Ok(())
    }

    /// Make the slots match the current state again after [`activate`](Self::activate)
    /// failed half way: whatever the failed walk mounted is unmounted, and routes of the
    /// current state that lost their component are mounted afresh.
    pub fn restore(&self) -> Result<(), SlotError> {
        self.reconcile(&self.current.root, self.slots.root())
    }

    fn reconcile(&self, node: &TreeNode<ActivatedRoute>, registry: RegistryId) -> Result<(), SlotError> {
        let mut expected = BTreeMap::new();
        mounted_children(node, &mut expected);

        for (slot, occupancy) in self.slots.occupied(registry) {
            if !expected.get(&slot).is_some_and(|n| n.value.same(&occupancy.route)) {
                self.deactivate_slot(registry, &slot);
            }
        }

        for (slot, child) in expected {
            let nested = match self.slots.occupancy(registry, &slot) {
                Some(occupancy) => occupancy.nested,
                None => {
                    let Some(component) = child.value.component() else {
                        continue;
                    };
                    tracing::debug!(%slot, %component, "remounting");
                    self.place_component_into_outlet(&child.value, component, registry)?
                }
            };
            self.reconcile(child, nested)?;
        }
        Ok(())
    }

    fn activate_child_routes(
        &self,
        future: &TreeNode<ActivatedRoute>,
        curr: Option<&TreeNode<ActivatedRoute>>,
        registry: RegistryId,
    ) -> Result<(), SlotError> {
        let mut previous: BTreeMap<String, &TreeNode<ActivatedRoute>> = curr
            .map(|c| {
                c.children
                    .iter()
                    .map(|child| (child.value.snapshot().outlet.clone(), child))
                    .collect()
            })
            .unwrap_or_default();

        for child in &future.children {
            let prev = previous.remove(&child.value.outlet());
            self.activate_routes(child, prev, registry)?;
        }

        for (_, leftover) in previous {
            self.deactivate_route_and_children(leftover, registry);
        }
        Ok(())
    }

    fn activate_routes(
        &self,
        future: &TreeNode<ActivatedRoute>,
        curr: Option<&TreeNode<ActivatedRoute>>,
        registry: RegistryId,
    ) -> Result<(), SlotError> {
        let route = &future.value;

        if let Some(curr) = curr.filter(|c| route.same(&c.value)) {
            route.advance();
            let nested = match route.component() {
                // A reused route whose component is gone is mounted again.
                Some(component) => match self
                    .slots
                    .occupancy(registry, &route.outlet())
                    .filter(|o| o.route.same(route))
                {
                    Some(occupancy) => occupancy.nested,
                    None => self.place_component_into_outlet(route, component, registry)?,
                },
                None => registry,
            };
            return self.activate_child_routes(future, Some(curr), nested);
        }

        if let Some(curr) = curr {
            self.deactivate_route_and_children(curr, registry);
        }
        route.advance();
        let nested = match route.component() {
            Some(component) => self.place_component_into_outlet(route, component, registry)?,
            None => registry,
        };
        self.activate_child_routes(future, None, nested)
    }

    fn place_component_into_outlet(
        &self,
        route: &ActivatedRoute,
        component: String,
        registry: RegistryId,
    ) -> Result<RegistryId, SlotError> {
        let slot = route.outlet();
        let outlet = self
            .slots
            .outlet(registry, &slot)
            .ok_or_else(|| SlotError::MissingSlot {
                slot: slot.clone(),
                component: component.clone(),
            })?;

        if self.slots.occupancy(registry, &slot).is_some() {
            self.deactivate_slot(registry, &slot);
        }

        let nested = self.slots.create_nested(registry)?;
        let request = MountRequest {
            component: component.clone(),
            route: route.clone(),
            slots: self.slots.scope(nested),
            context: self.context.clone(),
        };
        match outlet.mount(request) {
            Ok(handle) => {
                tracing::debug!(%slot, %component, registry = %registry, "mounted");
                self.slots.occupy(
                    registry,
                    &slot,
                    Occupancy {
                        component: handle,
                        route: route.clone(),
                        nested,
                    },
                )?;
                Ok(nested)
            }
            Err(e) => {
                self.slots.release(nested);
                Err(SlotError::MountFailed {
                    slot,
                    component,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Tear down what `curr` mounted. A componentless route has no slot of its own; its
    /// descendants live in the parent registry.
    fn deactivate_route_and_children(&self, curr: &TreeNode<ActivatedRoute>, registry: RegistryId) {
        let snapshot = curr.value.snapshot();
        if snapshot.component.is_some() {
            self.deactivate_slot(registry, &snapshot.outlet);
        } else {
            for child in &curr.children {
                self.deactivate_route_and_children(child, registry);
            }
        }
    }

    /// Post-order: nested slots first, then the outlet's own unmount.
    fn deactivate_slot(&self, registry: RegistryId, slot: &str) {
        let Some(occupancy) = self.slots.occupancy(registry, slot) else {
            return;
        };
        for (child_slot, _) in self.slots.occupied(occupancy.nested) {
            self.deactivate_slot(occupancy.nested, &child_slot);
        }
        if let Some(outlet) = self.slots.outlet(registry, slot) {
            outlet.unmount(&occupancy.component);
        }
        self.slots.vacate(registry, slot);
        self.slots.release(occupancy.nested);
        tracing::debug!(%slot, component = occupancy.component.component(), "unmounted");
    }
}

/// Children of `node` that own a slot in `node`'s registry, looking through componentless
/// routes. The first route claiming a slot wins.
fn mounted_children<'t>(
    node: &'t TreeNode<ActivatedRoute>,
    out: &mut BTreeMap<String, &'t TreeNode<ActivatedRoute>>,
) {
    for child in &node.children {
        if child.value.component().is_some() {
            out.entry(child.value.outlet()).or_insert(child);
        } else {
            mounted_children(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::recognize;
    use crate::state::create_router_state;
    use parking_lot::Mutex;
    use waypost_core::config::{Route, RouteTable};
    use waypost_core::options::ParamsInheritance;
    use waypost_core::outlet::{ComponentHandle, Outlet};
    use waypost_core::reuse::{ConfigAndParams, ConfigIdentity, RouteReuseStrategy};
    use waypost_core::serializer::{DefaultUrlSerializer, UrlSerializer};
    use waypost_core::snapshot::RouterStateSnapshot;

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    /// Mounts anything and gives every component a `primary` slot of its own.
    struct ShellOutlet {
        journal: Journal,
    }

    impl Outlet for ShellOutlet {
        fn mount(&self, request: MountRequest) -> anyhow::Result<ComponentHandle> {
            self.journal.0.lock().push(format!("mount {}", request.component));
            request.slots.register_outlet(
                "primary",
                Arc::new(ShellOutlet {
                    journal: self.journal.clone(),
                }),
            )?;
            Ok(ComponentHandle::bare(request.component))
        }

        fn unmount(&self, component: &ComponentHandle) {
            self.journal.0.lock().push(format!("unmount {}", component.component()));
        }
    }

    struct Fixture {
        table: RouteTable,
        slots: SlotRegistry,
        journal: Journal,
        state: RouterState,
    }

    impl Fixture {
        fn new(routes: &[Route]) -> Self {
            let slots = SlotRegistry::new();
            let journal = Journal::default();
            slots
                .register_outlet(
                    slots.root(),
                    "primary",
                    Arc::new(ShellOutlet {
                        journal: journal.clone(),
                    }),
                )
                .unwrap();
            Self {
                table: RouteTable::compile(routes).unwrap(),
                slots,
                journal,
                state: RouterState::empty(),
            }
        }

        fn navigate(&mut self, url: &str, reuse: &dyn RouteReuseStrategy) -> Result<(), SlotError> {
            let tree = DefaultUrlSerializer.parse(url).unwrap();
            let root = recognize(&tree, &self.table, ParamsInheritance::EmptyOnly).unwrap();
            let snapshot = Arc::new(RouterStateSnapshot::new(url, root));
            let future = create_router_state(snapshot, &self.state, reuse);
            let context = Arc::new(MountContext::new());
            ActivateRoutes::new(&future, &self.state, &self.slots, &context).activate()?;
            self.state = future;
            Ok(())
        }
    }

    fn team_routes() -> Vec<Route> {
        vec![
            Route::new("team/:id")
                .component("TeamCmp")
                .children(vec![Route::new("user/:name").component("UserCmp")]),
            Route::new("home").component("HomeCmp"),
        ]
    }

    #[test]
    fn param_change_advances_or_remounts() {
        let mut fx = Fixture::new(&team_routes());
        fx.navigate("/team/1/user/a", &ConfigIdentity).unwrap();
        assert_eq!(fx.journal.take(), vec!["mount TeamCmp", "mount UserCmp"]);

        let user = fx.state.route(&[0, 0]).unwrap().clone();
        let mut params = user.params().subscribe();
        fx.navigate("/team/1/user/b", &ConfigIdentity).unwrap();
        assert!(fx.journal.take().is_empty());
        assert!(params.has_changed().unwrap());
        assert_eq!(params.borrow_and_update()["name"], "b");

        fx.navigate("/team/1/user/c", &ConfigAndParams).unwrap();
        assert_eq!(fx.journal.take(), vec!["unmount UserCmp", "mount UserCmp"]);
        assert!(!fx.state.route(&[0, 0]).unwrap().same(&user));
    }

    #[test]
    fn replaced_subtree_unmounts_deepest_first() {
        let mut fx = Fixture::new(&team_routes());
        fx.navigate("/team/1/user/a", &ConfigIdentity).unwrap();
        fx.journal.take();
        assert_eq!(fx.slots.live_registries(), 3);

        fx.navigate("/home", &ConfigIdentity).unwrap();
        assert_eq!(
            fx.journal.take(),
            vec!["unmount UserCmp", "unmount TeamCmp", "mount HomeCmp"]
        );
        assert_eq!(fx.slots.live_registries(), 2);
    }

    #[test]
    fn componentless_parent_tears_down_its_descendants() {
        let mut fx = Fixture::new(&[
            Route::new("org/:org").children(vec![Route::new("people").component("PeopleCmp")]),
            Route::new("home").component("HomeCmp"),
        ]);
        fx.navigate("/org/acme/people", &ConfigIdentity).unwrap();
        let occupancy = fx.slots.occupancy(fx.slots.root(), "primary").unwrap();
        assert_eq!(occupancy.component.component(), "PeopleCmp");
        fx.journal.take();

        fx.navigate("/home", &ConfigIdentity).unwrap();
        assert_eq!(fx.journal.take(), vec!["unmount PeopleCmp", "mount HomeCmp"]);
    }

    #[test]
    fn missing_slot_is_a_configuration_error() {
        let mut fx = Fixture::new(&[
            Route::new("team/:id").component("TeamCmp"),
            Route::new("chat").component("ChatCmp").outlet("aux"),
        ]);
        let err = fx.navigate("/team/1(aux:chat)", &ConfigIdentity).unwrap_err();
        assert_eq!(
            err,
            SlotError::MissingSlot {
                slot: "aux".into(),
                component: "ChatCmp".into()
            }
        );
        assert!(fx.journal.take().is_empty());
        assert!(fx.slots.occupied(fx.slots.root()).is_empty());
    }

    #[test]
    fn restore_remounts_what_a_failed_walk_tore_down() {
        let mut fx = Fixture::new(&team_routes());
        fx.navigate("/team/1/user/a", &ConfigIdentity).unwrap();
        fx.journal.take();

        // Tear the tree down as a failed walk towards /home would have.
        let tree = DefaultUrlSerializer.parse("/home").unwrap();
        let root = recognize(&tree, &fx.table, ParamsInheritance::EmptyOnly).unwrap();
        let future = create_router_state(Arc::new(RouterStateSnapshot::new("/home", root)), &fx.state, &ConfigIdentity);
        let context = Arc::new(MountContext::new());
        let walk = ActivateRoutes::new(&future, &fx.state, &fx.slots, &context);
        walk.deactivate_slot(fx.slots.root(), "primary");
        assert!(fx.slots.occupied(fx.slots.root()).is_empty());

        walk.restore().unwrap();
        assert_eq!(
            fx.journal.take(),
            vec!["unmount UserCmp", "unmount TeamCmp", "mount TeamCmp", "mount UserCmp"]
        );
        let team = fx.slots.occupancy(fx.slots.root(), "primary").unwrap();
        assert!(team.route.same(fx.state.route(&[0]).unwrap()));
        assert_eq!(fx.slots.live_registries(), 3);

        // Reconciling a consistent tree changes nothing.
        walk.restore().unwrap();
        assert!(fx.journal.take().is_empty());
    }

    #[test]
    fn query_params_publish_once_per_navigation() {
        let mut fx = Fixture::new(&team_routes());
        fx.navigate("/home?tab=1", &ConfigIdentity).unwrap();
        let mut query = fx.state.shared.query_params.subscribe();

        fx.navigate("/home?tab=2", &ConfigIdentity).unwrap();
        assert!(query.has_changed().unwrap());
        assert_eq!(query.borrow_and_update()["tab"], "2");

        fx.navigate("/home?tab=2", &ConfigIdentity).unwrap();
        assert!(!query.has_changed().unwrap());
    }
}
