use std::sync::Arc;
use waypost_core::reuse::RouteReuseStrategy;
use waypost_core::route::{ActivatedRoute, RouterState};
use waypost_core::snapshot::{RouteSnapshot, RouterStateSnapshot};
use waypost_core::tree::TreeNode;

/// Build the live route tree for `snapshot`, carrying over every route of `prev` that the
/// reuse strategy keeps. Kept routes only receive the new snapshot as their future one;
/// nothing is published until activation advances them.
pub fn create_router_state(
    snapshot: Arc<RouterStateSnapshot>,
    prev: &RouterState,
    reuse: &dyn RouteReuseStrategy,
) -> RouterState {
    let builder = Builder { prev, reuse };
    let root = builder.create_node(&snapshot.root, Some(&prev.root));
    RouterState {
        snapshot,
        root,
        shared: prev.shared.clone(),
    }
}

struct Builder<'a> {
    prev: &'a RouterState,
    reuse: &'a dyn RouteReuseStrategy,
}

impl Builder<'_> {
    fn create_node(
        &self,
        curr: &TreeNode<Arc<RouteSnapshot>>,
        prev: Option<&TreeNode<ActivatedRoute>>,
    ) -> TreeNode<ActivatedRoute> {
        match prev {
            Some(prev) if self.reuse.should_reuse(&curr.value, &prev.value.snapshot()) => {
                let route = prev.value.clone();
                route.set_future_snapshot(curr.value.clone());
                TreeNode::new(route, self.create_children(curr, Some(prev)))
            }
            _ => {
                let route = ActivatedRoute::new(curr.value.clone(), self.prev.shared.clone());
                TreeNode::new(route, self.create_children(curr, None))
            }
        }
    }

    fn create_children(
        &self,
        curr: &TreeNode<Arc<RouteSnapshot>>,
        prev: Option<&TreeNode<ActivatedRoute>>,
    ) -> Vec<TreeNode<ActivatedRoute>> {
        curr.children
            .iter()
            .map(|child| {
                let previous = prev.and_then(|p| {
                    p.children.iter().find(|candidate| {
                        let snapshot = candidate.value.snapshot();
                        snapshot.outlet == child.value.outlet
                            && self.reuse.should_reuse(&child.value, &snapshot)
                    })
                });
                self.create_node(child, previous)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::recognize;
    use waypost_core::config::{Route, RouteTable};
    use waypost_core::options::ParamsInheritance;
    use waypost_core::reuse::{ConfigAndParams, ConfigIdentity};
    use waypost_core::serializer::{DefaultUrlSerializer, UrlSerializer};

    fn snapshot(table: &RouteTable, url: &str) -> Arc<RouterStateSnapshot> {
        let tree = DefaultUrlSerializer.parse(url).unwrap();
        let root = recognize(&tree, table, ParamsInheritance::EmptyOnly).unwrap();
        Arc::new(RouterStateSnapshot::new(url, root))
    }

    fn activate(state: &RouterState) {
        for route in state.routes() {
            route.advance();
        }
    }

    #[test]
    fn reused_routes_keep_identity() {
        let table = RouteTable::compile(&[Route::new("team/:id")
            .component("TeamCmp")
            .children(vec![Route::new("user/:name").component("UserCmp")])])
        .unwrap();
        let first = create_router_state(snapshot(&table, "/team/1/user/a"), &RouterState::empty(), &ConfigIdentity);
        activate(&first);

        let second = create_router_state(snapshot(&table, "/team/1/user/b"), &first, &ConfigIdentity);
        assert!(second.root.value.same(&first.root.value));
        let user = second.route(&[0, 0]).unwrap();
        assert!(user.same(first.route(&[0, 0]).unwrap()));
        assert_eq!(user.future_snapshot().params["name"], "b");
        assert_eq!(user.snapshot().params["name"], "a");

        let third = create_router_state(snapshot(&table, "/team/1/user/c"), &first, &ConfigAndParams);
        assert!(third.route(&[0]).unwrap().same(first.route(&[0]).unwrap()));
        assert!(!third.route(&[0, 0]).unwrap().same(first.route(&[0, 0]).unwrap()));
        assert!(third.route(&[0, 0]).unwrap().current_snapshot().is_none());
    }

    #[test]
    fn routes_are_matched_by_outlet() {
        let table = RouteTable::compile(&[
            Route::new("team/:id").component("TeamCmp"),
            Route::new("chat").component("ChatCmp").outlet("aux"),
        ])
        .unwrap();
        let first = create_router_state(snapshot(&table, "/team/1(aux:chat)"), &RouterState::empty(), &ConfigIdentity);
        activate(&first);

        let second = create_router_state(snapshot(&table, "/team/2"), &first, &ConfigIdentity);
        assert_eq!(second.root.children.len(), 1);
        assert!(second.route(&[0]).unwrap().same(first.route(&[0]).unwrap()));
        assert!(Arc::ptr_eq(&second.shared.query_params, &first.shared.query_params));
    }
}
