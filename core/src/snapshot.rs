//! Immutable route snapshots.
//!
//! A [`RouterStateSnapshot`] is built once per navigation attempt and never mutated after
//! it leaves the pipeline. Nodes are shared as `Arc<RouteSnapshot>` so guards, resolvers and
//! live routes can hold onto them cheaply.

use crate::config::{Data, RouteConfig, RouteConfigId};
use crate::options::ParamsInheritance;
use crate::tree::{NodePath, TreeNode};
use crate::url_tree::{GroupPath, PRIMARY_OUTLET, Params, UrlSegment};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RouteSnapshot {
    /// Segments consumed by this route.
    pub url: Vec<UrlSegment>,
    pub params: Params,
    pub query_params: Params,
    pub fragment: Option<String>,
    /// Static data merged with resolved data.
    pub data: Data,
    /// Values produced by this route's own resolvers.
    pub resolved_data: Data,
    pub outlet: String,
    pub component: Option<String>,
    /// `None` only for the synthetic root.
    pub route_config: Option<Arc<RouteConfig>>,
    /// Segment group of the URL tree this route was matched in.
    pub url_group: GroupPath,
    /// Index of the last segment of `url_group` consumed, `-1` if none.
    pub last_path_index: isize,
}

impl RouteSnapshot {
    /// The synthetic root every snapshot tree starts with.
    pub fn root(query_params: Params, fragment: Option<String>) -> Self {
        Self {
            url: Vec::new(),
            params: Params::new(),
            query_params,
            fragment,
            data: Data::new(),
            resolved_data: Data::new(),
            outlet: PRIMARY_OUTLET.to_string(),
            component: None,
            route_config: None,
            url_group: GroupPath::new(),
            last_path_index: -1,
        }
    }

    pub fn config_id(&self) -> Option<RouteConfigId> {
        self.route_config.as_ref().map(|c| c.id)
    }

    pub fn is_root(&self) -> bool {
        self.route_config.is_none()
    }

    /// Whether this route mounts something. The root counts as the application shell.
    pub fn has_component(&self) -> bool {
        self.is_root() || self.component.is_some()
    }

    pub fn path(&self) -> String {
        self.url
            .iter()
            .map(|s| s.path.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn has_empty_path(&self) -> bool {
        self.route_config.as_ref().is_some_and(|c| c.path.is_empty())
    }

    fn guard_tokens(&self, pick: impl Fn(&RouteConfig) -> &[String]) -> &[String] {
        match &self.route_config {
            Some(config) => pick(config),
            None => &[],
        }
    }

    pub fn can_activate(&self) -> &[String] {
        self.guard_tokens(|c| &c.can_activate)
    }

    pub fn can_activate_child(&self) -> &[String] {
        self.guard_tokens(|c| &c.can_activate_child)
    }

    pub fn can_deactivate(&self) -> &[String] {
        self.guard_tokens(|c| &c.can_deactivate)
    }
}

impl fmt::Display for RouteSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = match &self.route_config {
            Some(config) => config.path.as_str(),
            None => "",
        };
        write!(f, "Route(url:'{}', path:'{}')", self.path(), path)
    }
}

#[derive(Debug, Clone)]
pub struct RouterStateSnapshot {
    /// Serialized URL this snapshot was recognized from.
    pub url: String,
    pub root: TreeNode<Arc<RouteSnapshot>>,
}

impl RouterStateSnapshot {
    pub fn new(url: impl Into<String>, root: TreeNode<Arc<RouteSnapshot>>) -> Self {
        Self {
            url: url.into(),
            root,
        }
    }

    pub fn empty() -> Self {
        Self::new("", TreeNode::leaf(Arc::new(RouteSnapshot::root(Params::new(), None))))
    }

    pub fn query_params(&self) -> &Params {
        &self.root.value.query_params
    }

    pub fn fragment(&self) -> Option<&str> {
        self.root.value.fragment.as_deref()
    }

    pub fn node(&self, path: &[usize]) -> Option<&Arc<RouteSnapshot>> {
        self.root.node(path).map(|n| &n.value)
    }

    /// Snapshots from the root to the node at `path`, inclusive.
    pub fn path_from_root(&self, path: &[usize]) -> Vec<&RouteSnapshot> {
        self.root
            .path_from_root(path)
            .into_iter()
            .map(|s| s.as_ref())
            .collect()
    }

    /// Node paths of every route in pre-order, root excluded.
    pub fn paths(&self) -> Vec<NodePath> {
        fn walk(node: &TreeNode<Arc<RouteSnapshot>>, prefix: &mut NodePath, out: &mut Vec<NodePath>) {
            for (i, child) in node.children.iter().enumerate() {
                prefix.push(i);
                out.push(prefix.clone());
                walk(child, prefix, out);
                prefix.pop();
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut Vec::new(), &mut out);
        out
    }
}

impl fmt::Display for RouterStateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node(
            f: &mut fmt::Formatter<'_>,
            node: &TreeNode<Arc<RouteSnapshot>>,
            depth: usize,
        ) -> fmt::Result {
            let s = &node.value;
            writeln!(
                f,
                "{:indent$}{} outlet={} component={} params={:?}",
                "",
                s,
                s.outlet,
                s.component.as_deref().unwrap_or("-"),
                s.params,
                indent = depth * 2
            )?;
            for child in &node.children {
                write_node(f, child, depth + 1)?;
            }
            Ok(())
        }
        writeln!(f, "{}", self.url)?;
        write_node(f, &self.root, 0)
    }
}

/// Params, data and resolved data a route sees after inheritance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inherited {
    pub params: Params,
    pub data: Data,
    pub resolve: Data,
}

/// Flatten params and data along `path_from_root` (root first, the route itself last).
///
/// With [`ParamsInheritance::EmptyOnly`] inheritance climbs only through empty-path routes and
/// componentless parents; with [`ParamsInheritance::Always`] every ancestor contributes.
/// Nearer routes win on key collisions.
pub fn inherited_params_data_resolve(
    path_from_root: &[&RouteSnapshot],
    mode: ParamsInheritance,
) -> Inherited {
    let mut start = 0;
    if mode == ParamsInheritance::EmptyOnly && !path_from_root.is_empty() {
        start = path_from_root.len() - 1;
        while start >= 1 {
            let current = path_from_root[start];
            let parent = path_from_root[start - 1];
            if current.has_empty_path() || !parent.has_component() {
                start -= 1;
            } else {
                break;
            }
        }
    }

    path_from_root[start..]
        .iter()
        .fold(Inherited::default(), |mut acc, route| {
            acc.params
                .extend(route.params.iter().map(|(k, v)| (k.clone(), v.clone())));
            acc.data
                .extend(route.data.iter().map(|(k, v)| (k.clone(), v.clone())));
            acc.resolve.extend(
                route
                    .resolved_data
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Route, RouteTable};
    use serde_json::json;

    fn snapshot(config: &Arc<RouteConfig>, params: &[(&str, &str)]) -> RouteSnapshot {
        let mut s = RouteSnapshot::root(Params::new(), None);
        s.route_config = Some(config.clone());
        s.component = config.component.clone();
        s.data = config.data.clone();
        s.params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        s
    }

    #[test]
    fn empty_only_inherits_through_componentless_parent() {
        let table = RouteTable::compile(&[Route::new("org/:org")
            .data("section", json!("org"))
            .children(vec![Route::new("user/:name").component("UserCmp")])])
        .unwrap();
        let org = table.find(&["org/:org"]).unwrap();
        let user = table.find(&["org/:org", "user/:name"]).unwrap();

        let root = RouteSnapshot::root(Params::new(), None);
        let org = snapshot(org, &[("org", "acme")]);
        let user = snapshot(user, &[("name", "bob")]);

        let inherited =
            inherited_params_data_resolve(&[&root, &org, &user], ParamsInheritance::EmptyOnly);
        assert_eq!(inherited.params.get("org").map(String::as_str), Some("acme"));
        assert_eq!(inherited.params.get("name").map(String::as_str), Some("bob"));
        assert_eq!(inherited.data.get("section"), Some(&json!("org")));
    }

    #[test]
    fn empty_only_stops_at_component_boundary() {
        let table = RouteTable::compile(&[Route::new("team/:id")
            .component("TeamCmp")
            .children(vec![Route::new("user/:name").component("UserCmp")])])
        .unwrap();
        let team = snapshot(table.find(&["team/:id"]).unwrap(), &[("id", "33")]);
        let mut user = snapshot(
            table.find(&["team/:id", "user/:name"]).unwrap(),
            &[("name", "11")],
        );
        user.resolved_data.insert("profile".into(), json!({"age": 3}));
        let root = RouteSnapshot::root(Params::new(), None);

        let own = inherited_params_data_resolve(&[&root, &team, &user], ParamsInheritance::EmptyOnly);
        assert!(!own.params.contains_key("id"));
        assert_eq!(own.resolve.get("profile"), Some(&json!({"age": 3})));

        let all = inherited_params_data_resolve(&[&root, &team, &user], ParamsInheritance::Always);
        assert_eq!(all.params.get("id").map(String::as_str), Some("33"));
    }
}
