//! # Route recognition
//!
//! `DefaultRecognizer` applies redirects, then matches the resulting URL tree against the
//! route table and builds the snapshot tree. Empty-path routes can match without consuming
//! anything, so matching works on a *view* of each segment group ([`Group`]) that remembers
//! which real group of the URL tree it came from and how far into it matching has moved.
//! That origin is what lets commands later be applied relative to a matched route.

use crate::redirects::{apply_redirects, match_route};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use waypost_core::config::{PathMatch, RouteConfig, RouteTable};
use waypost_core::error::NavigationError;
use waypost_core::options::ParamsInheritance;
use waypost_core::recognizer::{Recognized, Recognizer};
use waypost_core::snapshot::{RouteSnapshot, inherited_params_data_resolve};
use waypost_core::tree::TreeNode;
use waypost_core::url_tree::{GroupPath, PRIMARY_OUTLET, Params, UrlSegment, UrlSegmentGroup, UrlTree};

/// Redirects followed by matching. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRecognizer;

#[async_trait]
impl Recognizer for DefaultRecognizer {
    async fn recognize(
        &self,
        url: &UrlTree,
        table: &RouteTable,
        inheritance: ParamsInheritance,
    ) -> Result<Recognized, NavigationError> {
        let applied_url = apply_redirects(url, table)?;
        let root = recognize(&applied_url, table, inheritance)?;
        Ok(Recognized { applied_url, root })
    }
}

/// A segment group as seen during matching.
#[derive(Debug, Clone)]
struct Group {
    segments: Vec<UrlSegment>,
    children: BTreeMap<String, Group>,
    /// Address of the real group this view derives from.
    source: GroupPath,
    /// Segments of `source` consumed before this view starts.
    shift: usize,
}

impl Group {
    fn real(group: &UrlSegmentGroup, path: GroupPath) -> Self {
        let children = group
            .children
            .iter()
            .map(|(outlet, child)| {
                let mut child_path = path.clone();
                child_path.push(outlet.clone());
                (outlet.clone(), Group::real(child, child_path))
            })
            .collect();
        Self {
            segments: group.segments.clone(),
            children,
            source: path,
            shift: 0,
        }
    }

    fn derived(&self, segments: Vec<UrlSegment>, children: BTreeMap<String, Group>, shift: usize) -> Self {
        Self {
            segments,
            children,
            source: self.source.clone(),
            shift: self.shift + shift,
        }
    }

    fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Children with the primary outlet first.
    fn ordered_children(&self) -> Vec<(&str, &Group)> {
        let mut out: Vec<(&str, &Group)> = Vec::with_capacity(self.children.len());
        if let Some(primary) = self.children.get(PRIMARY_OUTLET) {
            out.push((PRIMARY_OUTLET, primary));
        }
        out.extend(
            self.children
                .iter()
                .filter(|(name, _)| name.as_str() != PRIMARY_OUTLET)
                .map(|(name, group)| (name.as_str(), group)),
        );
        out
    }

    /// Index of the last segment consumed once `consumed` more are taken from this view.
    fn last_path_index(&self, consumed: usize) -> isize {
        (self.shift + consumed) as isize - 1
    }
}

enum Failure {
    NoMatch(String),
    Error(NavigationError),
}

type Matched<T> = Result<T, Failure>;

fn no_match(segments: &[UrlSegment]) -> Failure {
    Failure::NoMatch(
        segments
            .iter()
            .map(|s| s.path.as_str())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

/// Match an already-redirected tree. Returns the snapshot tree rooted at the synthetic root.
pub fn recognize(
    url: &UrlTree,
    table: &RouteTable,
    inheritance: ParamsInheritance,
) -> Result<TreeNode<Arc<RouteSnapshot>>, NavigationError> {
    let matcher = Matcher { url };
    let root_group = Group::real(&url.root, GroupPath::new());
    let children = match matcher.process_segment_group(table.routes(), &root_group, PRIMARY_OUTLET) {
        Ok(children) => children,
        Err(Failure::NoMatch(url)) => return Err(NavigationError::NoMatch { url }),
        Err(Failure::Error(e)) => return Err(e),
    };

    let root = RouteSnapshot::root(url.query_params.clone(), url.fragment.clone());
    let mut tree = TreeNode::new(root, children);
    inherit_params_and_data(&mut tree, inheritance);
    Ok(tree.map(&mut |s| Arc::new(s.clone())))
}

/// Top-down so each route sees its ancestors' inherited values.
fn inherit_params_and_data(tree: &mut TreeNode<RouteSnapshot>, inheritance: ParamsInheritance) {
    fn paths(node: &TreeNode<RouteSnapshot>, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (i, child) in node.children.iter().enumerate() {
            prefix.push(i);
            out.push(prefix.clone());
            paths(child, prefix, out);
            prefix.pop();
        }
    }

    let mut all = Vec::new();
    paths(tree, &mut Vec::new(), &mut all);
    for path in all {
        let inherited = inherited_params_data_resolve(&tree.path_from_root(&path), inheritance);
        if let Some(node) = tree.node_mut(&path) {
            node.value.params = inherited.params;
            node.value.data = inherited.data;
        }
    }
}

struct Matcher<'a> {
    url: &'a UrlTree,
}

impl Matcher<'_> {
    fn process_segment_group(
        &self,
        config: &[Arc<RouteConfig>],
        group: &Group,
        outlet: &str,
    ) -> Matched<Vec<TreeNode<RouteSnapshot>>> {
        if group.segments.is_empty() && group.has_children() {
            return self.process_children(config, group);
        }
        self.process_segment(config, group, &group.segments, outlet)
    }

    fn process_children(
        &self,
        config: &[Arc<RouteConfig>],
        group: &Group,
    ) -> Matched<Vec<TreeNode<RouteSnapshot>>> {
        let mut children = Vec::new();
        for (outlet, child) in group.ordered_children() {
            children.extend(self.process_segment_group(config, child, outlet)?);
        }
        check_outlet_name_uniqueness(&children)?;
        children.sort_by(|a, b| outlet_order(&a.value.outlet).cmp(&outlet_order(&b.value.outlet)));
        Ok(children)
    }

    fn process_segment(
        &self,
        config: &[Arc<RouteConfig>],
        group: &Group,
        segments: &[UrlSegment],
        outlet: &str,
    ) -> Matched<Vec<TreeNode<RouteSnapshot>>> {
        for route in config {
            match self.process_segment_against_route(route, group, segments, outlet) {
                Err(Failure::NoMatch(_)) => continue,
                other => return other,
            }
        }
        if segments.is_empty() && !group.children.contains_key(outlet) {
            return Ok(Vec::new());
        }
        Err(no_match(segments))
    }

    fn snapshot(
        &self,
        route: &Arc<RouteConfig>,
        consumed: Vec<UrlSegment>,
        params: Params,
        outlet: &str,
        group: &Group,
        last_path_index: isize,
    ) -> RouteSnapshot {
        RouteSnapshot {
            url: consumed,
            params,
            query_params: self.url.query_params.clone(),
            fragment: self.url.fragment.clone(),
            data: route.data.clone(),
            resolved_data: Default::default(),
            outlet: outlet.to_string(),
            component: route.component.clone(),
            route_config: Some(route.clone()),
            url_group: group.source.clone(),
            last_path_index,
        }
    }

    fn process_segment_against_route(
        &self,
        route: &Arc<RouteConfig>,
        raw: &Group,
        segments: &[UrlSegment],
        outlet: &str,
    ) -> Matched<Vec<TreeNode<RouteSnapshot>>> {
        if route.redirect_to.is_some() || route.outlet != outlet {
            return Err(no_match(segments));
        }

        if route.is_wildcard() {
            let snapshot = self.snapshot(
                route,
                segments.to_vec(),
                Params::new(),
                outlet,
                raw,
                raw.last_path_index(segments.len()),
            );
            return Ok(vec![TreeNode::leaf(snapshot)]);
        }

        let matched = match_route(raw.has_children(), route, segments).ok_or_else(|| no_match(segments))?;
        let params: Params = matched
            .positional
            .iter()
            .map(|(name, segment)| (name.clone(), segment.path.clone()))
            .collect();
        let raw_sliced = &segments[matched.last_child..];
        let child_config = &route.children;
        let (group, sliced) = split(raw, &matched.consumed, raw_sliced, child_config);

        let snapshot = self.snapshot(
            route,
            matched.consumed.clone(),
            params,
            outlet,
            raw,
            raw.last_path_index(matched.consumed.len()),
        );

        let children = if sliced.is_empty() && group.has_children() {
            self.process_children(child_config, &group)?
        } else if child_config.is_empty() && sliced.is_empty() {
            Vec::new()
        } else {
            self.process_segment(child_config, &group, &sliced, PRIMARY_OUTLET)?
        };
        Ok(vec![TreeNode::new(snapshot, children)])
    }
}

fn outlet_order(outlet: &str) -> (bool, &str) {
    (outlet != PRIMARY_OUTLET, outlet)
}

fn check_outlet_name_uniqueness(nodes: &[TreeNode<RouteSnapshot>]) -> Matched<()> {
    let mut seen: BTreeMap<&str, &RouteSnapshot> = BTreeMap::new();
    for node in nodes {
        if let Some(previous) = seen.insert(node.value.outlet.as_str(), &node.value) {
            return Err(Failure::Error(NavigationError::Recognizer(format!(
                "two segments cannot have the same outlet name: '{}' and '{}'",
                previous.path(),
                node.value.path()
            ))));
        }
    }
    Ok(())
}

fn empty_path_match(has_more: bool, route: &RouteConfig) -> bool {
    if has_more && route.path_match == PathMatch::Full {
        return false;
    }
    route.path.is_empty() && route.redirect_to.is_none()
}

/// Re-shape `raw` so that empty-path child routes, including ones in named outlets, have
/// a group to match against.
fn split(
    raw: &Group,
    consumed: &[UrlSegment],
    sliced: &[UrlSegment],
    config: &[Arc<RouteConfig>],
) -> (Group, Vec<UrlSegment>) {
    let has_more = raw.has_children() || !sliced.is_empty();

    let named_empty = config
        .iter()
        .any(|r| empty_path_match(has_more, r) && r.outlet != PRIMARY_OUTLET);
    if !sliced.is_empty() && named_empty {
        let primary = raw.derived(sliced.to_vec(), raw.children.clone(), consumed.len());
        let mut children = BTreeMap::new();
        children.insert(PRIMARY_OUTLET.to_string(), primary);
        for route in config {
            if route.path.is_empty() && route.outlet != PRIMARY_OUTLET {
                children.insert(
                    route.outlet.clone(),
                    raw.derived(Vec::new(), BTreeMap::new(), consumed.len()),
                );
            }
        }
        let group = raw.derived(consumed.to_vec(), children, consumed.len());
        return (group, Vec::new());
    }

    let any_empty = config.iter().any(|r| empty_path_match(has_more, r));
    if sliced.is_empty() && any_empty {
        let mut children = raw.children.clone();
        for route in config {
            if empty_path_match(has_more, route) && !children.contains_key(&route.outlet) {
                children.insert(
                    route.outlet.clone(),
                    raw.derived(Vec::new(), BTreeMap::new(), raw.segments.len()),
                );
            }
        }
        let group = raw.derived(raw.segments.clone(), children, consumed.len());
        return (group, sliced.to_vec());
    }

    let group = raw.derived(raw.segments.clone(), raw.children.clone(), consumed.len());
    (group, sliced.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::config::Route;
    use waypost_core::serializer::{DefaultUrlSerializer, UrlSerializer};

    fn recognize_url(routes: Vec<Route>, url: &str) -> Result<TreeNode<Arc<RouteSnapshot>>, NavigationError> {
        let table = RouteTable::compile(&routes).unwrap();
        let tree = DefaultUrlSerializer.parse(url).unwrap();
        recognize(&tree, &table, ParamsInheritance::EmptyOnly)
    }

    #[test]
    fn nested_params_and_positions() {
        let routes = vec![Route::new("team/:id")
            .component("TeamCmp")
            .children(vec![Route::new("user/:name").component("UserCmp")])];
        let root = recognize_url(routes, "/team/33/user/11?q=1").unwrap();

        let team = &root.children[0];
        assert_eq!(team.value.params["id"], "33");
        assert_eq!(team.value.last_path_index, 1);
        assert_eq!(team.value.url_group, vec![PRIMARY_OUTLET.to_string()]);

        let user = &team.children[0];
        assert_eq!(user.value.params["name"], "11");
        assert_eq!(user.value.last_path_index, 3);
        assert_eq!(user.value.query_params["q"], "1");
        assert!(!user.value.params.contains_key("id"));
    }

    #[test]
    fn named_outlets_sort_after_primary() {
        let routes = vec![
            Route::new("team/:id").component("TeamCmp"),
            Route::new("chat").component("ChatCmp").outlet("aux"),
        ];
        let root = recognize_url(routes, "/team/1(aux:chat)").unwrap();
        let outlets: Vec<_> = root.children.iter().map(|c| c.value.outlet.as_str()).collect();
        assert_eq!(outlets, vec![PRIMARY_OUTLET, "aux"]);
    }

    #[test]
    fn empty_path_children_and_componentless_inheritance() {
        let routes = vec![Route::new("org/:org").children(vec![
            Route::new("").component("OrgHomeCmp"),
            Route::new("").component("OrgNavCmp").outlet("nav"),
        ])];
        let root = recognize_url(routes, "/org/acme").unwrap();

        let org = &root.children[0];
        assert!(org.value.component.is_none());
        let outlets: Vec<_> = org.children.iter().map(|c| c.value.outlet.as_str()).collect();
        assert_eq!(outlets, vec![PRIMARY_OUTLET, "nav"]);
        for child in &org.children {
            assert_eq!(child.value.params["org"], "acme");
        }
    }

    #[test]
    fn wildcard_and_full_match() {
        let routes = vec![
            Route::new("").full_match().component("HomeCmp"),
            Route::new("**").component("NotFoundCmp"),
        ];
        let root = recognize_url(routes.clone(), "/").unwrap();
        assert_eq!(root.children[0].value.component.as_deref(), Some("HomeCmp"));

        let root = recognize_url(routes, "/a/b").unwrap();
        let not_found = &root.children[0].value;
        assert_eq!(not_found.component.as_deref(), Some("NotFoundCmp"));
        assert_eq!(not_found.path(), "a/b");
        assert_eq!(not_found.last_path_index, 1);
    }

    #[test]
    fn duplicate_outlets_are_rejected() {
        let mut a = RouteSnapshot::root(Params::new(), None);
        a.outlet = "aux".into();
        a.url = vec![UrlSegment::new("chat")];
        let mut b = a.clone();
        b.url = vec![UrlSegment::new("inbox")];

        let nodes = vec![TreeNode::leaf(a.clone()), TreeNode::leaf(b)];
        match check_outlet_name_uniqueness(&nodes) {
            Err(Failure::Error(NavigationError::Recognizer(msg))) => {
                assert!(msg.contains("'chat'") && msg.contains("'inbox'"))
            }
            _ => panic!("duplicate outlet accepted"),
        }
        assert!(check_outlet_name_uniqueness(&[TreeNode::leaf(a)]).is_ok());
    }

    #[tokio::test]
    async fn default_recognizer_applies_redirects_first() {
        let routes = vec![
            Route::new("").full_match().redirect_to("team/1"),
            Route::new("team/:id").component("TeamCmp"),
        ];
        let table = RouteTable::compile(&routes).unwrap();
        let tree = DefaultUrlSerializer.parse("/").unwrap();
        let recognized = DefaultRecognizer
            .recognize(&tree, &table, ParamsInheritance::EmptyOnly)
            .await
            .unwrap();

        assert_eq!(DefaultUrlSerializer.serialize(&recognized.applied_url), "/team/1");
        assert_eq!(recognized.root.children[0].value.params["id"], "1");
    }
}
