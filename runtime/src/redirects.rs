//! Redirect application.
//!
//! Walks the requested URL tree against the route table and rewrites every segment run
//! that hits a `redirect-to` entry. Relative redirects are expanded in place (once per
//! segment run, so they cannot loop). An absolute redirect restarts expansion from the
//! root with redirects disabled, which bounds a navigation to one absolute redirect.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use waypost_core::config::{PathMatch, RouteConfig, RouteTable};
use waypost_core::error::NavigationError;
use waypost_core::url_tree::{PRIMARY_OUTLET, UrlSegment, UrlSegmentGroup, UrlTree};

enum Failure {
    NoMatch(String),
    AbsoluteRedirect(Vec<UrlSegment>),
    Error(NavigationError),
}

type Expanded<T> = Result<T, Failure>;

pub(crate) struct Matched {
    pub consumed: Vec<UrlSegment>,
    pub last_child: usize,
    pub positional: HashMap<String, UrlSegment>,
}

/// Match `route.path` against the head of `segments`.
///
/// Shared with the recognizer: both steps must agree on what a route consumes.
pub(crate) fn match_route(
    has_children: bool,
    route: &RouteConfig,
    segments: &[UrlSegment],
) -> Option<Matched> {
    if route.path.is_empty() {
        if route.path_match == PathMatch::Full && (has_children || !segments.is_empty()) {
            return None;
        }
        return Some(Matched {
            consumed: Vec::new(),
            last_child: 0,
            positional: HashMap::new(),
        });
    }

    let mut positional = HashMap::new();
    let mut consumed = Vec::new();
    let mut index = 0;
    for part in route.path.split('/') {
        let current = segments.get(index)?;
        match part.strip_prefix(':') {
            Some(name) => {
                positional.insert(name.to_string(), current.clone());
            }
            None if part == current.path => {}
            None => return None,
        }
        consumed.push(current.clone());
        index += 1;
    }

    if route.path_match == PathMatch::Full && (has_children || index < segments.len()) {
        return None;
    }

    Some(Matched {
        consumed,
        last_child: index,
        positional,
    })
}

fn segments_string(segments: &[UrlSegment]) -> String {
    segments
        .iter()
        .map(|s| s.path.as_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Rewrite `tree` according to the `redirect-to` entries of `table`.
pub fn apply_redirects(tree: &UrlTree, table: &RouteTable) -> Result<UrlTree, NavigationError> {
    let routes = table.routes();
    let expander = Expander { allow_redirects: true };
    match expander.expand_segment_group(routes, &tree.root, PRIMARY_OUTLET) {
        Ok(root) => Ok(UrlTree::new(
            root_candidate(root),
            tree.query_params.clone(),
            tree.fragment.clone(),
        )),
        Err(Failure::AbsoluteRedirect(segments)) => {
            tracing::debug!(target_url = %segments_string(&segments), "absolute redirect");
            let mut root = UrlSegmentGroup::empty();
            root.children.insert(
                PRIMARY_OUTLET.to_string(),
                UrlSegmentGroup::new(segments, BTreeMap::new()),
            );
            let redirected = Expander {
                allow_redirects: false,
            };
            match redirected.expand_segment_group(routes, &root, PRIMARY_OUTLET) {
                Ok(root) => Ok(UrlTree::new(
                    root_candidate(root),
                    tree.query_params.clone(),
                    tree.fragment.clone(),
                )),
                Err(failure) => Err(into_error(failure)),
            }
        }
        Err(failure) => Err(into_error(failure)),
    }
}

/// A root that consumed segments itself is moved under the primary outlet.
fn root_candidate(group: UrlSegmentGroup) -> UrlSegmentGroup {
    if group.segments.is_empty() {
        return group;
    }
    let mut root = UrlSegmentGroup::empty();
    root.children.insert(PRIMARY_OUTLET.to_string(), group);
    root
}

fn into_error(failure: Failure) -> NavigationError {
    match failure {
        Failure::NoMatch(url) => NavigationError::NoMatch { url },
        Failure::AbsoluteRedirect(segments) => NavigationError::Redirect(format!(
            "a second absolute redirect to '/{}' is not followed",
            segments_string(&segments)
        )),
        Failure::Error(e) => e,
    }
}

struct Expander {
    allow_redirects: bool,
}

impl Expander {
    fn expand_segment_group(
        &self,
        routes: &[Arc<RouteConfig>],
        group: &UrlSegmentGroup,
        outlet: &str,
    ) -> Expanded<UrlSegmentGroup> {
        if group.segments.is_empty() && group.has_children() {
            let children = self.expand_children(routes, group)?;
            return Ok(UrlSegmentGroup::new(Vec::new(), children));
        }
        self.expand_segment(group, routes, &group.segments, outlet, true)
    }

    fn expand_children(
        &self,
        routes: &[Arc<RouteConfig>],
        group: &UrlSegmentGroup,
    ) -> Expanded<BTreeMap<String, UrlSegmentGroup>> {
        let mut children = BTreeMap::new();
        for (outlet, child) in group.ordered_children() {
            children.insert(
                outlet.to_string(),
                self.expand_segment_group(routes, child, outlet)?,
            );
        }
        Ok(children)
    }

    fn expand_segment(
        &self,
        group: &UrlSegmentGroup,
        routes: &[Arc<RouteConfig>],
        segments: &[UrlSegment],
        outlet: &str,
        allow_redirects: bool,
    ) -> Expanded<UrlSegmentGroup> {
        for route in routes {
            match self.expand_segment_against_route(group, routes, route, segments, outlet, allow_redirects) {
                Err(Failure::NoMatch(_)) => continue,
                other => return other,
            }
        }
        if segments.is_empty() && !group.children.contains_key(outlet) {
            return Ok(UrlSegmentGroup::empty());
        }
        Err(Failure::NoMatch(segments_string(segments)))
    }

    fn expand_segment_against_route(
        &self,
        group: &UrlSegmentGroup,
        routes: &[Arc<RouteConfig>],
        route: &RouteConfig,
        segments: &[UrlSegment],
        outlet: &str,
        allow_redirects: bool,
    ) -> Expanded<UrlSegmentGroup> {
        if route.outlet != outlet {
            return Err(Failure::NoMatch(segments_string(segments)));
        }
        match &route.redirect_to {
            None => self.match_segment_against_route(group, route, segments),
            Some(target) if allow_redirects && self.allow_redirects => {
                self.expand_using_redirect(group, routes, route, target, segments, outlet)
            }
            Some(_) => Err(Failure::NoMatch(segments_string(segments))),
        }
    }

    fn expand_using_redirect(
        &self,
        group: &UrlSegmentGroup,
        routes: &[Arc<RouteConfig>],
        route: &RouteConfig,
        target: &str,
        segments: &[UrlSegment],
        outlet: &str,
    ) -> Expanded<UrlSegmentGroup> {
        if route.is_wildcard() {
            let new_segments = apply_redirect_commands(&[], target, &HashMap::new())?;
            if target.starts_with('/') {
                return Err(Failure::AbsoluteRedirect(new_segments));
            }
            return Ok(UrlSegmentGroup::new(new_segments, BTreeMap::new()));
        }

        let matched = match_route(group.has_children(), route, segments)
            .ok_or_else(|| Failure::NoMatch(segments_string(segments)))?;
        let mut new_segments = apply_redirect_commands(&matched.consumed, target, &matched.positional)?;
        if target.starts_with('/') {
            return Err(Failure::AbsoluteRedirect(new_segments));
        }
        new_segments.extend_from_slice(&segments[matched.last_child..]);
        self.expand_segment(group, routes, &new_segments, outlet, false)
    }

    fn match_segment_against_route(
        &self,
        raw_group: &UrlSegmentGroup,
        route: &RouteConfig,
        segments: &[UrlSegment],
    ) -> Expanded<UrlSegmentGroup> {
        if route.is_wildcard() {
            return Ok(UrlSegmentGroup::new(segments.to_vec(), BTreeMap::new()));
        }

        let matched = match_route(raw_group.has_children(), route, segments)
            .ok_or_else(|| Failure::NoMatch(segments_string(segments)))?;
        let sliced = &segments[matched.last_child..];
        let child_config = &route.children;

        if sliced.is_empty() && raw_group.has_children() {
            let children = self.expand_children(child_config, raw_group)?;
            return Ok(UrlSegmentGroup::new(matched.consumed, children));
        }
        if child_config.is_empty() && sliced.is_empty() {
            return Ok(UrlSegmentGroup::new(matched.consumed, BTreeMap::new()));
        }

        let expanded = self.expand_segment(raw_group, child_config, sliced, PRIMARY_OUTLET, true)?;
        let mut consumed = matched.consumed;
        consumed.extend(expanded.segments);
        Ok(UrlSegmentGroup::new(consumed, expanded.children))
    }
}

fn apply_redirect_commands(
    consumed: &[UrlSegment],
    target: &str,
    positional: &HashMap<String, UrlSegment>,
) -> Expanded<Vec<UrlSegment>> {
    let relative = target.strip_prefix('/').unwrap_or(target);
    if relative.is_empty() {
        return Ok(Vec::new());
    }
    relative
        .split('/')
        .map(|part| match part.strip_prefix(':') {
            Some(name) => positional.get(name).cloned().ok_or_else(|| {
                Failure::Error(NavigationError::Redirect(format!(
                    "cannot redirect to '{}': cannot find '{}'",
                    target, part
                )))
            }),
            None => Ok(consumed
                .iter()
                .find(|s| s.path == part)
                .cloned()
                .unwrap_or_else(|| UrlSegment::new(part))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::config::Route;
    use waypost_core::serializer::{DefaultUrlSerializer, UrlSerializer};

    fn redirect(routes: Vec<Route>, url: &str) -> Result<String, NavigationError> {
        let table = RouteTable::compile(&routes).unwrap();
        let serializer = DefaultUrlSerializer;
        let tree = serializer.parse(url).unwrap();
        apply_redirects(&tree, &table).map(|t| serializer.serialize(&t))
    }

    #[test]
    fn relative_redirect_with_params() {
        let routes = vec![
            Route::new("old/:id").redirect_to("team/:id"),
            Route::new("team/:id").component("TeamCmp"),
        ];
        assert_eq!(redirect(routes, "/old/33?x=1").unwrap(), "/team/33?x=1");
    }

    #[test]
    fn empty_path_full_redirect() {
        let routes = vec![
            Route::new("").full_match().redirect_to("home"),
            Route::new("home").component("HomeCmp"),
        ];
        assert_eq!(redirect(routes.clone(), "/").unwrap(), "/home");
        assert_eq!(redirect(routes, "/home").unwrap(), "/home");
    }

    #[test]
    fn absolute_redirect_from_child() {
        let routes = vec![
            Route::new("team/:id")
                .component("TeamCmp")
                .children(vec![Route::new("legacy").redirect_to("/home")]),
            Route::new("home").component("HomeCmp"),
        ];
        assert_eq!(redirect(routes, "/team/1/legacy#top").unwrap(), "/home#top");
    }

    #[test]
    fn wildcard_redirect_and_missing_param() {
        let routes = vec![
            Route::new("home").component("HomeCmp"),
            Route::new("**").redirect_to("/home"),
        ];
        assert_eq!(redirect(routes, "/nowhere/at/all").unwrap(), "/home");

        let broken = vec![Route::new("a/:id").redirect_to("b/:other")];
        let err = redirect(broken, "/a/1").unwrap_err();
        assert!(matches!(err, NavigationError::Redirect(msg) if msg.contains(":other")));
    }

    #[test]
    fn unmatched_url_is_an_error() {
        let routes = vec![Route::new("home").component("HomeCmp")];
        let err = redirect(routes, "/missing").unwrap_err();
        assert!(matches!(err, NavigationError::NoMatch { url } if url == "missing"));
    }
}
