//! # UrlTree: the parsed form of a location
//!
//! A URL is a tree of segment groups. The root group never carries segments; each
//! outlet (slot) the URL addresses hangs off a group as a named child. The primary
//! outlet is serialized as a plain path, named outlets inside parentheses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The slot name used when a route does not name one.
pub const PRIMARY_OUTLET: &str = "primary";

pub type Params = BTreeMap<String, String>;

/// Address of a segment group: the outlet names walked from the root.
pub type GroupPath = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSegment {
    pub path: String,
}

impl UrlSegment {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UrlSegmentGroup {
    pub segments: Vec<UrlSegment>,
    pub children: BTreeMap<String, UrlSegmentGroup>,
}

impl UrlSegmentGroup {
    pub fn new(segments: Vec<UrlSegment>, children: BTreeMap<String, UrlSegmentGroup>) -> Self {
        Self { segments, children }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn primary(&self) -> Option<&UrlSegmentGroup> {
        self.children.get(PRIMARY_OUTLET)
    }

    /// Children with the primary outlet first, the named outlets after it in name order.
    pub fn ordered_children(&self) -> Vec<(&str, &UrlSegmentGroup)> {
        let mut out: Vec<(&str, &UrlSegmentGroup)> = Vec::with_capacity(self.children.len());
        if let Some(primary) = self.primary() {
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

    /// Resolve a descendant group by its address.
    pub fn at(&self, path: &[String]) -> Option<&UrlSegmentGroup> {
        let mut group = self;
        for outlet in path {
            group = group.children.get(outlet)?;
        }
        Some(group)
    }

    pub fn at_mut(&mut self, path: &[String]) -> Option<&mut UrlSegmentGroup> {
        let mut group = self;
        for outlet in path {
            group = group.children.get_mut(outlet)?;
        }
        Some(group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UrlTree {
    pub root: UrlSegmentGroup,
    pub query_params: Params,
    pub fragment: Option<String>,
}

impl UrlTree {
    pub fn new(root: UrlSegmentGroup, query_params: Params, fragment: Option<String>) -> Self {
        Self {
            root,
            query_params,
            fragment,
        }
    }

    /// The tree for `/`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Primary-outlet path segments from the root, flattened.
    pub fn primary_segments(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut group = self.root.primary();
        while let Some(g) = group {
            out.extend(g.segments.iter().map(|s| s.path.as_str()));
            group = g.primary();
        }
        out
    }
}

/// Whether `containee` is active within `container`.
///
/// With `exact`, both trees must be equal (query params included). Otherwise `containee`
/// only has to be a prefix of `container` and its query params a subset.
pub fn contains_tree(container: &UrlTree, containee: &UrlTree, exact: bool) -> bool {
    if exact {
        container.query_params == containee.query_params
            && equal_segment_groups(&container.root, &containee.root)
    } else {
        contains_query_params(&container.query_params, &containee.query_params)
            && contains_segment_group(&container.root, &containee.root, &containee.root.segments)
    }
}

fn contains_query_params(container: &Params, containee: &Params) -> bool {
    containee
        .iter()
        .all(|(key, value)| container.get(key) == Some(value))
}

fn equal_path(a: &[UrlSegment], b: &[UrlSegment]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.path == y.path)
}

fn equal_segment_groups(container: &UrlSegmentGroup, containee: &UrlSegmentGroup) -> bool {
    if !equal_path(&container.segments, &containee.segments) {
        return false;
    }
    if container.children.len() != containee.children.len() {
        return false;
    }
    containee.children.iter().all(|(outlet, child)| {
        container
            .children
            .get(outlet)
            .is_some_and(|other| equal_segment_groups(other, child))
    })
}

fn contains_segment_group(
    container: &UrlSegmentGroup,
    containee: &UrlSegmentGroup,
    containee_paths: &[UrlSegment],
) -> bool {
    use std::cmp::Ordering;

    match container.segments.len().cmp(&containee_paths.len()) {
        Ordering::Greater => {
            let current = &container.segments[..containee_paths.len()];
            equal_path(current, containee_paths) && !containee.has_children()
        }
        Ordering::Equal => {
            if !equal_path(&container.segments, containee_paths) {
                return false;
            }
            containee.children.iter().all(|(outlet, child)| {
                container
                    .children
                    .get(outlet)
                    .is_some_and(|other| contains_segment_group(other, child, &child.segments))
            })
        }
        Ordering::Less => {
            let (current, next) = containee_paths.split_at(container.segments.len());
            if !equal_path(&container.segments, current) {
                return false;
            }
            match container.primary() {
                Some(primary) => contains_segment_group(primary, containee, next),
                None => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(paths: &[&str]) -> UrlSegmentGroup {
        UrlSegmentGroup::new(paths.iter().map(|p| UrlSegment::new(*p)).collect(), BTreeMap::new())
    }

    fn tree(paths: &[&str]) -> UrlTree {
        let mut root = UrlSegmentGroup::empty();
        root.children.insert(PRIMARY_OUTLET.to_string(), group(paths));
        UrlTree::new(root, Params::new(), None)
    }

    #[test]
    fn prefix_is_contained_but_not_exact() {
        let current = tree(&["team", "33", "user", "11"]);
        let prefix = tree(&["team", "33"]);

        assert!(contains_tree(&current, &prefix, false));
        assert!(!contains_tree(&current, &prefix, true));
        assert!(contains_tree(&current, &current.clone(), true));
        assert!(!contains_tree(&prefix, &current, false));
    }

    #[test]
    fn query_params_must_be_a_subset() {
        let mut current = tree(&["search"]);
        current.query_params.insert("q".into(), "rust".into());
        current.query_params.insert("page".into(), "2".into());

        let mut probe = tree(&["search"]);
        probe.query_params.insert("q".into(), "rust".into());
        assert!(contains_tree(&current, &probe, false));

        probe.query_params.insert("page".into(), "3".into());
        assert!(!contains_tree(&current, &probe, false));
    }

    #[test]
    fn primary_segments_flatten_nested_groups() {
        let mut inner = group(&["user", "11"]);
        inner.children.clear();
        let mut outer = group(&["team", "33"]);
        outer.children.insert(PRIMARY_OUTLET.to_string(), inner);
        let mut root = UrlSegmentGroup::empty();
        root.children.insert(PRIMARY_OUTLET.to_string(), outer);
        let tree = UrlTree::new(root, Params::new(), None);

        assert_eq!(tree.primary_segments(), vec!["team", "33", "user", "11"]);
        assert!(tree.root.at(&["primary".into(), "primary".into()]).is_some());
    }
}
