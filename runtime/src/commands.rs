//! # Command-based URL trees
//!
//! Builds a new [`UrlTree`] from a list of navigation commands, either absolutely or
//! relative to a route of the current state. The first command may carry several
//! `/`-separated parts, including `.`, `..` and a leading `/`. A trailing
//! [`Command::Outlets`] updates or removes named outlets.

use std::collections::BTreeMap;
use waypost_core::error::NavigationError;
use waypost_core::snapshot::RouteSnapshot;
use waypost_core::url_tree::{GroupPath, PRIMARY_OUTLET, Params, UrlSegment, UrlSegmentGroup, UrlTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Segment(String),
    /// Per-outlet commands. `None` removes the outlet.
    Outlets(BTreeMap<String, Option<Vec<Command>>>),
}

impl Command {
    pub fn outlets<I, K>(outlets: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<Vec<Command>>)>,
        K: Into<String>,
    {
        Command::Outlets(outlets.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    fn path(&self) -> Option<&str> {
        match self {
            Command::Segment(path) => Some(path),
            Command::Outlets(_) => None,
        }
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        Command::Segment(value.to_string())
    }
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        Command::Segment(value)
    }
}

struct Navigation {
    absolute: bool,
    double_dots: usize,
    commands: Vec<Command>,
}

impl Navigation {
    fn compute(commands: &[Command]) -> Result<Self, NavigationError> {
        let mut absolute = false;
        let mut double_dots = 0;
        let mut normalized = Vec::with_capacity(commands.len());

        for (i, command) in commands.iter().enumerate() {
            match command {
                Command::Segment(raw) if i == 0 => {
                    for (part_index, part) in raw.split('/').enumerate() {
                        if part_index == 0 && part == "." {
                            continue;
                        } else if part_index == 0 && part.is_empty() {
                            absolute = true;
                        } else if part == ".." {
                            double_dots += 1;
                        } else if !part.is_empty() {
                            normalized.push(Command::Segment(part.to_string()));
                        }
                    }
                }
                other => normalized.push(other.clone()),
            }
        }

        let outlets_at = normalized
            .iter()
            .position(|c| matches!(c, Command::Outlets(_)));
        if outlets_at.is_some_and(|at| at + 1 != normalized.len()) {
            return Err(NavigationError::InvalidCommands(
                "an outlets command has to be the last command".into(),
            ));
        }

        Ok(Self {
            absolute,
            double_dots,
            commands: normalized,
        })
    }
}

struct Position {
    group: GroupPath,
    process_children: bool,
    index: usize,
}

impl Position {
    fn root() -> Self {
        Self {
            group: GroupPath::new(),
            process_children: true,
            index: 0,
        }
    }
}

/// Apply `commands` to `url_tree`.
///
/// `relative_to` is the snapshot of the route relative commands start from; it must have
/// been recognized from `url_tree`. Without one, commands apply from the root.
pub fn create_url_tree(
    relative_to: Option<&RouteSnapshot>,
    url_tree: &UrlTree,
    commands: &[Command],
    query_params: Params,
    fragment: Option<String>,
) -> Result<UrlTree, NavigationError> {
    if commands.is_empty() {
        return Ok(UrlTree::new(url_tree.root.clone(), query_params, fragment));
    }
    if commands.len() == 1 && commands[0].path() == Some("/") {
        return Ok(UrlTree::new(UrlSegmentGroup::empty(), query_params, fragment));
    }

    let navigation = Navigation::compute(commands)?;
    let position = find_starting_position(&navigation, url_tree, relative_to)?;
    let group = url_tree.root.at(&position.group).ok_or_else(|| {
        NavigationError::InvalidCommands(format!(
            "outlet path {:?} is not part of the current url",
            position.group
        ))
    })?;

    let updated = if position.process_children {
        update_segment_group_children(group, position.index, &navigation.commands)
    } else {
        update_segment_group(Some(group), position.index, &navigation.commands)
    };

    let mut root = url_tree.root.clone();
    match root.at_mut(&position.group) {
        Some(slot) => *slot = updated,
        None => root = updated,
    }
    Ok(UrlTree::new(root, query_params, fragment))
}

fn find_starting_position(
    navigation: &Navigation,
    tree: &UrlTree,
    route: Option<&RouteSnapshot>,
) -> Result<Position, NavigationError> {
    let route = match route {
        Some(route) if !navigation.absolute => route,
        _ => return Ok(Position::root()),
    };
    if route.last_path_index < 0 {
        return Ok(Position {
            group: route.url_group.clone(),
            process_children: true,
            index: 0,
        });
    }

    let mut group = route.url_group.clone();
    let mut index = route.last_path_index as usize + 1;
    let mut double_dots = navigation.double_dots;
    while double_dots > index {
        double_dots -= index;
        if group.pop().is_none() {
            return Err(NavigationError::InvalidCommands("invalid number of '../'".into()));
        }
        index = tree.root.at(&group).map_or(0, |g| g.segments.len());
    }
    Ok(Position {
        group,
        process_children: false,
        index: index - double_dots,
    })
}

fn update_segment_group(
    group: Option<&UrlSegmentGroup>,
    start: usize,
    commands: &[Command],
) -> UrlSegmentGroup {
    let empty = UrlSegmentGroup::empty();
    let group = group.unwrap_or(&empty);
    if group.segments.is_empty() && group.has_children() {
        return update_segment_group_children(group, start, commands);
    }

    let prefix = prefixed_with(group, start, commands);
    let Some((path_index, command_index)) = prefix else {
        return create_new_segment_group(group, start, commands);
    };
    let sliced = &commands[command_index..];

    if path_index < group.segments.len() {
        let mut split = UrlSegmentGroup::new(group.segments[..path_index].to_vec(), BTreeMap::new());
        split.children.insert(
            PRIMARY_OUTLET.to_string(),
            UrlSegmentGroup::new(group.segments[path_index..].to_vec(), group.children.clone()),
        );
        update_segment_group_children(&split, 0, sliced)
    } else if sliced.is_empty() {
        UrlSegmentGroup::new(group.segments.clone(), BTreeMap::new())
    } else if !group.has_children() {
        create_new_segment_group(group, start, commands)
    } else {
        update_segment_group_children(group, 0, sliced)
    }
}

fn update_segment_group_children(
    group: &UrlSegmentGroup,
    start: usize,
    commands: &[Command],
) -> UrlSegmentGroup {
    if commands.is_empty() {
        return UrlSegmentGroup::new(group.segments.clone(), BTreeMap::new());
    }

    let outlets = match &commands[0] {
        Command::Outlets(outlets) => outlets.clone(),
        Command::Segment(_) => BTreeMap::from([(PRIMARY_OUTLET.to_string(), Some(commands.to_vec()))]),
    };

    let mut children = BTreeMap::new();
    for (outlet, commands) in &outlets {
        if let Some(commands) = commands {
            children.insert(
                outlet.clone(),
                update_segment_group(group.children.get(outlet), start, commands),
            );
        }
    }
    for (outlet, child) in &group.children {
        if !outlets.contains_key(outlet) {
            children.insert(outlet.clone(), child.clone());
        }
    }
    UrlSegmentGroup::new(group.segments.clone(), children)
}

/// How far the commands agree with the group's segments from `start` on, as
/// `(path_index, command_index)`. `None` when they diverge.
fn prefixed_with(group: &UrlSegmentGroup, start: usize, commands: &[Command]) -> Option<(usize, usize)> {
    let mut command_index = 0;
    let mut path_index = start;
    while path_index < group.segments.len() {
        let command = commands.get(command_index)?;
        match command.path() {
            None if path_index > 0 => break,
            Some(path) if path == group.segments[path_index].path => command_index += 1,
            _ => return None,
        }
        path_index += 1;
    }
    Some((path_index, command_index))
}

fn create_new_segment_group(group: &UrlSegmentGroup, start: usize, commands: &[Command]) -> UrlSegmentGroup {
    let keep = start.min(group.segments.len());
    let mut paths = group.segments[..keep].to_vec();
    for command in commands {
        match command {
            Command::Outlets(outlets) => {
                return UrlSegmentGroup::new(paths, create_new_segment_children(outlets));
            }
            Command::Segment(path) => paths.push(UrlSegment::new(path.clone())),
        }
    }
    UrlSegmentGroup::new(paths, BTreeMap::new())
}

fn create_new_segment_children(
    outlets: &BTreeMap<String, Option<Vec<Command>>>,
) -> BTreeMap<String, UrlSegmentGroup> {
    outlets
        .iter()
        .filter_map(|(outlet, commands)| {
            commands.as_ref().map(|commands| {
                (
                    outlet.clone(),
                    create_new_segment_group(&UrlSegmentGroup::empty(), 0, commands),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::recognize;
    use std::sync::Arc;
    use waypost_core::config::{Route, RouteTable};
    use waypost_core::options::ParamsInheritance;
    use waypost_core::serializer::{DefaultUrlSerializer, UrlSerializer};
    use waypost_core::tree::TreeNode;

    struct Current {
        tree: UrlTree,
        routes: TreeNode<Arc<RouteSnapshot>>,
    }

    fn current(url: &str) -> Current {
        let table = RouteTable::compile(&[
            Route::new("team/:id")
                .component("TeamCmp")
                .children(vec![Route::new("user/:name").component("UserCmp")]),
            Route::new("chat").component("ChatCmp").outlet("aux"),
        ])
        .unwrap();
        let tree = DefaultUrlSerializer.parse(url).unwrap();
        let routes = recognize(&tree, &table, ParamsInheritance::EmptyOnly).unwrap();
        Current { tree, routes }
    }

    fn create(current: &Current, relative_to: &[usize], commands: &[Command]) -> Result<String, NavigationError> {
        let route = current.routes.node(relative_to).map(|n| n.value.as_ref());
        create_url_tree(route, &current.tree, commands, Params::new(), None)
            .map(|t| DefaultUrlSerializer.serialize(&t))
    }

    #[test]
    fn absolute_and_root_commands() {
        let c = current("/team/33/user/11");
        assert_eq!(create(&c, &[0, 0], &["/a/b".into()]).unwrap(), "/a/b");
        assert_eq!(create(&c, &[0, 0], &["/".into()]).unwrap(), "/");
        assert_eq!(create(&c, &[], &["team".into(), "44".into()]).unwrap(), "/team/44");
    }

    #[test]
    fn relative_commands() {
        let c = current("/team/33/user/11");
        assert_eq!(create(&c, &[0], &["user".into(), "22".into()]).unwrap(), "/team/33/user/22");
        assert_eq!(create(&c, &[0], &["./user/5".into()]).unwrap(), "/team/33/user/5");
        assert_eq!(create(&c, &[0, 0], &["../22".into()]).unwrap(), "/team/33/user/22");
        assert_eq!(create(&c, &[0, 0], &["../../../x".into()]).unwrap(), "/team/x");
    }

    #[test]
    fn too_many_double_dots() {
        let c = current("/team/33/user/11");
        let err = create(&c, &[0], &["../../../x".into()]).unwrap_err();
        assert!(matches!(err, NavigationError::InvalidCommands(msg) if msg.contains("'../'")));
    }

    #[test]
    fn outlet_commands() {
        let c = current("/team/33(aux:chat)");
        let remove = Command::outlets([("aux", None)]);
        assert_eq!(create(&c, &[], &[remove]).unwrap(), "/team/33");

        let replace = Command::outlets([("aux", Some(vec!["inbox".into()]))]);
        assert_eq!(create(&c, &[], &[replace]).unwrap(), "/team/33(aux:inbox)");

        let misplaced = vec![Command::outlets([("aux", None)]), "x".into()];
        assert!(create(&c, &[], &misplaced).is_err());
    }

    #[test]
    fn empty_commands_keep_the_tree_and_take_new_query() {
        let c = current("/team/33?old=1");
        let mut query = Params::new();
        query.insert("new".into(), "2".into());
        let tree = create_url_tree(None, &c.tree, &[], query, Some("top".into())).unwrap();
        assert_eq!(DefaultUrlSerializer.serialize(&tree), "/team/33?new=2#top");
    }
}
