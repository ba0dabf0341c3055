//! # Route table
//!
//! `Route` is the declarative, serde-friendly form of a route-table entry (what users
//! write in code or TOML). `RouteTable::compile` validates a list of them and freezes it
//! into `Arc<RouteConfig>` entries with stable identities.
//!
//! Identity matters: the navigation pipeline decides whether a mounted route can be
//! reused by comparing [`RouteConfigId`]s, never by structural equality. Every compiled
//! table gets a fresh generation, so entries of a replaced table never match new ones.

use crate::error::ConfigError;
use crate::options::RouterOptions;
use crate::url_tree::PRIMARY_OUTLET;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Static data attached to a route, merged with resolved data at navigation time.
pub type Data = BTreeMap<String, serde_json::Value>;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathMatch {
    #[default]
    Prefix,
    Full,
}

/// A route-table entry as declared by the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Route {
    pub path: String,
    pub path_match: PathMatch,
    pub component: Option<String>,
    pub outlet: Option<String>,
    pub redirect_to: Option<String>,
    pub can_activate: Vec<String>,
    pub can_activate_child: Vec<String>,
    pub can_deactivate: Vec<String>,
    pub resolve: BTreeMap<String, String>,
    pub data: Data,
    pub children: Vec<Route>,
}

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn outlet(mut self, outlet: impl Into<String>) -> Self {
        self.outlet = Some(outlet.into());
        self
    }

    pub fn redirect_to(mut self, target: impl Into<String>) -> Self {
        self.redirect_to = Some(target.into());
        self
    }

    pub fn full_match(mut self) -> Self {
        self.path_match = PathMatch::Full;
        self
    }

    pub fn can_activate(mut self, token: impl Into<String>) -> Self {
        self.can_activate.push(token.into());
        self
    }

    pub fn can_activate_child(mut self, token: impl Into<String>) -> Self {
        self.can_activate_child.push(token.into());
        self
    }

    pub fn can_deactivate(mut self, token: impl Into<String>) -> Self {
        self.can_deactivate.push(token.into());
        self
    }

    pub fn resolve(mut self, key: impl Into<String>, token: impl Into<String>) -> Self {
        self.resolve.insert(key.into(), token.into());
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn children(mut self, children: Vec<Route>) -> Self {
        self.children = children;
        self
    }

    fn validate(&self, parent_path: &str) -> Result<(), ConfigError> {
        let full_path = if parent_path.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{}", parent_path, self.path)
        };

        if self.path.starts_with('/') {
            return Err(ConfigError::LeadingSlash { path: full_path });
        }
        if self.redirect_to.is_some() {
            if self.component.is_some() {
                return Err(ConfigError::RedirectConflict {
                    path: full_path,
                    other: "component",
                });
            }
            if !self.children.is_empty() {
                return Err(ConfigError::RedirectConflict {
                    path: full_path,
                    other: "children",
                });
            }
            if self.path.is_empty() && self.path_match == PathMatch::Prefix {
                return Err(ConfigError::EmptyPrefixRedirect { path: full_path });
            }
        }
        if self.component.is_none() && self.redirect_to.is_none() && self.children.is_empty() {
            return Err(ConfigError::Incomplete { path: full_path });
        }
        for child in &self.children {
            child.validate(&full_path)?;
        }
        Ok(())
    }
}

/// Stable identity of a compiled route-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteConfigId {
    pub generation: u64,
    pub index: u32,
}

/// A compiled, immutable route-table entry.
#[derive(Debug)]
pub struct RouteConfig {
    pub id: RouteConfigId,
    pub path: String,
    pub path_match: PathMatch,
    pub component: Option<String>,
    pub outlet: String,
    pub redirect_to: Option<String>,
    pub can_activate: Vec<String>,
    pub can_activate_child: Vec<String>,
    pub can_deactivate: Vec<String>,
    pub resolve: BTreeMap<String, String>,
    pub data: Data,
    pub children: Vec<Arc<RouteConfig>>,
}

impl RouteConfig {
    pub fn is_wildcard(&self) -> bool {
        self.path == "**"
    }

    pub fn is_componentless(&self) -> bool {
        self.component.is_none()
    }
}

impl PartialEq for RouteConfig {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RouteConfig {}

/// A validated route table. Replaced wholesale, never patched per entry.
#[derive(Debug, Clone)]
pub struct RouteTable {
    generation: u64,
    routes: Vec<Arc<RouteConfig>>,
}

impl RouteTable {
    pub fn compile(routes: &[Route]) -> Result<Self, ConfigError> {
        for route in routes {
            route.validate("")?;
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let mut next_index = 0u32;
        let compiled = routes
            .iter()
            .map(|r| freeze(r, generation, &mut next_index))
            .collect();

        tracing::debug!(generation, entries = next_index, "compiled route table");
        Ok(Self {
            generation,
            routes: compiled,
        })
    }

    pub fn empty() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            routes: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn routes(&self) -> &[Arc<RouteConfig>] {
        &self.routes
    }

    /// Find a compiled entry by its declared path chain, e.g. `["team/:id", "user/:name"]`.
    pub fn find(&self, paths: &[&str]) -> Option<&Arc<RouteConfig>> {
        let (first, rest) = paths.split_first()?;
        let mut current = self.routes.iter().find(|r| r.path == *first)?;
        for path in rest {
            current = current.children.iter().find(|r| r.path == *path)?;
        }
        Some(current)
    }
}

fn freeze(route: &Route, generation: u64, next_index: &mut u32) -> Arc<RouteConfig> {
    let id = RouteConfigId {
        generation,
        index: *next_index,
    };
    *next_index += 1;

    let children = route
        .children
        .iter()
        .map(|c| freeze(c, generation, next_index))
        .collect();

    Arc::new(RouteConfig {
        id,
        path: route.path.clone(),
        path_match: route.path_match,
        component: route.component.clone(),
        outlet: route
            .outlet
            .clone()
            .unwrap_or_else(|| PRIMARY_OUTLET.to_string()),
        redirect_to: route.redirect_to.clone(),
        can_activate: route.can_activate.clone(),
        can_activate_child: route.can_activate_child.clone(),
        can_deactivate: route.can_deactivate.clone(),
        resolve: route.resolve.clone(),
        data: route.data.clone(),
        children,
    })
}

/// Router configuration file: options plus the route table.
///
/// ```toml
/// [options]
/// enable-tracing = true
///
/// [[routes]]
/// path = "team/:id"
/// component = "TeamCmp"
///
/// [[routes.children]]
/// path = "user/:name"
/// component = "UserCmp"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub options: RouterOptions,
    pub routes: Vec<Route>,
}

impl RouterConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn table(&self) -> Result<RouteTable, ConfigError> {
        RouteTable::compile(&self.routes)
    }
}
