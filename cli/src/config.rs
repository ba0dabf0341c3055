//! Simulation file format: a router configuration plus headless stand-ins for the UI.
//!
//! ```toml
//! root-slots = ["primary"]
//!
//! [components]
//! TeamCmp = ["primary"]
//!
//! [guards]
//! isAdmin = false
//!
//! [resolvers]
//! loadTeam = { name = "core" }
//!
//! [[routes]]
//! path = "team/:id"
//! component = "TeamCmp"
//! resolve = { team = "loadTeam" }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use waypost::config::{Route, RouterConfig};
use waypost::guard::{Eventual, GuardRequest, Registry};
use waypost::snapshot::{RouteSnapshot, RouterStateSnapshot};
use waypost::url_tree::PRIMARY_OUTLET;

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SimulationConfig {
    #[serde(flatten)]
    pub router: RouterConfig,
    /// Slots of the root registry.
    pub root_slots: Vec<String>,
    /// Component name to the slots it exposes once mounted.
    pub components: BTreeMap<String, Vec<String>>,
    /// Guard token to a fixed answer.
    pub guards: BTreeMap<String, bool>,
    /// Resolver token to a fixed value.
    pub resolvers: BTreeMap<String, toml::Value>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            root_slots: vec![PRIMARY_OUTLET.to_string()],
            components: BTreeMap::new(),
            guards: BTreeMap::new(),
            resolvers: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("cannot parse simulation config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Guards and resolvers answering with the configured constants.
    pub fn registry(&self) -> Result<Registry> {
        let mut registry = Registry::new();
        for (token, answer) in &self.guards {
            let answer = *answer;
            registry.register_guard(token.clone(), move |_: &GuardRequest| Eventual::now(answer));
        }
        for (token, value) in &self.resolvers {
            let value = serde_json::to_value(value)
                .with_context(|| format!("resolver '{}' has no JSON form", token))?;
            registry.register_resolver(
                token.clone(),
                move |_: &Arc<RouteSnapshot>, _: &Arc<RouterStateSnapshot>| Eventual::now(value.clone()),
            );
        }
        Ok(registry)
    }

    /// Child outlets that a component's template does not declare. Such navigations would
    /// fail with a missing-slot error.
    pub fn missing_slots(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for route in &self.router.routes {
            self.check_route(route, &self.root_slots, &mut problems);
        }
        problems
    }

    fn check_route(&self, route: &Route, available: &[String], problems: &mut Vec<String>) {
        let outlet = route.outlet.as_deref().unwrap_or(PRIMARY_OUTLET);
        if let Some(component) = &route.component {
            if !available.iter().any(|s| s == outlet) {
                problems.push(format!(
                    "route '{}' renders {} into slot '{}', which its parent does not expose",
                    route.path, component, outlet
                ));
            }
            let slots = self.components.get(component).cloned().unwrap_or_default();
            for child in &route.children {
                self.check_route(child, &slots, problems);
            }
        } else {
            for child in &route.children {
                self.check_route(child, available, problems);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost::options::GuardExecution;

    const SAMPLE: &str = r#"
        [options]
        guard-execution = "concurrent"

        [components]
        TeamCmp = ["primary"]

        [guards]
        isAdmin = false

        [resolvers]
        loadTeam = { name = "core" }

        [[routes]]
        path = "team/:id"
        component = "TeamCmp"

        [[routes.children]]
        path = "user/:name"
        component = "UserCmp"

        [[routes.children]]
        path = "chat"
        component = "ChatCmp"
        outlet = "aux"
    "#;

    #[test]
    fn sample_parses_with_defaults() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.root_slots, vec!["primary"]);
        assert_eq!(config.router.options.guard_execution, GuardExecution::Concurrent);
        assert_eq!(config.router.routes[0].children.len(), 2);
        assert!(config.registry().is_ok());
    }

    #[test]
    fn undeclared_child_slots_are_reported() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        let problems = config.missing_slots();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("ChatCmp"));
        assert!(problems[0].contains("'aux'"));
    }
}
