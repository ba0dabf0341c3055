use serde::{Deserialize, Serialize};

/// Which ancestors a route inherits params and data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamsInheritance {
    /// Inherit only through empty-path routes and componentless parents.
    #[default]
    EmptyOnly,
    /// Inherit from every ancestor.
    Always,
}

/// How the predicates of a check list are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardExecution {
    /// One predicate at a time, in check order. The first denial stops evaluation.
    #[default]
    Sequential,
    /// All predicates polled together. The first denial wins and the rest are dropped.
    Concurrent,
}

/// When a mounted route may be kept across navigations.
///
/// Either way a param change is guarded as a full re-entry: the old route is asked to
/// deactivate and the new one to activate. The modes differ only in what happens to the
/// component. Under the default [`Config`](Self::Config) `/team/33/user/11` to
/// `/team/33/user/22` keeps `UserCmp` mounted and pushes the new params through its
/// cells. Under [`ConfigAndParams`](Self::ConfigAndParams) `UserCmp` is unmounted and
/// mounted again, while `TeamCmp` stays untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteReuse {
    /// Same route-table entry. Components survive param changes.
    #[default]
    Config,
    /// Same route-table entry and equal params. A param change remounts.
    ConfigAndParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RouterOptions {
    /// Log every router event at `info`.
    pub enable_tracing: bool,
    pub params_inheritance: ParamsInheritance,
    pub guard_execution: GuardExecution,
    pub route_reuse: RouteReuse,
    /// Buffer size of the router event channel.
    pub event_capacity: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            enable_tracing: false,
            params_inheritance: ParamsInheritance::EmptyOnly,
            guard_execution: GuardExecution::Sequential,
            route_reuse: RouteReuse::Config,
            event_capacity: 64,
        }
    }
}

impl RouterOptions {
    /// Defaults overlaid with the environment. See [`RouterOptions::with_env`].
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay values from the environment:
    /// - `WAYPOST_TRACING=1|true|on`
    /// - `WAYPOST_GUARD_EXECUTION=sequential|concurrent`
    /// - `WAYPOST_ROUTE_REUSE=config|config-and-params`
    ///
    /// Unrecognized values are ignored with a warning.
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = var("WAYPOST_TRACING") {
            match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.enable_tracing = true,
                "0" | "false" | "off" | "no" => self.enable_tracing = false,
                other => tracing::warn!("ignoring WAYPOST_TRACING={}", other),
            }
        }

        if let Some(raw) = var("WAYPOST_GUARD_EXECUTION") {
            match raw.to_ascii_lowercase().as_str() {
                "sequential" => self.guard_execution = GuardExecution::Sequential,
                "concurrent" => self.guard_execution = GuardExecution::Concurrent,
                other => tracing::warn!("ignoring WAYPOST_GUARD_EXECUTION={}", other),
            }
        }

        if let Some(raw) = var("WAYPOST_ROUTE_REUSE") {
            match raw.to_ascii_lowercase().as_str() {
                "config" => self.route_reuse = RouteReuse::Config,
                "config-and-params" | "config_and_params" => {
                    self.route_reuse = RouteReuse::ConfigAndParams
                }
                other => tracing::warn!("ignoring WAYPOST_ROUTE_REUSE={}", other),
            }
        }

        self
    }
}
