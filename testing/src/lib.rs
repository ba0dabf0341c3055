//! # Waypost Test
//!
//! Headless doubles for driving a [`Router`] in tests:
//!
//! - [`RecordingOutlet`]: mounts anything, journals mount/unmount, registers the child
//!   slots each component declares in [`Components`]
//! - [`GuardLog`] and [`Gate`]: guards that record their call order or block until released
//! - [`Harness`]: a router wired to a [`MemoryLocation`] with recording outlets at the root
//!
//! ```rust,ignore
//! let harness = Harness::builder(routes)
//!     .components(Components::new().with("TeamCmp", &["primary"]))
//!     .build()?;
//! assert!(harness.navigate("/team/1/user/a").await?);
//! assert_eq!(harness.mounted(), vec!["primary=TeamCmp", "primary=TeamCmp/primary=UserCmp"]);
//! ```

use anyhow::bail;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use waypost_core::config::{Route, RouteTable};
use waypost_core::error::NavigationError;
use waypost_core::event::{RouterEvent, RouterEvents};
use waypost_core::guard::{Eventual, Guard, GuardRequest, Registry};
use waypost_core::location::MemoryLocation;
use waypost_core::options::RouterOptions;
use waypost_core::outlet::{ComponentHandle, MountRequest, Outlet};
use waypost_core::slot::{RegistryId, SlotRegistry};
use waypost_runtime::router::Router;

/// Ordered record of mount and unmount calls, shared by all outlets of a harness.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries recorded so far; the journal starts over empty.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock())
    }
}

/// Component templates: which slots a component exposes once mounted.
#[derive(Debug, Clone, Default)]
pub struct Components {
    slots: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: &str, slots: &[&str]) -> Self {
        self.slots
            .insert(component.to_string(), slots.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Mounting `component` fails.
    pub fn failing(mut self, component: &str) -> Self {
        self.failing.insert(component.to_string());
        self
    }

    pub fn slots_of(&self, component: &str) -> &[String] {
        self.slots.get(component).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// An outlet that records what it mounts.
pub struct RecordingOutlet {
    journal: Journal,
    components: Arc<Components>,
}

impl RecordingOutlet {
    pub fn new(journal: Journal, components: Arc<Components>) -> Self {
        Self { journal, components }
    }
}

impl Outlet for RecordingOutlet {
    fn mount(&self, request: MountRequest) -> anyhow::Result<ComponentHandle> {
        let component = request.component;
        if self.components.failing.contains(&component) {
            bail!("{} refused to mount", component);
        }
        self.journal.record(format!("mount {}", component));
        for slot in self.components.slots_of(&component) {
            request.slots.register_outlet(
                slot,
                Arc::new(RecordingOutlet::new(self.journal.clone(), self.components.clone())),
            )?;
        }
        Ok(ComponentHandle::new(component, Arc::new(request.route)))
    }

    fn unmount(&self, component: &ComponentHandle) {
        self.journal.record(format!("unmount {}", component.component()));
    }
}

pub fn allow() -> impl Guard {
    |_: &GuardRequest| Eventual::now(true)
}

pub fn deny() -> impl Guard {
    |_: &GuardRequest| Eventual::now(false)
}

/// Guards that append their label to a shared log when asked.
#[derive(Debug, Clone, Default)]
pub struct GuardLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl GuardLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self, label: &str, answer: bool) -> impl Guard + use<> {
        let calls = self.calls.clone();
        let label = label.to_string();
        move |_: &GuardRequest| {
            calls.lock().push(label.clone());
            Eventual::now(answer)
        }
    }

    /// Answers after `delay`. The label is logged when the guard is asked, not when it answers.
    pub fn delayed(&self, label: &str, answer: bool, delay: Duration) -> impl Guard + use<> {
        let calls = self.calls.clone();
        let label = label.to_string();
        move |_: &GuardRequest| {
            calls.lock().push(label.clone());
            Eventual::later(async move {
                tokio::time::sleep(delay).await;
                Ok(answer)
            })
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

/// A guard that holds every navigation it is asked about until [`Gate::open`].
#[derive(Debug, Clone)]
pub struct Gate {
    answer: watch::Sender<Option<bool>>,
    entered: watch::Sender<usize>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self {
            answer: watch::Sender::new(None),
            entered: watch::Sender::new(0),
        }
    }

    pub fn guard(&self) -> impl Guard + use<> {
        let answer = self.answer.clone();
        let entered = self.entered.clone();
        move |_: &GuardRequest| {
            entered.send_modify(|count| *count += 1);
            let mut answer = answer.subscribe();
            Eventual::later(async move {
                let decided = *answer.wait_for(Option::is_some).await?;
                Ok(decided.unwrap_or(false))
            })
        }
    }

    /// Wait until the guard was asked `count` times in total.
    pub async fn entered(&self, count: usize) {
        let mut entered = self.entered.subscribe();
        let _ = entered.wait_for(|c| *c >= count).await;
    }

    pub fn open(&self, answer: bool) {
        self.answer.send_replace(Some(answer));
    }
}

/// `kind:id` labels of `events`, in order.
pub fn kinds(events: &[RouterEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| format!("{}:{}", e.kind(), e.id()))
        .collect()
}

/// A router over an in-memory location, with recording outlets at the root.
pub struct Harness {
    pub router: Router,
    pub location: Arc<MemoryLocation>,
    pub journal: Journal,
}

pub struct HarnessBuilder {
    routes: Vec<Route>,
    components: Components,
    root_slots: Vec<String>,
    lookup: Registry,
    options: RouterOptions,
    initial_url: String,
}

impl HarnessBuilder {
    pub fn components(mut self, components: Components) -> Self {
        self.components = components;
        self
    }

    /// Slots of the root registry. Defaults to `primary`.
    pub fn root_slots(mut self, slots: &[&str]) -> Self {
        self.root_slots = slots.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn lookup(mut self, lookup: Registry) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn initial_url(mut self, url: &str) -> Self {
        self.initial_url = url.to_string();
        self
    }

    pub fn build(self) -> anyhow::Result<Harness> {
        let table = RouteTable::compile(&self.routes)?;
        let location = Arc::new(MemoryLocation::new(self.initial_url));
        let journal = Journal::default();
        let components = Arc::new(self.components);

        let router = Router::builder(table)
            .options(self.options)
            .lookup(self.lookup)
            .location(location.clone())
            .build();
        let slots = router.slots();
        for slot in &self.root_slots {
            slots.register_outlet(
                slots.root(),
                slot,
                Arc::new(RecordingOutlet::new(journal.clone(), components.clone())),
            )?;
        }

        Ok(Harness {
            router,
            location,
            journal,
        })
    }
}

impl Harness {
    pub fn builder(routes: Vec<Route>) -> HarnessBuilder {
        HarnessBuilder {
            routes,
            components: Components::new(),
            root_slots: vec!["primary".to_string()],
            lookup: Registry::new(),
            options: RouterOptions::default(),
            initial_url: "/".to_string(),
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<bool, NavigationError> {
        self.router.navigate_to(url).await
    }

    pub fn events(&self) -> RouterEvents {
        self.router.events()
    }

    /// Occupied slots, depth first, as `slot=Component` paths joined by `/`.
    pub fn mounted(&self) -> Vec<String> {
        let slots = self.router.slots();
        let mut out = Vec::new();
        collect_mounted(slots, slots.root(), "", &mut out);
        out
    }
}

fn collect_mounted(slots: &SlotRegistry, registry: RegistryId, prefix: &str, out: &mut Vec<String>) {
    for (slot, occupancy) in slots.occupied(registry) {
        let path = format!("{}{}={}", prefix, slot, occupancy.component.component());
        out.push(path.clone());
        collect_mounted(slots, occupancy.nested, &format!("{}/", path), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_mounts_declared_child_slots() {
        let harness = Harness::builder(vec![
            Route::new("team/:id")
                .component("TeamCmp")
                .children(vec![Route::new("user/:name").component("UserCmp")]),
        ])
        .components(Components::new().with("TeamCmp", &["primary"]))
        .build()
        .unwrap();

        assert!(harness.navigate("/team/1/user/a").await.unwrap());
        assert_eq!(
            harness.mounted(),
            vec!["primary=TeamCmp", "primary=TeamCmp/primary=UserCmp"]
        );
        assert_eq!(harness.journal.take(), vec!["mount TeamCmp", "mount UserCmp"]);
    }

    #[tokio::test]
    async fn gate_holds_until_opened() {
        let gate = Gate::new();
        let guard = gate.guard();
        let request = GuardRequest::Activate {
            route: Arc::new(waypost_core::snapshot::RouteSnapshot::root(Default::default(), None)),
            state: Arc::new(waypost_core::snapshot::RouterStateSnapshot::empty()),
        };
        let pending = tokio::spawn(guard.check(&request).resolve());
        gate.entered(1).await;
        gate.open(true);
        assert!(pending.await.unwrap().unwrap());
    }
}
