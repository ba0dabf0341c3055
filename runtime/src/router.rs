//! # Router: the navigation sequencer
//!
//! The `Router` owns the authoritative `(url tree, router state)` pair and runs every
//! navigation through the same pipeline:
//!
//! 1. recognize (redirects + matching) and emit `RoutesRecognized`
//! 2. diff against the current state and run guards
//! 3. run resolvers for the routes being entered
//! 4. build the new router state, activate it and swap it in
//!
//! Each navigation gets an id from a monotonic counter. A navigation whose id is no longer
//! the newest is cancelled at the next stage boundary and can never commit, so of several
//! navigations issued back to back only the last one can win.
//!
//! ## Example
//!
//! ```rust,ignore
//! let router = Router::builder(table)
//!     .lookup(registry)
//!     .location(location.clone())
//!     .build();
//! router.slots().register_outlet(router.slots().root(), "primary", shell)?;
//!
//! assert!(router.navigate_to("/team/33").await?);
//! ```

use crate::activate::ActivateRoutes;
use crate::commands::{Command, create_url_tree};
use crate::preactivation::{PreActivation, check_guards, resolve_data};
use crate::recognize::DefaultRecognizer;
use crate::state::create_router_state;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;
use waypost_core::config::{Route, RouteTable, RouterConfig};
use waypost_core::context::MountContext;
use waypost_core::error::{ConfigError, NavigationError, UrlParseError};
use waypost_core::event::{RouterEvent, RouterEvents};
use waypost_core::guard::{Lookup, Registry};
use waypost_core::location::{Location, MemoryLocation};
use waypost_core::options::RouterOptions;
use waypost_core::recognizer::Recognizer;
use waypost_core::reuse::RouteReuseStrategy;
use waypost_core::route::{ActivatedRoute, RouterState};
use waypost_core::serializer::{DefaultUrlSerializer, UrlSerializer};
use waypost_core::slot::SlotRegistry;
use waypost_core::snapshot::RouterStateSnapshot;
use waypost_core::url_tree::{Params, UrlTree, contains_tree};

/// Turns a navigation failure into a resolved value, or into a different error.
pub type ErrorHandler = Arc<dyn Fn(&NavigationError) -> Result<bool, NavigationError> + Send + Sync>;

/// Options of a single navigation.
#[derive(Debug, Clone, Default)]
pub struct NavigationExtras {
    /// Route that relative commands start from. Commands apply from the root without it.
    pub relative_to: Option<ActivatedRoute>,
    pub query_params: Params,
    pub fragment: Option<String>,
    /// Keep the current query params instead of `query_params`.
    pub preserve_query_params: bool,
    /// Keep the current fragment instead of `fragment`.
    pub preserve_fragment: bool,
    /// Commit without touching the location.
    pub skip_location_change: bool,
    /// Replace the current history entry instead of pushing one.
    pub replace_url: bool,
}

impl NavigationExtras {
    pub fn relative_to(route: ActivatedRoute) -> Self {
        Self {
            relative_to: Some(route),
            ..Self::default()
        }
    }
}

enum Outcome {
    Committed { url_after_redirects: String },
    Superseded,
    Denied,
}

/// The committed pair. Swapped as a whole.
struct Current {
    url_tree: UrlTree,
    url: String,
    state: RouterState,
}

struct RouterInner {
    options: RouterOptions,
    table: RwLock<Arc<RouteTable>>,
    serializer: Arc<dyn UrlSerializer>,
    recognizer: Arc<dyn Recognizer>,
    lookup: Arc<dyn Lookup>,
    location: Arc<dyn Location>,
    slots: SlotRegistry,
    context: Arc<MountContext>,
    reuse: Arc<dyn RouteReuseStrategy>,
    error_handler: Option<ErrorHandler>,
    navigation_id: AtomicU64,
    current: RwLock<Arc<Current>>,
    commit_lock: Mutex<()>,
    events: broadcast::Sender<RouterEvent>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the navigation engine. Clones share the same router.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

pub struct RouterBuilder {
    table: RouteTable,
    options: RouterOptions,
    lookup: Option<Arc<dyn Lookup>>,
    location: Option<Arc<dyn Location>>,
    slots: Option<SlotRegistry>,
    context: MountContext,
    reuse: Option<Arc<dyn RouteReuseStrategy>>,
    serializer: Option<Arc<dyn UrlSerializer>>,
    recognizer: Option<Arc<dyn Recognizer>>,
    error_handler: Option<ErrorHandler>,
}

impl RouterBuilder {
    pub fn options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn lookup(mut self, lookup: impl Lookup + 'static) -> Self {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    pub fn location(mut self, location: Arc<dyn Location>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn slots(mut self, slots: SlotRegistry) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Resources handed to every mounted component.
    pub fn context(mut self, context: MountContext) -> Self {
        self.context = context;
        self
    }

    /// Overrides the strategy selected by `RouterOptions::route_reuse`.
    pub fn reuse_strategy(mut self, strategy: Arc<dyn RouteReuseStrategy>) -> Self {
        self.reuse = Some(strategy);
        self
    }

    pub fn serializer(mut self, serializer: impl UrlSerializer) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn recognizer(mut self, recognizer: impl Recognizer + 'static) -> Self {
        self.recognizer = Some(Arc::new(recognizer));
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&NavigationError) -> Result<bool, NavigationError> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Router {
        let reuse = self
            .reuse
            .unwrap_or_else(|| self.options.route_reuse.strategy());
        let (events, _) = broadcast::channel(self.options.event_capacity.max(1));
        let current = Current {
            url_tree: UrlTree::empty(),
            url: "/".to_string(),
            state: RouterState::empty(),
        };

        tracing::debug!(
            routes = self.table.routes().len(),
            generation = self.table.generation(),
            ?reuse,
            "router built"
        );

        Router {
            inner: Arc::new(RouterInner {
                options: self.options,
                table: RwLock::new(Arc::new(self.table)),
                serializer: self
                    .serializer
                    .unwrap_or_else(|| Arc::new(DefaultUrlSerializer)),
                recognizer: self
                    .recognizer
                    .unwrap_or_else(|| Arc::new(DefaultRecognizer)),
                lookup: self.lookup.unwrap_or_else(|| Arc::new(Registry::new())),
                location: self
                    .location
                    .unwrap_or_else(|| Arc::new(MemoryLocation::default())),
                slots: self.slots.unwrap_or_default(),
                context: Arc::new(self.context),
                reuse,
                error_handler: self.error_handler,
                navigation_id: AtomicU64::new(0),
                current: RwLock::new(Arc::new(current)),
                commit_lock: Mutex::new(()),
                events,
                listener: Mutex::new(None),
            }),
        }
    }
}

impl Router {
    pub fn builder(table: RouteTable) -> RouterBuilder {
        RouterBuilder {
            table,
            options: RouterOptions::default(),
            lookup: None,
            location: None,
            slots: None,
            context: MountContext::new(),
            reuse: None,
            serializer: None,
            recognizer: None,
            error_handler: None,
        }
    }

    /// A builder with the table and options of a loaded configuration.
    pub fn from_config(config: &RouterConfig) -> Result<RouterBuilder, ConfigError> {
        Ok(Self::builder(config.table()?).options(config.options.clone()))
    }

    pub fn navigate_to(&self, url: &str) -> NavigationHandle {
        self.navigate_by_url(url, NavigationExtras::default())
    }

    /// Navigate to an absolute URL. Only the location options of `extras` apply.
    pub fn navigate_by_url(&self, url: &str, extras: NavigationExtras) -> NavigationHandle {
        match self.inner.serializer.parse(url) {
            Ok(tree) => self.navigate_by_tree(tree, extras),
            Err(e) => self.inner.reject(url.to_string(), e.into()),
        }
    }

    pub fn navigate_by_tree(&self, tree: UrlTree, extras: NavigationExtras) -> NavigationHandle {
        self.inner.schedule(tree, extras)
    }

    pub fn navigate_by_commands(&self, commands: &[Command], extras: NavigationExtras) -> NavigationHandle {
        match self.create_url_tree(commands, &extras) {
            Ok(tree) => self.navigate_by_tree(tree, extras),
            Err(e) => self.inner.reject(format!("{:?}", commands), e),
        }
    }

    /// Apply `commands` to the current url tree.
    pub fn create_url_tree(&self, commands: &[Command], extras: &NavigationExtras) -> Result<UrlTree, NavigationError> {
        let current = self.inner.current();
        let query_params = if extras.preserve_query_params {
            current.url_tree.query_params.clone()
        } else {
            extras.query_params.clone()
        };
        let fragment = if extras.preserve_fragment {
            current.url_tree.fragment.clone()
        } else {
            extras.fragment.clone()
        };
        let relative_to = extras.relative_to.as_ref().map(|r| r.snapshot());
        create_url_tree(
            relative_to.as_deref(),
            &current.url_tree,
            commands,
            query_params,
            fragment,
        )
    }

    pub fn url(&self) -> String {
        self.inner.current().url.clone()
    }

    pub fn url_tree(&self) -> UrlTree {
        self.inner.current().url_tree.clone()
    }

    pub fn state(&self) -> RouterState {
        self.inner.current().state.clone()
    }

    pub fn snapshot(&self) -> Arc<RouterStateSnapshot> {
        self.inner.current().state.snapshot.clone()
    }

    /// The committed url and state, read together.
    pub fn url_and_state(&self) -> (String, RouterState) {
        let current = self.inner.current();
        (current.url.clone(), current.state.clone())
    }

    pub fn events(&self) -> RouterEvents {
        RouterEvents::new(self.subscribe())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.inner.events.subscribe()
    }

    pub fn parse_url(&self, url: &str) -> Result<UrlTree, UrlParseError> {
        self.inner.serializer.parse(url)
    }

    pub fn serialize_url(&self, tree: &UrlTree) -> String {
        self.inner.serializer.serialize(tree)
    }

    /// Whether `tree` is contained in the current url tree.
    pub fn is_active(&self, tree: &UrlTree, exact: bool) -> bool {
        contains_tree(&self.inner.current().url_tree, tree, exact)
    }

    pub fn is_active_url(&self, url: &str, exact: bool) -> Result<bool, UrlParseError> {
        Ok(self.is_active(&self.parse_url(url)?, exact))
    }

    pub fn route_table(&self) -> Arc<RouteTable> {
        self.inner.table.read().clone()
    }

    /// Validate and swap in a new route table. Navigations already past recognition keep
    /// the table they started with.
    pub fn reset_route_table(&self, routes: &[Route]) -> Result<(), ConfigError> {
        let table = RouteTable::compile(routes)?;
        tracing::info!(generation = table.generation(), routes = table.routes().len(), "route table reset");
        *self.inner.table.write() = Arc::new(table);
        Ok(())
    }

    pub fn slots(&self) -> &SlotRegistry {
        &self.inner.slots
    }

    pub fn options(&self) -> &RouterOptions {
        &self.inner.options
    }

    /// Id of the newest navigation, 0 before the first one.
    pub fn navigation_id(&self) -> u64 {
        self.inner.navigation_id.load(Ordering::SeqCst)
    }

    /// Navigate whenever the location changes underneath the router. Idempotent.
    pub fn set_up_location_change_listener(&self) {
        let mut listener = self.inner.listener.lock();
        if listener.is_some() {
            return;
        }
        let mut changes = self.inner.location.subscribe();
        let weak: Weak<RouterInner> = Arc::downgrade(&self.inner);

        let task = async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "location listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let tree = match inner.serializer.parse(&change.url) {
                    Ok(tree) => tree,
                    Err(e) => {
                        tracing::warn!(url = %change.url, error = %e, "ignoring unparsable location change");
                        continue;
                    }
                };
                if inner.serializer.serialize(&tree) == inner.current().url {
                    continue;
                }
                tracing::debug!(url = %change.url, pop = change.pop, "location changed");
                let extras = NavigationExtras {
                    replace_url: true,
                    skip_location_change: change.pop,
                    ..NavigationExtras::default()
                };
                drop(inner.schedule(tree, extras));
            }
        };
        *listener = Some(tokio::spawn(task.instrument(tracing::debug_span!("location_listener"))));
    }

    /// Stop following location changes.
    pub fn dispose(&self) {
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
    }

    /// Start listening to the location and navigate to its current path.
    pub fn initial_navigation(&self) -> NavigationHandle {
        self.set_up_location_change_listener();
        let path = self.inner.location.path();
        self.navigate_by_url(
            &path,
            NavigationExtras {
                replace_url: true,
                ..NavigationExtras::default()
            },
        )
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("url", &self.url())
            .field("navigation_id", &self.navigation_id())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Drop for RouterInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

impl RouterInner {
    fn current(&self) -> Arc<Current> {
        self.current.read().clone()
    }

    fn is_stale(&self, id: u64) -> bool {
        self.navigation_id.load(Ordering::SeqCst) != id
    }

    fn emit(&self, event: RouterEvent) {
        if self.options.enable_tracing {
            tracing::info!(event = %event, "router event");
        }
        let _ = self.events.send(event);
    }

    /// A request that fails before it can be scheduled still takes an id, so it supersedes
    /// whatever navigation is in flight.
    fn reject(&self, url: String, error: NavigationError) -> NavigationHandle {
        let id = self.navigation_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(navigation.id = id, %url, %error, "navigation rejected");
        self.emit(RouterEvent::NavigationStart {
            id,
            url: url.clone(),
        });
        self.emit(RouterEvent::NavigationError {
            id,
            url,
            error: error.clone(),
        });
        let result = match &self.error_handler {
            Some(handler) => handler(&error),
            None => Err(error),
        };
        NavigationHandle {
            id,
            state: HandleState::Ready(Some(result)),
        }
    }

    fn schedule(self: &Arc<Self>, tree: UrlTree, extras: NavigationExtras) -> NavigationHandle {
        let id = self.navigation_id.fetch_add(1, Ordering::SeqCst) + 1;
        let url = self.serializer.serialize(&tree);
        self.emit(RouterEvent::NavigationStart {
            id,
            url: url.clone(),
        });

        let span = tracing::info_span!("navigation", navigation.id = id, navigation.url = %url);
        let inner = self.clone();
        let task = tokio::spawn(async move { inner.execute(id, url, tree, extras).await }.instrument(span));
        NavigationHandle {
            id,
            state: HandleState::Running(task),
        }
    }

    async fn execute(
        self: Arc<Self>,
        id: u64,
        url: String,
        tree: UrlTree,
        extras: NavigationExtras,
    ) -> Result<bool, NavigationError> {
        match self.run(id, &url, tree, &extras).await {
            Ok(Outcome::Committed { url_after_redirects }) => {
                tracing::debug!(%url_after_redirects, "navigation committed");
                self.emit(RouterEvent::NavigationEnd {
                    id,
                    url,
                    url_after_redirects,
                });
                Ok(true)
            }
            Ok(Outcome::Superseded) => {
                let newer = self.navigation_id.load(Ordering::SeqCst);
                tracing::info!(newer, "navigation superseded");
                self.emit(RouterEvent::NavigationCancel {
                    id,
                    url,
                    reason: format!("navigation id {} is not equal to the current navigation id {}", id, newer),
                });
                Ok(false)
            }
            Ok(Outcome::Denied) => {
                tracing::info!("navigation denied by a guard");
                self.reset_location();
                self.emit(RouterEvent::NavigationCancel {
                    id,
                    url,
                    reason: "a guard denied the navigation".to_string(),
                });
                Ok(false)
            }
            Err(error) => {
                if error.is_configuration() {
                    tracing::error!(%error, "navigation failed");
                } else {
                    tracing::warn!(%error, "navigation failed");
                }
                self.reset_location();
                self.emit(RouterEvent::NavigationError {
                    id,
                    url,
                    error: error.clone(),
                });
                match &self.error_handler {
                    Some(handler) => handler(&error),
                    None => Err(error),
                }
            }
        }
    }

    /// Point the location back at the committed url if it drifted.
    fn reset_location(&self) {
        let url = self.current().url.clone();
        if !self.location.is_current_path_equal_to(&url) {
            self.location.replace_state(&url);
        }
    }

    async fn run(
        &self,
        id: u64,
        url: &str,
        tree: UrlTree,
        extras: &NavigationExtras,
    ) -> Result<Outcome, NavigationError> {
        if self.is_stale(id) {
            return Ok(Outcome::Superseded);
        }

        let table = self.table.read().clone();
        let recognized = self
            .recognizer
            .recognize(&tree, &table, self.options.params_inheritance)
            .await?;
        let url_after_redirects = self.serializer.serialize(&recognized.applied_url);
        let mut snapshot = RouterStateSnapshot::new(url_after_redirects.clone(), recognized.root);
        tracing::debug!(%url_after_redirects, "routes recognized");
        self.emit(RouterEvent::RoutesRecognized {
            id,
            url: url.to_string(),
            url_after_redirects,
            state: Arc::new(snapshot.clone()),
        });

        if self.is_stale(id) {
            return Ok(Outcome::Superseded);
        }

        let current = self.current();
        let checks = PreActivation::new(&current.state.snapshot, &self.slots, self.reuse.as_ref())
            .traverse(&mut snapshot.root);
        drop(current);
        tracing::debug!(checks = checks.len(), "pre-activation diff");

        let state = Arc::new(snapshot);
        let allowed = check_guards(&checks, &state, self.lookup.as_ref(), self.options.guard_execution).await?;
        if self.is_stale(id) {
            return Ok(Outcome::Superseded);
        }
        if !allowed {
            return Ok(Outcome::Denied);
        }

        let mut snapshot = Arc::unwrap_or_clone(state);
        resolve_data(&checks, &mut snapshot, self.lookup.as_ref(), self.options.params_inheritance).await?;

        self.commit(id, recognized.applied_url, Arc::new(snapshot), extras)
    }

    fn commit(
        &self,
        id: u64,
        url_tree: UrlTree,
        snapshot: Arc<RouterStateSnapshot>,
        extras: &NavigationExtras,
    ) -> Result<Outcome, NavigationError> {
        let _commit = self.commit_lock.lock();
        if self.is_stale(id) {
            return Ok(Outcome::Superseded);
        }

        let prev = self.current();
        let stash: Vec<_> = prev
            .state
            .routes()
            .into_iter()
            .map(|route| (route.clone(), route.snapshot()))
            .collect();

        let future = create_router_state(snapshot, &prev.state, self.reuse.as_ref());
        let activation = ActivateRoutes::new(&future, &prev.state, &self.slots, &self.context);
        if let Err(e) = activation.activate() {
            for (route, snapshot) in stash {
                route.set_future_snapshot(snapshot);
                route.advance();
            }
            prev.state.shared.publish(&prev.state.snapshot);
            if let Err(restore) = activation.restore() {
                tracing::error!(error = %restore, "could not remount the committed routes");
            }
            return Err(e.into());
        }

        let url = self.serializer.serialize(&url_tree);
        *self.current.write() = Arc::new(Current {
            url_tree,
            url: url.clone(),
            state: future,
        });

        if !extras.skip_location_change {
            if extras.replace_url || self.location.is_current_path_equal_to(&url) {
                self.location.replace_state(&url);
            } else {
                self.location.go(&url);
            }
        }
        Ok(Outcome::Committed {
            url_after_redirects: url,
        })
    }
}

enum HandleState {
    Ready(Option<Result<bool, NavigationError>>),
    Running(JoinHandle<Result<bool, NavigationError>>),
}

/// Completion of a scheduled navigation.
///
/// Resolves to `Ok(true)` when the navigation committed and `Ok(false)` when it was
/// cancelled or denied. Dropping the handle does not stop the navigation.
pub struct NavigationHandle {
    id: u64,
    state: HandleState,
}

impl NavigationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for NavigationHandle {
    type Output = Result<bool, NavigationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(NavigationError::Aborted))),
            HandleState::Running(task) => Pin::new(task).poll(cx).map(|joined| {
                joined.unwrap_or_else(|e| {
                    tracing::error!(error = %e, "navigation task did not complete");
                    Err(NavigationError::Aborted)
                })
            }),
        }
    }
}

impl fmt::Debug for NavigationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            HandleState::Ready(_) => "ready",
            HandleState::Running(_) => "running",
        };
        f.debug_struct("NavigationHandle")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::event::EventSource;

    fn router() -> Router {
        let table = RouteTable::compile(&[Route::new("").full_match().redirect_to("home")]).unwrap();
        Router::builder(table).build()
    }

    #[tokio::test]
    async fn unparsable_urls_take_an_id_and_report_an_error() {
        let router = router();
        let mut events = router.events();
        let handle = router.navigate_to("/a(b");
        assert_eq!(handle.id(), 1);
        assert!(matches!(handle.await, Err(NavigationError::Url(_))));
        let events = events.drain();
        assert_eq!(
            events.iter().map(|e| e.kind()).collect::<Vec<_>>(),
            vec!["start", "error"]
        );
        assert_eq!(events[1].url(), "/a(b");
        assert_eq!(router.navigation_id(), 1);
        assert_eq!(router.url(), "/");
    }

    #[tokio::test]
    async fn rejected_request_supersedes_the_navigation_in_flight() {
        let router = router();
        let pending = router.navigate_to("/home");
        let rejected = router.navigate_to("/a(b");
        assert_eq!((pending.id(), rejected.id()), (1, 2));
        assert!(rejected.await.is_err());
        assert!(!pending.await.unwrap());
        assert_eq!(router.url(), "/");
    }

    #[tokio::test]
    async fn unmatched_urls_fail_and_report_an_error_event() {
        let router = router();
        let mut events = router.events();
        let err = router.navigate_to("/nowhere").await.unwrap_err();
        assert!(matches!(err, NavigationError::NoMatch { .. }));

        let start = events.next_event().await.unwrap();
        assert_eq!(start.kind(), "start");
        let error = events.next_event().await.unwrap();
        assert_eq!(error.kind(), "error");
        assert_eq!(error.url(), "/nowhere");
        assert_eq!(router.url(), "/");
    }

    #[tokio::test]
    async fn error_handler_can_swallow_failures() {
        let table = RouteTable::compile(&[Route::new("home").component("HomeCmp")]).unwrap();
        let router = Router::builder(table).error_handler(|_| Ok(false)).build();
        assert!(!router.navigate_to("/nowhere").await.unwrap());
    }
}
