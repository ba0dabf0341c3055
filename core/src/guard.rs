//! # Guards and resolvers
//!
//! Route-table entries name their guards and resolvers by token. At navigation time the
//! pipeline asks a [`Lookup`] for the instance behind each token and invokes it through
//! one canonical form: [`Guard::check`] or [`Resolver::resolve`].
//!
//! Both return an [`Eventual`], which normalizes immediate values, futures and streams
//! (first item wins) into a single awaited `anyhow::Result`.

use crate::outlet::ComponentHandle;
use crate::snapshot::{RouteSnapshot, RouterStateSnapshot};
use anyhow::anyhow;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A value that may be available now or later.
pub enum Eventual<T> {
    Now(T),
    Later(BoxFuture<'static, anyhow::Result<T>>),
    /// Only the first item is taken; the stream is dropped afterwards.
    Stream(BoxStream<'static, anyhow::Result<T>>),
}

impl<T: Send + 'static> Eventual<T> {
    pub fn now(value: T) -> Self {
        Self::Now(value)
    }

    pub fn later<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Later(future.boxed())
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<T>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    pub fn fail(error: anyhow::Error) -> Self {
        Self::Later(futures_util::future::ready(Err(error)).boxed())
    }

    pub async fn resolve(self) -> anyhow::Result<T> {
        match self {
            Self::Now(value) => Ok(value),
            Self::Later(future) => future.await,
            Self::Stream(mut stream) => match stream.next().await {
                Some(item) => item,
                None => Err(anyhow!("stream completed without producing a value")),
            },
        }
    }
}

impl<T> From<T> for Eventual<T> {
    fn from(value: T) -> Self {
        Self::Now(value)
    }
}

impl<T> fmt::Debug for Eventual<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Now(_) => "Now",
            Self::Later(_) => "Later",
            Self::Stream(_) => "Stream",
        };
        write!(f, "Eventual::{}", kind)
    }
}

/// What a guard is asked to approve.
#[derive(Debug, Clone)]
pub enum GuardRequest {
    /// Entering `route`.
    Activate {
        route: Arc<RouteSnapshot>,
        state: Arc<RouterStateSnapshot>,
    },
    /// Entering `child`, asked of the ancestor `route` that declared the guard.
    ActivateChild {
        route: Arc<RouteSnapshot>,
        child: Arc<RouteSnapshot>,
        state: Arc<RouterStateSnapshot>,
    },
    /// Leaving `route`, currently rendered by `component`.
    Deactivate {
        component: Option<ComponentHandle>,
        route: Arc<RouteSnapshot>,
        state: Arc<RouterStateSnapshot>,
    },
}

impl GuardRequest {
    /// The route that declared the guard.
    pub fn route(&self) -> &Arc<RouteSnapshot> {
        match self {
            Self::Activate { route, .. }
            | Self::ActivateChild { route, .. }
            | Self::Deactivate { route, .. } => route,
        }
    }

    /// The snapshot of the navigation target.
    pub fn state(&self) -> &Arc<RouterStateSnapshot> {
        match self {
            Self::Activate { state, .. }
            | Self::ActivateChild { state, .. }
            | Self::Deactivate { state, .. } => state,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Activate { .. } => "can-activate",
            Self::ActivateChild { .. } => "can-activate-child",
            Self::Deactivate { .. } => "can-deactivate",
        }
    }
}

/// An authorization predicate. Anything but an eventual `true` denies the navigation;
/// an error fails it.
pub trait Guard: Send + Sync {
    fn check(&self, request: &GuardRequest) -> Eventual<bool>;
}

impl<F> Guard for F
where
    F: Fn(&GuardRequest) -> Eventual<bool> + Send + Sync,
{
    fn check(&self, request: &GuardRequest) -> Eventual<bool> {
        self(request)
    }
}

/// A data prefetch hook. Its value is stored under the key the route table gives it.
pub trait Resolver: Send + Sync {
    fn resolve(
        &self,
        route: &Arc<RouteSnapshot>,
        state: &Arc<RouterStateSnapshot>,
    ) -> Eventual<serde_json::Value>;
}

impl<F> Resolver for F
where
    F: Fn(&Arc<RouteSnapshot>, &Arc<RouterStateSnapshot>) -> Eventual<serde_json::Value>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        route: &Arc<RouteSnapshot>,
        state: &Arc<RouterStateSnapshot>,
    ) -> Eventual<serde_json::Value> {
        self(route, state)
    }
}

/// Finds the guard or resolver instance behind a token.
pub trait Lookup: Send + Sync {
    fn guard(&self, token: &str) -> Option<Arc<dyn Guard>>;

    fn resolver(&self, token: &str) -> Option<Arc<dyn Resolver>>;
}

/// A `HashMap`-backed [`Lookup`].
#[derive(Clone, Default)]
pub struct Registry {
    guards: HashMap<String, Arc<dyn Guard>>,
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_guard(&mut self, token: impl Into<String>, guard: impl Guard + 'static) {
        self.guards.insert(token.into(), Arc::new(guard));
    }

    pub fn register_resolver(
        &mut self,
        token: impl Into<String>,
        resolver: impl Resolver + 'static,
    ) {
        self.resolvers.insert(token.into(), Arc::new(resolver));
    }

    pub fn with_guard(mut self, token: impl Into<String>, guard: impl Guard + 'static) -> Self {
        self.register_guard(token, guard);
        self
    }

    pub fn with_resolver(
        mut self,
        token: impl Into<String>,
        resolver: impl Resolver + 'static,
    ) -> Self {
        self.register_resolver(token, resolver);
        self
    }
}

impl Lookup for Registry {
    fn guard(&self, token: &str) -> Option<Arc<dyn Guard>> {
        self.guards.get(token).cloned()
    }

    fn resolver(&self, token: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.get(token).cloned()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut guards: Vec<_> = self.guards.keys().collect();
        let mut resolvers: Vec<_> = self.resolvers.keys().collect();
        guards.sort();
        resolvers.sort();
        f.debug_struct("Registry")
            .field("guards", &guards)
            .field("resolvers", &resolvers)
            .finish()
    }
}
