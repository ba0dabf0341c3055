//! # Waypost
//!
//! A navigation engine for tree-structured UIs. A URL is parsed into a [`UrlTree`],
//! matched against a [`RouteTable`] and turned into a tree of live routes whose
//! components are mounted into named slots.
//!
//! ```rust,ignore
//! use waypost::prelude::*;
//!
//! let table = RouteTable::compile(&[
//!     Route::new("team/:id")
//!         .component("TeamCmp")
//!         .children(vec![Route::new("user/:name").component("UserCmp")]),
//! ])?;
//! let router = Router::builder(table).build();
//! router.slots().register_outlet(router.slots().root(), "primary", outlet)?;
//! router.navigate_to("/team/33/user/11").await?;
//! ```

// Re-export core modules and types
pub use waypost_core::*;
pub use waypost_runtime::{activate, commands, preactivation, recognize, redirects, router, state};

pub use waypost_runtime::{
    Command, DefaultRecognizer, ErrorHandler, NavigationExtras, NavigationHandle, Router,
    RouterBuilder, apply_redirects, create_url_tree,
};

pub mod prelude {
    pub use crate::commands::Command;
    pub use crate::config::{Route, RouteTable, RouterConfig};
    pub use crate::context::MountContext;
    pub use crate::error::{NavigationError, SlotError};
    pub use crate::event::{EventSource, RouterEvent, RouterEvents};
    pub use crate::guard::{Eventual, Guard, GuardRequest, Lookup, Registry, Resolver};
    pub use crate::location::{Location, MemoryLocation};
    pub use crate::options::{GuardExecution, ParamsInheritance, RouteReuse, RouterOptions};
    pub use crate::outlet::{ComponentHandle, MountRequest, Outlet};
    pub use crate::route::{ActivatedRoute, RouterState};
    pub use crate::router::{NavigationExtras, NavigationHandle, Router};
    pub use crate::serializer::{DefaultUrlSerializer, UrlSerializer};
    pub use crate::url_tree::{Params, UrlTree};

    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
}
