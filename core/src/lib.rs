//! Data model and collaborator contracts for the Waypost navigation engine.
//!
//! Nothing in this crate navigates. It defines what a navigation works on (URL trees,
//! route tables, snapshots, live routes, slot registries) and the seams the pipeline calls
//! out through (serializer, recognizer, guards and resolvers, outlets, location).

pub mod cell;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod guard;
pub mod location;
pub mod options;
pub mod outlet;
pub mod recognizer;
pub mod reuse;
pub mod route;
pub mod serializer;
pub mod slot;
pub mod snapshot;
pub mod tree;
pub mod url_tree;

pub use cell::ObservableCell;
pub use config::{Data, PathMatch, Route, RouteConfig, RouteConfigId, RouteTable, RouterConfig};
pub use context::MountContext;
pub use error::{ConfigError, NavigationError, SlotError, UrlParseError};
pub use event::{EventSource, RouterEvent, RouterEvents};
pub use guard::{Eventual, Guard, GuardRequest, Lookup, Registry, Resolver};
pub use location::{Location, LocationChange, LocationOp, MemoryLocation};
pub use options::{GuardExecution, ParamsInheritance, RouteReuse, RouterOptions};
pub use outlet::{ComponentHandle, MountRequest, Outlet};
pub use recognizer::{Recognized, Recognizer};
pub use reuse::{ConfigAndParams, ConfigIdentity, RouteReuseStrategy};
pub use route::{ActivatedRoute, RouterState, SharedCells};
pub use serializer::{DefaultUrlSerializer, UrlSerializer};
pub use slot::{Occupancy, RegistryId, SlotRegistry, SlotScope};
pub use snapshot::{Inherited, RouteSnapshot, RouterStateSnapshot, inherited_params_data_resolve};
pub use tree::{NodePath, TreeNode};
pub use url_tree::{GroupPath, PRIMARY_OUTLET, Params, UrlSegment, UrlSegmentGroup, UrlTree};
