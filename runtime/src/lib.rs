//! Navigation pipeline for Waypost.
//!
//! [`Router`] drives every navigation: redirects and recognition ([`recognize`]), the
//! guard diff and resolvers ([`preactivation`]), the live state build ([`state`]) and
//! slot activation ([`activate`]).

pub mod activate;
pub mod commands;
pub mod preactivation;
pub mod recognize;
pub mod redirects;
pub mod router;
pub mod state;

pub mod prelude {
    pub use crate::commands::{Command, create_url_tree};
    pub use crate::router::{NavigationExtras, NavigationHandle, Router, RouterBuilder};
}

pub use activate::ActivateRoutes;
pub use commands::{Command, create_url_tree};
pub use preactivation::{Check, PreActivation, check_guards, resolve_data};
pub use recognize::{DefaultRecognizer, recognize};
pub use redirects::apply_redirects;
pub use router::{ErrorHandler, NavigationExtras, NavigationHandle, Router, RouterBuilder};
pub use state::create_router_state;
