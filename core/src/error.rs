use std::sync::Arc;
use thiserror::Error;

/// Malformed URL text handed to the [`UrlSerializer`](crate::serializer::UrlSerializer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse url '{url}' at offset {offset}: {reason}")]
pub struct UrlParseError {
    pub url: String,
    pub offset: usize,
    pub reason: String,
}

/// A route-table entry that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration of route '{path}': path cannot start with a slash")]
    LeadingSlash { path: String },
    #[error("invalid configuration of route '{path}': redirect-to and {other} cannot be used together")]
    RedirectConflict { path: String, other: &'static str },
    #[error(
        "invalid configuration of route '{path}': an empty path with redirect-to needs path-match = \"full\""
    )]
    EmptyPrefixRedirect { path: String },
    #[error(
        "invalid configuration of route '{path}': one of component, redirect-to, children must be provided"
    )]
    Incomplete { path: String },
    #[error("cannot read router configuration: {0}")]
    Read(String),
    #[error("cannot parse router configuration: {0}")]
    Parse(String),
}

/// Errors raised by the slot registry while mounting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("cannot find the slot '{slot}' to load '{component}'")]
    MissingSlot { slot: String, component: String },
    #[error("slot registry {0} no longer exists")]
    UnknownRegistry(String),
    #[error("outlet for slot '{slot}' failed to mount '{component}': {reason}")]
    MountFailed {
        slot: String,
        component: String,
        reason: String,
    },
}

/// Failure of a navigation pipeline.
///
/// Stale navigations and guard denials are not represented here; they resolve the
/// navigation to `false`.
#[derive(Error, Debug, Clone)]
pub enum NavigationError {
    #[error(transparent)]
    Url(#[from] UrlParseError),
    #[error("cannot match any routes for url segment '{url}'")]
    NoMatch { url: String },
    #[error("redirect failed: {0}")]
    Redirect(String),
    #[error("no guard or resolver registered for token '{0}'")]
    MissingProvider(String),
    #[error("guard '{token}' failed: {cause}")]
    Guard {
        token: String,
        cause: Arc<anyhow::Error>,
    },
    #[error("resolver '{key}' ({token}) failed: {cause}")]
    Resolver {
        key: String,
        token: String,
        cause: Arc<anyhow::Error>,
    },
    #[error("cannot apply navigation commands: {0}")]
    InvalidCommands(String),
    #[error("route recognition failed: {0}")]
    Recognizer(String),
    #[error(transparent)]
    Configuration(#[from] SlotError),
    #[error("navigation task was aborted before completing")]
    Aborted,
}

impl NavigationError {
    pub fn guard(token: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Guard {
            token: token.into(),
            cause: Arc::new(cause),
        }
    }

    pub fn resolver(key: impl Into<String>, token: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Resolver {
            key: key.into(),
            token: token.into(),
            cause: Arc::new(cause),
        }
    }

    /// Configuration errors point at a route-table/UI mismatch and are never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
