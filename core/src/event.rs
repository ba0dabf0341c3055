use crate::error::NavigationError;
use crate::snapshot::RouterStateSnapshot;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Lifecycle notifications of a navigation, in a fixed vocabulary.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    NavigationStart {
        id: u64,
        url: String,
    },
    RoutesRecognized {
        id: u64,
        url: String,
        url_after_redirects: String,
        state: Arc<RouterStateSnapshot>,
    },
    NavigationEnd {
        id: u64,
        url: String,
        url_after_redirects: String,
    },
    NavigationCancel {
        id: u64,
        url: String,
        reason: String,
    },
    NavigationError {
        id: u64,
        url: String,
        error: NavigationError,
    },
}

impl RouterEvent {
    pub fn id(&self) -> u64 {
        match self {
            Self::NavigationStart { id, .. }
            | Self::RoutesRecognized { id, .. }
            | Self::NavigationEnd { id, .. }
            | Self::NavigationCancel { id, .. }
            | Self::NavigationError { id, .. } => *id,
        }
    }

    /// The URL the navigation was asked to reach.
    pub fn url(&self) -> &str {
        match self {
            Self::NavigationStart { url, .. }
            | Self::RoutesRecognized { url, .. }
            | Self::NavigationEnd { url, .. }
            | Self::NavigationCancel { url, .. }
            | Self::NavigationError { url, .. } => url,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NavigationStart { .. } => "start",
            Self::RoutesRecognized { .. } => "routes-recognized",
            Self::NavigationEnd { .. } => "end",
            Self::NavigationCancel { .. } => "cancel",
            Self::NavigationError { .. } => "error",
        }
    }

    /// Whether this event ends its navigation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NavigationEnd { .. } | Self::NavigationCancel { .. } | Self::NavigationError { .. }
        )
    }
}

impl fmt::Display for RouterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NavigationStart { id, url } => write!(f, "NavigationStart(id: {}, url: '{}')", id, url),
            Self::RoutesRecognized {
                id,
                url,
                url_after_redirects,
                ..
            } => write!(
                f,
                "RoutesRecognized(id: {}, url: '{}', urlAfterRedirects: '{}')",
                id, url, url_after_redirects
            ),
            Self::NavigationEnd {
                id,
                url,
                url_after_redirects,
            } => write!(
                f,
                "NavigationEnd(id: {}, url: '{}', urlAfterRedirects: '{}')",
                id, url, url_after_redirects
            ),
            Self::NavigationCancel { id, url, reason } => {
                write!(f, "NavigationCancel(id: {}, url: '{}', reason: {})", id, url, reason)
            }
            Self::NavigationError { id, url, error } => {
                write!(f, "NavigationError(id: {}, url: '{}', error: {})", id, url, error)
            }
        }
    }
}

/// A source of events.
#[async_trait]
pub trait EventSource<E>: Send + Sync {
    /// Returns the next event, or None if the source is closed.
    async fn next_event(&mut self) -> Option<E>;
}

/// Subscription to a router's event stream.
///
/// A subscriber that falls behind skips the events it missed and logs how many.
#[derive(Debug)]
pub struct RouterEvents {
    rx: broadcast::Receiver<RouterEvent>,
}

impl RouterEvents {
    pub fn new(rx: broadcast::Receiver<RouterEvent>) -> Self {
        Self { rx }
    }

    /// Events already buffered, without waiting.
    pub fn drain(&mut self) -> Vec<RouterEvent> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => out.push(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "router event subscriber lagged");
                }
                Err(_) => break,
            }
        }
        out
    }
}

#[async_trait]
impl EventSource<RouterEvent> for RouterEvents {
    async fn next_event(&mut self) -> Option<RouterEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "router event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_skips_lagged_events() {
        let (tx, rx) = broadcast::channel(2);
        let mut events = RouterEvents::new(rx);
        for id in 1..=3 {
            tx.send(RouterEvent::NavigationStart {
                id,
                url: format!("/n/{}", id),
            })
            .unwrap();
        }

        let first = events.next_event().await.unwrap();
        assert_eq!(first.id(), 2);
        assert_eq!(events.drain().len(), 1);

        drop(tx);
        assert!(events.next_event().await.is_none());
    }
}
