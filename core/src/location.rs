use parking_lot::Mutex;
use tokio::sync::broadcast;

/// A location change the router did not initiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationChange {
    pub url: String,
    /// Back/forward navigation, as opposed to an external push.
    pub pop: bool,
}

/// The history collaborator.
///
/// `go` and `replace_state` are called by the router and must not be echoed back through
/// [`Location::subscribe`].
pub trait Location: Send + Sync {
    fn path(&self) -> String;

    fn go(&self, path: &str);

    fn replace_state(&self, path: &str);

    fn is_current_path_equal_to(&self, path: &str) -> bool {
        normalize(&self.path()) == normalize(path)
    }

    fn subscribe(&self) -> broadcast::Receiver<LocationChange>;
}

fn normalize(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationOp {
    Go(String),
    Replace(String),
}

#[derive(Debug)]
struct History {
    entries: Vec<String>,
    index: usize,
    ops: Vec<LocationOp>,
}

/// In-memory history for headless use and tests.
#[derive(Debug)]
pub struct MemoryLocation {
    history: Mutex<History>,
    changes: broadcast::Sender<LocationChange>,
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryLocation {
    pub fn new(initial: impl Into<String>) -> Self {
        let (changes, _rx) = broadcast::channel(32);
        Self {
            history: Mutex::new(History {
                entries: vec![initial.into()],
                index: 0,
                ops: Vec::new(),
            }),
            changes,
        }
    }

    /// Step back one entry and notify listeners, like a browser back button.
    pub fn back(&self) -> bool {
        let url = {
            let mut history = self.history.lock();
            if history.index == 0 {
                return false;
            }
            history.index -= 1;
            history.entries[history.index].clone()
        };
        let _ = self.changes.send(LocationChange { url, pop: true });
        true
    }

    pub fn forward(&self) -> bool {
        let url = {
            let mut history = self.history.lock();
            if history.index + 1 >= history.entries.len() {
                return false;
            }
            history.index += 1;
            history.entries[history.index].clone()
        };
        let _ = self.changes.send(LocationChange { url, pop: true });
        true
    }

    /// An external push, e.g. the user editing the address bar.
    pub fn simulate_url_change(&self, url: impl Into<String>) {
        let url = url.into();
        {
            let mut history = self.history.lock();
            let next = history.index + 1;
            history.entries.truncate(next);
            history.entries.push(url.clone());
            history.index = next;
        }
        let _ = self.changes.send(LocationChange { url, pop: false });
    }

    pub fn entries(&self) -> Vec<String> {
        self.history.lock().entries.clone()
    }

    /// `go`/`replace_state` calls made so far, in order.
    pub fn ops(&self) -> Vec<LocationOp> {
        self.history.lock().ops.clone()
    }
}

impl Location for MemoryLocation {
    fn path(&self) -> String {
        let history = self.history.lock();
        history.entries[history.index].clone()
    }

    fn go(&self, path: &str) {
        let mut history = self.history.lock();
        let next = history.index + 1;
        history.entries.truncate(next);
        history.entries.push(path.to_string());
        history.index = next;
        history.ops.push(LocationOp::Go(path.to_string()));
    }

    fn replace_state(&self, path: &str) {
        let mut history = self.history.lock();
        let index = history.index;
        history.entries[index] = path.to_string();
        history.ops.push(LocationOp::Replace(path.to_string()));
    }

    fn subscribe(&self) -> broadcast::Receiver<LocationChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn back_and_forward_emit_pops() {
        let location = MemoryLocation::new("/");
        let mut rx = location.subscribe();

        location.go("/team/1");
        location.go("/team/2");
        location.replace_state("/team/3");
        assert_eq!(location.entries(), vec!["/", "/team/1", "/team/3"]);

        assert!(location.back());
        assert_eq!(location.path(), "/team/1");
        let change = rx.recv().await.unwrap();
        assert_eq!(
            change,
            LocationChange {
                url: "/team/1".into(),
                pop: true
            }
        );

        assert!(location.forward());
        assert!(!location.forward());
        assert!(location.is_current_path_equal_to("/team/3/"));
    }
}
