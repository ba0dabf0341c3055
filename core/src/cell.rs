use tokio::sync::watch;

/// A current value plus change notification.
///
/// Subscribers are notified only when a published value differs from the current one.
#[derive(Debug)]
pub struct ObservableCell<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + PartialEq> ObservableCell<T> {
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Inspect the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Replace the value if it differs. Returns whether subscribers were notified.
    pub fn publish(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + PartialEq + Default> Default for ObservableCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_only_changes() {
        let cell = ObservableCell::new(1);
        let mut rx = cell.subscribe();

        assert!(!cell.publish(1));
        assert!(!rx.has_changed().unwrap());

        assert!(cell.publish(2));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
        assert_eq!(cell.get(), 2);
    }
}
