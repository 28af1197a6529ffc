use std::sync::Arc;

use futures::Stream;
use log::{debug, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{ListenerId, SharedPreferences};

const CHANNEL_CAPACITY: usize = 1000;

/// One notification from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChange {
    /// The named key was written or removed.
    Changed(String),
    /// The whole store was cleared.
    Cleared,
}

/// Process-wide fan-out of a store's change notifications.
///
/// Exactly one listener is registered on the store no matter how many preferences
/// subscribe; it is removed when the last clone of this handle is dropped.
#[derive(Clone)]
pub struct KeyChanges {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn SharedPreferences>,
    listener: ListenerId,
    sender: broadcast::Sender<KeyChange>,
}

impl KeyChanges {
    pub fn new(store: Arc<dyn SharedPreferences>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let tx = sender.clone();
        let listener = store.register_listener(Arc::new(move |key: Option<&str>| {
            let change = match key {
                Some(key) => KeyChange::Changed(key.to_string()),
                None => KeyChange::Cleared,
            };
            // no subscribers is fine
            let _ = tx.send(change);
        }));
        debug!("Registered key-change listener {:?}", listener);

        Self {
            inner: Arc::new(Inner {
                store,
                listener,
                sender,
            }),
        }
    }

    /// A raw receiver, for callers that need to see lag explicitly.
    pub fn subscribe(&self) -> broadcast::Receiver<KeyChange> {
        self.inner.sender.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Creates a stream of every change from this point on.
    ///
    /// A receiver that falls behind logs how many events it missed and keeps going.
    pub fn stream(&self) -> impl Stream<Item = KeyChange> + Send + 'static {
        let receiver = self.subscribe();

        futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(change) => return Some((change, receiver)),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Key-change stream lagged, skipped {} events", missed);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.store.unregister_listener(self.listener);
        debug!("Unregistered key-change listener {:?}", self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemPreferences;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_carries_keys_and_clear() {
        let store = Arc::new(MemPreferences::in_memory());
        let changes = KeyChanges::new(store.clone());
        let mut stream = Box::pin(changes.stream());

        let mut editor = store.edit();
        editor.put_string("a", "1");
        editor.apply();
        let mut editor = store.edit();
        editor.clear();
        editor.apply();

        assert_eq!(stream.next().await, Some(KeyChange::Changed("a".to_string())));
        assert_eq!(stream.next().await, Some(KeyChange::Cleared));
    }

    #[tokio::test]
    async fn test_single_listener_shared_by_all_subscribers() {
        let store = Arc::new(MemPreferences::in_memory());
        let changes = KeyChanges::new(store.clone());
        let mut first = Box::pin(changes.stream());
        let mut second = Box::pin(changes.clone().stream());
        assert_eq!(changes.receiver_count(), 2);

        let mut editor = store.edit();
        editor.put_int("n", 1);
        editor.commit();

        assert_eq!(first.next().await, Some(KeyChange::Changed("n".to_string())));
        assert_eq!(second.next().await, Some(KeyChange::Changed("n".to_string())));
    }

    #[tokio::test]
    async fn test_listener_removed_with_last_handle() {
        let store = Arc::new(MemPreferences::in_memory());
        let changes = KeyChanges::new(store.clone());
        let mut stream = Box::pin(changes.stream());
        drop(changes);

        // the sender lives only in the store's listener; once it is gone the stream ends
        assert_eq!(stream.next().await, None);
    }
}
