use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::BoxStream;
use futures::StreamExt;
use log::warn;
use tokio::sync::broadcast::error::RecvError;

use crate::rx::{Adapter, KeyChange, KeyChanges};
use crate::SharedPreferences;

/// One named, typed, defaulted setting.
///
/// Handles are cheap to clone; clones share the same key, adapter and lock.
pub struct Preference<T> {
    inner: Arc<Inner<T>>,
    values: Observable<T>,
}

struct Inner<T> {
    preferences: Arc<dyn SharedPreferences>,
    key: String,
    default_value: T,
    adapter: Box<dyn Adapter<T>>,
    // serializes get/is_set/delete on this entry; writes do not take it
    lock: Mutex<()>,
}

impl<T> Inner<T> {
    fn get(&self) -> T {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.adapter
            .get(&self.key, self.preferences.as_ref(), &self.default_value)
    }
}

impl<T> Preference<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        preferences: Arc<dyn SharedPreferences>,
        key: impl Into<String>,
        default_value: T,
        adapter: impl Adapter<T> + 'static,
        key_changes: KeyChanges,
    ) -> Self {
        let inner = Arc::new(Inner {
            preferences,
            key: key.into(),
            default_value,
            adapter: Box::new(adapter),
            lock: Mutex::new(()),
        });
        let values = Observable {
            inner: inner.clone(),
            key_changes,
        };
        Self { inner, values }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn default_value(&self) -> &T {
        &self.inner.default_value
    }

    /// Current value, or the default if unset or unreadable.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Writes `value` and commits in the background.
    pub fn set(&self, value: T) {
        let mut editor = self.inner.preferences.edit();
        self.inner.adapter.set(&self.inner.key, &value, &mut editor);
        editor.apply();
    }

    /// Writes `value` and blocks until it is durable. Returns `false` if the commit failed.
    pub fn set_sync(&self, value: T) -> bool {
        let mut editor = self.inner.preferences.edit();
        self.inner.adapter.set(&self.inner.key, &value, &mut editor);
        editor.commit()
    }

    pub fn is_set(&self) -> bool {
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.preferences.contains(&self.inner.key)
    }

    /// Removes the key, committing in the background.
    ///
    /// The removal is staged under the per-entry lock and applied after it is released,
    /// so store listeners may call [`Preference::get`] on this entry.
    pub fn delete(&self) {
        let editor = {
            let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut editor = self.inner.preferences.edit();
            editor.remove(&self.inner.key);
            editor
        };
        editor.apply();
    }

    pub fn as_observable(&self) -> Observable<T> {
        self.values.clone()
    }

    /// A sink that forwards every value to [`Preference::set`].
    pub fn as_consumer(&self) -> impl Fn(T) + Send + Sync + 'static {
        let preference = self.clone();
        move |value| preference.set(value)
    }
}

impl<T> Clone for Preference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            values: self.values.clone(),
        }
    }
}

/// The value of one preference over time.
///
/// Every call to [`Observable::subscribe`] starts an independent stream that yields the
/// current value right away, then a fresh value each time the key changes. Clearing the
/// store yields the default without reading it.
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
    key_changes: KeyChanges,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            key_changes: self.key_changes.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// The stream ends only if the store's change channel closes; dropping it detaches
    /// the subscriber and nothing else.
    ///
    /// A subscriber that falls behind the change channel re-reads its value and emits it
    /// only if it differs from the last value it emitted.
    pub fn subscribe(&self) -> BoxStream<'static, T> {
        let inner = self.inner.clone();
        // subscribe before the initial read so no change slips between the two
        let receiver = self.key_changes.subscribe();

        futures::stream::unfold(
            (inner, receiver, None::<T>),
            |(inner, mut receiver, last)| async move {
                let Some(last) = last else {
                    let value = inner.get();
                    return Some((value.clone(), (inner, receiver, Some(value))));
                };
                let value = loop {
                    match receiver.recv().await {
                        Ok(KeyChange::Changed(key)) if key == inner.key => break inner.get(),
                        Ok(KeyChange::Changed(_)) => continue,
                        Ok(KeyChange::Cleared) => break inner.default_value.clone(),
                        Err(RecvError::Lagged(missed)) => {
                            warn!(
                                "Preference {:?} lagged by {} changes, re-reading",
                                inner.key, missed
                            );
                            let value = inner.get();
                            if value != last {
                                break value;
                            }
                        }
                        Err(RecvError::Closed) => return None,
                    }
                };
                Some((value.clone(), (inner, receiver, Some(value))))
            },
        )
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemPreferences;
    use crate::rx::adapter::{IntegerAdapter, StringAdapter};
    use std::time::Duration;

    fn setup() -> (Arc<MemPreferences>, KeyChanges) {
        let store = Arc::new(MemPreferences::in_memory());
        let changes = KeyChanges::new(store.clone());
        (store, changes)
    }

    async fn assert_quiet<S: futures::Stream + Unpin>(stream: &mut S) {
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err(), "unexpected emission");
    }

    #[tokio::test]
    async fn test_volume_scenario() {
        let (store, changes) = setup();
        let volume = Preference::new(store.clone(), "volume", 50, IntegerAdapter, changes);

        assert_eq!(volume.get(), 50);
        assert!(volume.set_sync(80));
        assert_eq!(volume.get(), 80);

        let mut values = volume.as_observable().subscribe();
        assert_eq!(values.next().await, Some(80));

        let mut editor = store.edit();
        editor.clear();
        editor.apply();
        assert_eq!(values.next().await, Some(50));

        volume.delete();
        assert!(!volume.is_set());
        assert_eq!(volume.get(), 50);
    }

    #[tokio::test]
    async fn test_clear_emits_default_without_reading() {
        let (store, changes) = setup();
        let volume = Preference::new(store.clone(), "volume", 50, IntegerAdapter, changes);
        volume.set_sync(80);

        let mut values = volume.as_observable().subscribe();
        assert_eq!(values.next().await, Some(80));

        // one batch: the clear event is delivered while the store already holds 9
        let mut editor = store.edit();
        editor.clear().put_int("volume", 9);
        assert!(editor.commit());

        assert_eq!(values.next().await, Some(50));
        assert_eq!(values.next().await, Some(9));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_ignores_other_keys() {
        let (store, changes) = setup();
        let a = Preference::new(store.clone(), "a", 1, IntegerAdapter, changes);
        let mut values = a.as_observable().subscribe();
        assert_eq!(values.next().await, Some(1));

        for i in 0..1100 {
            let mut editor = store.edit();
            editor.put_int("other", i);
            editor.commit();
        }
        assert_quiet(&mut values).await;
    }

    #[tokio::test]
    async fn test_lagged_subscriber_catches_up_on_own_key() {
        let (store, changes) = setup();
        let a = Preference::new(store.clone(), "a", 1, IntegerAdapter, changes);
        let mut values = a.as_observable().subscribe();
        assert_eq!(values.next().await, Some(1));

        a.set_sync(2);
        for i in 0..1100 {
            let mut editor = store.edit();
            editor.put_int("other", i);
            editor.commit();
        }
        assert_eq!(values.next().await, Some(2));
        assert_quiet(&mut values).await;
    }

    #[test]
    fn test_listener_may_read_during_delete() {
        let (store, changes) = setup();
        let volume = Preference::new(store.clone(), "volume", 50, IntegerAdapter, changes);
        volume.set_sync(80);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (reader, sink) = (volume.clone(), seen.clone());
        store.register_listener(Arc::new(move |_: Option<&str>| {
            sink.lock().unwrap().push(reader.get());
        }));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let deleter = volume.clone();
        std::thread::spawn(move || {
            deleter.delete();
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![50]);
    }

    #[tokio::test]
    async fn test_set_refreshes_subscribers() {
        let (store, changes) = setup();
        let name = Preference::new(store, "name", String::new(), StringAdapter, changes);
        let mut values = name.as_observable().subscribe();
        assert_eq!(values.next().await, Some(String::new()));

        name.set("alice".to_string());
        assert_eq!(values.next().await, Some("alice".to_string()));
        assert_eq!(name.get(), "alice");
        assert!(name.is_set());
    }

    #[tokio::test]
    async fn test_unrelated_key_is_filtered() {
        let (store, changes) = setup();
        let a = Preference::new(store.clone(), "a", 0, IntegerAdapter, changes.clone());
        let b = Preference::new(store, "b", 0, IntegerAdapter, changes);

        let mut values = a.as_observable().subscribe();
        assert_eq!(values.next().await, Some(0));

        b.set_sync(7);
        assert_quiet(&mut values).await;
    }

    #[tokio::test]
    async fn test_key_match_is_exact() {
        let (store, changes) = setup();
        let a = Preference::new(store.clone(), "a", 0, IntegerAdapter, changes.clone());
        let longer = Preference::new(store, "aa", 0, IntegerAdapter, changes);

        let mut values = a.as_observable().subscribe();
        values.next().await;
        longer.set_sync(1);
        assert_quiet(&mut values).await;
    }

    #[tokio::test]
    async fn test_each_subscriber_gets_its_own_initial_value() {
        let (store, changes) = setup();
        let pref = Preference::new(store, "n", 1, IntegerAdapter, changes);
        let observable = pref.as_observable();

        let mut first = observable.subscribe();
        assert_eq!(first.next().await, Some(1));

        pref.set_sync(2);
        let mut second = observable.subscribe();
        assert_eq!(second.next().await, Some(2));
        assert_eq!(first.next().await, Some(2));
        assert_quiet(&mut second).await;
    }

    #[tokio::test]
    async fn test_dropping_subscription_leaves_others_running() {
        let (store, changes) = setup();
        let pref = Preference::new(store, "n", 0, IntegerAdapter, changes.clone());
        let first = pref.as_observable().subscribe();
        let mut second = pref.as_observable().subscribe();
        assert_eq!(changes.receiver_count(), 2);
        drop(first);
        assert_eq!(changes.receiver_count(), 1);

        assert_eq!(second.next().await, Some(0));
        pref.set_sync(5);
        assert_eq!(second.next().await, Some(5));
    }

    #[tokio::test]
    async fn test_consumer_writes_through() {
        let (store, changes) = setup();
        let pref = Preference::new(store, "n", 0, IntegerAdapter, changes);
        let sink = pref.as_consumer();
        sink(42);
        assert_eq!(pref.get(), 42);
    }

    #[test]
    fn test_accessors() {
        let (store, changes) = setup();
        let pref = Preference::new(store, "volume", 50, IntegerAdapter, changes);
        assert_eq!(pref.key(), "volume");
        assert_eq!(*pref.default_value(), 50);
        assert!(!pref.is_set());
    }
}
