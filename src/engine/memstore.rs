use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, error};
use serde_json::Value;

use crate::engine::{CommitMode, Edit, EditBatch, Editor, Persistence};
use crate::{ChangeListener, ListenerId, Result, SharedPreferences};

type StoreData = HashMap<String, Value>;

/// In-memory [`SharedPreferences`] with optional atomic persistence.
///
/// Readers always see the in-memory map. Commits update it under a write lock and then
/// either write the file inline ([`CommitMode::Commit`]) or queue the write on a blocking
/// task ([`CommitMode::Apply`]).
pub struct MemPreferences {
    data: Arc<RwLock<StoreData>>,
    persistence: Option<Arc<Persistence>>,
    listeners: RwLock<Vec<(ListenerId, ChangeListener)>>,
    next_listener: AtomicU64,
    pending_tasks: Arc<AtomicUsize>,
    write_lock: Arc<Mutex<()>>,
}

impl MemPreferences {
    pub fn new(initial_data: StoreData, persistence: Option<Arc<Persistence>>) -> Self {
        Self {
            data: Arc::new(RwLock::new(initial_data)),
            persistence,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            pending_tasks: Arc::new(AtomicUsize::new(0)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self::new(HashMap::new(), None)
    }

    /// Opens the store backed by `persistence`, loading whatever it holds.
    pub fn open(persistence: Persistence) -> Result<Self> {
        let initial_data = persistence.load()?;
        Ok(Self::new(initial_data, Some(Arc::new(persistence))))
    }

    /// Resolves once every queued background write has landed.
    pub async fn wait(&self) {
        while self.pending_tasks.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// Number of registered change listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn persist_now(&self) -> bool {
        let Some(p) = &self.persistence else {
            return true;
        };
        match write_snapshot(&self.data, p, &self.write_lock) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist preferences to {:?}: {}", p.path(), e);
                false
            }
        }
    }

    fn persist_later(&self) {
        let Some(p) = &self.persistence else {
            return;
        };
        let p = p.clone();
        let data = self.data.clone();
        let write_lock = self.write_lock.clone();
        let pending = self.pending_tasks.clone();
        pending.fetch_add(1, Ordering::SeqCst);

        let job = move || {
            if let Err(e) = write_snapshot(&data, &p, &write_lock) {
                error!("Failed to persist preferences to {:?}: {}", p.path(), e);
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                std::thread::spawn(job);
            }
        }
    }

    fn notify(&self, cleared: bool, modified: &[String]) {
        let listeners: Vec<ChangeListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in &listeners {
            if cleared {
                listener(None);
            }
            for key in modified {
                listener(Some(key.as_str()));
            }
        }
    }
}

/// Takes the latest snapshot under `write_lock` so that queued writes finishing out of
/// order still leave the newest state on disk.
fn write_snapshot(
    data: &RwLock<StoreData>,
    persistence: &Persistence,
    write_lock: &Mutex<()>,
) -> Result<()> {
    let _guard = write_lock.lock().unwrap_or_else(PoisonError::into_inner);
    let snapshot = data.read().unwrap_or_else(PoisonError::into_inner).clone();
    persistence.save(&snapshot)
}

impl SharedPreferences for MemPreferences {
    fn get_value(&self, key: &str) -> Option<Value> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        match data.get(key) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v.clone()),
        }
    }

    fn contains(&self, key: &str) -> bool {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.contains_key(key)
    }

    fn all(&self) -> HashMap<String, Value> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn edit(&self) -> Editor<'_> {
        Editor::new(self)
    }

    fn commit_edits(&self, batch: EditBatch, mode: CommitMode) -> bool {
        let mut changed = false;
        let mut modified = Vec::new();
        {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            if batch.clear && !data.is_empty() {
                data.clear();
                changed = true;
            }
            for edit in batch.edits {
                match edit {
                    Edit::Put(key, value) => {
                        if data.get(&key) == Some(&value) {
                            continue;
                        }
                        data.insert(key.clone(), value);
                        modified.push(key);
                    }
                    Edit::Remove(key) => {
                        if data.remove(&key).is_some() {
                            modified.push(key);
                        }
                    }
                }
            }
        }
        changed |= !modified.is_empty();
        debug!("{:?}: cleared={} modified={:?}", mode, batch.clear, modified);

        let durable = match (changed, mode) {
            (false, _) => true,
            (true, CommitMode::Commit) => self.persist_now(),
            (true, CommitMode::Apply) => {
                self.persist_later();
                true
            }
        };

        self.notify(batch.clear, &modified);
        durable
    }

    fn register_listener(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unregister_listener(&self, id: ListenerId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}
