use std::collections::BTreeSet;

use serde_json::Value;

use crate::SharedPreferences;

/// How a staged batch reaches durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Update memory now, queue the disk write and return immediately.
    Apply,
    /// Update memory and block until the disk write finished.
    Commit,
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Put(String, Value),
    Remove(String),
}

/// Everything staged in one [`Editor`].
///
/// `clear` is applied before `edits`, so a batch can wipe the store and seed new
/// values atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditBatch {
    pub clear: bool,
    pub edits: Vec<Edit>,
}

/// A pending-edit transaction.
///
/// Nothing is visible to readers until [`Editor::apply`] or [`Editor::commit`] is called.
/// Dropping an editor discards its staged writes.
pub struct Editor<'a> {
    store: &'a dyn SharedPreferences,
    batch: EditBatch,
}

impl<'a> Editor<'a> {
    pub fn new(store: &'a dyn SharedPreferences) -> Self {
        Self {
            store,
            batch: EditBatch::default(),
        }
    }

    pub fn put_value(&mut self, key: &str, value: Value) -> &mut Self {
        self.batch.edits.push(Edit::Put(key.to_string(), value));
        self
    }

    pub fn put_string(&mut self, key: &str, value: &str) -> &mut Self {
        self.put_value(key, Value::String(value.to_string()))
    }

    pub fn put_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.put_value(key, Value::Bool(value))
    }

    pub fn put_int(&mut self, key: &str, value: i32) -> &mut Self {
        self.put_value(key, Value::from(value))
    }

    pub fn put_long(&mut self, key: &str, value: i64) -> &mut Self {
        self.put_value(key, Value::from(value))
    }

    /// Stages a float. Non-finite values have no JSON form and are stored as `null`,
    /// which reads back as absent.
    pub fn put_float(&mut self, key: &str, value: f32) -> &mut Self {
        self.put_value(key, Value::from(f64::from(value)))
    }

    pub fn put_string_set(&mut self, key: &str, value: &BTreeSet<String>) -> &mut Self {
        let items = value.iter().cloned().map(Value::String).collect();
        self.put_value(key, Value::Array(items))
    }

    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.batch.edits.push(Edit::Remove(key.to_string()));
        self
    }

    /// Removes every stored entry. Clearing always happens first when the batch is
    /// committed, so puts staged in this editor survive regardless of call order.
    pub fn clear(&mut self) -> &mut Self {
        self.batch.clear = true;
        self
    }

    /// Commits asynchronously. Readers see the change immediately; the disk write is
    /// queued and its outcome is only logged.
    pub fn apply(self) {
        self.store.commit_edits(self.batch, CommitMode::Apply);
    }

    /// Commits synchronously and reports whether the write was made durable.
    pub fn commit(self) -> bool {
        self.store.commit_edits(self.batch, CommitMode::Commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemPreferences;

    #[test]
    fn test_staged_writes_are_invisible_until_commit() {
        let store = MemPreferences::in_memory();
        let mut editor = store.edit();
        editor.put_string("name", "alice").put_int("age", 30);
        assert!(!store.contains("name"));

        assert!(editor.commit());
        assert_eq!(store.get_string("name", ""), "alice");
        assert_eq!(store.get_int("age", 0), 30);
    }

    #[test]
    fn test_dropped_editor_discards_writes() {
        let store = MemPreferences::in_memory();
        {
            let mut editor = store.edit();
            editor.put_bool("flag", true);
        }
        assert!(!store.contains("flag"));
    }

    #[test]
    fn test_clear_runs_before_puts() {
        let store = MemPreferences::in_memory();
        let mut editor = store.edit();
        editor.put_string("old", "x");
        editor.commit();

        let mut editor = store.edit();
        editor.put_string("new", "y").clear();
        assert!(editor.commit());

        assert!(!store.contains("old"));
        assert_eq!(store.get_string("new", ""), "y");
    }
}
