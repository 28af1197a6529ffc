//! rx-prefs is a typed, observable façade over a lightweight key-value settings store.
//!
//! Each setting is a [`Preference`] bound to one key, one default value and one
//! [`Adapter`] that knows how to read and stage that type. Preferences can be read and
//! written synchronously, and every preference exposes an [`Observable`] that emits the
//! current value on subscription and again whenever its key (or the whole store) changes.
//!
//! ## Core Components
//! - [`engine`]: The storage backend (in-memory map, pending-edit transactions, atomic persistence).
//! - [`rx`]: Typed preferences, serialization adapters and the shared key-change stream.
//! - [`config`]: Environment-driven store configuration.

pub mod config;
pub mod engine;
pub mod rx;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use engine::{CommitMode, Edit, EditBatch, Editor, MemPreferences, Persistence};
pub use rx::{
    Adapter, Converter, JsonConverter, KeyChange, KeyChanges, Observable, Preference, RxPreferences,
};

/// Errors returned by the preference store.
#[derive(Error, Debug)]
pub enum Error {
    /// An argument was rejected before any state was touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for preference store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Callback invoked after a commit: `Some(key)` for every modified key, `None` once when
/// the commit cleared the store.
pub type ChangeListener = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Handle returned by [`SharedPreferences::register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A key-value settings store.
///
/// Reads never fail: a missing key, a stored `null` and a value of the wrong shape all
/// resolve to the caller's default. Writes go through an [`Editor`] obtained from
/// [`SharedPreferences::edit`].
pub trait SharedPreferences: Send + Sync {
    /// Returns the raw stored value, if any.
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Returns `true` if the store holds an entry for `key`.
    fn contains(&self, key: &str) -> bool;

    /// Returns a snapshot of every entry.
    fn all(&self) -> HashMap<String, Value>;

    /// Opens a new pending-edit transaction.
    fn edit(&self) -> Editor<'_>;

    /// Applies a staged batch. Called by [`Editor::apply`] and [`Editor::commit`].
    ///
    /// Returns `false` only when a [`CommitMode::Commit`] could not be made durable.
    fn commit_edits(&self, batch: EditBatch, mode: CommitMode) -> bool;

    /// Registers a change callback.
    fn register_listener(&self, listener: ChangeListener) -> ListenerId;

    /// Removes a previously registered callback. Unknown ids are ignored.
    fn unregister_listener(&self, id: ListenerId);

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.get_value(key) {
            Some(Value::String(s)) => s,
            _ => default.to_string(),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_value(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get_value(key)
            .and_then(|v| v.as_i64())
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(default)
    }

    fn get_long(&self, key: &str, default: i64) -> i64 {
        self.get_value(key)
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    }

    fn get_float(&self, key: &str, default: f32) -> f32 {
        self.get_value(key)
            .and_then(|v| v.as_f64())
            .map(|f| f as f32)
            .unwrap_or(default)
    }

    /// Reads a set of strings. Arrays holding anything other than strings read as `default`.
    fn get_string_set(&self, key: &str, default: &BTreeSet<String>) -> BTreeSet<String> {
        match self.get_value(key) {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect::<Option<BTreeSet<String>>>()
                .unwrap_or_else(|| default.clone()),
            _ => default.clone(),
        }
    }
}
