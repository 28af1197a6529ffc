use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::rx::adapter::{
    BooleanAdapter, ConverterAdapter, EnumAdapter, FloatAdapter, IntegerAdapter, LongAdapter,
    StringAdapter, StringSetAdapter,
};
use crate::rx::{Converter, JsonConverter, KeyChanges, Preference};
use crate::SharedPreferences;

const DEFAULT_FLOAT: f32 = 0.0;
const DEFAULT_INTEGER: i32 = 0;
const DEFAULT_BOOLEAN: bool = false;
const DEFAULT_LONG: i64 = 0;
const DEFAULT_STRING: &str = "";

/// Creates typed [`Preference`]s over one store.
///
/// All preferences made by one factory share a single [`KeyChanges`] listener.
#[derive(Clone)]
pub struct RxPreferences {
    preferences: Arc<dyn SharedPreferences>,
    key_changes: KeyChanges,
}

impl RxPreferences {
    pub fn create(preferences: Arc<dyn SharedPreferences>) -> Self {
        let key_changes = KeyChanges::new(preferences.clone());
        Self {
            preferences,
            key_changes,
        }
    }

    /// The underlying store.
    pub fn preferences(&self) -> &Arc<dyn SharedPreferences> {
        &self.preferences
    }

    pub fn key_changes(&self) -> &KeyChanges {
        &self.key_changes
    }

    fn preference<T, A>(&self, key: &str, default_value: T, adapter: A) -> Preference<T>
    where
        T: Clone + Send + Sync + 'static,
        A: crate::Adapter<T> + 'static,
    {
        Preference::new(
            self.preferences.clone(),
            key,
            default_value,
            adapter,
            self.key_changes.clone(),
        )
    }

    pub fn get_bool(&self, key: &str, default_value: bool) -> Preference<bool> {
        self.preference(key, default_value, BooleanAdapter)
    }

    /// A boolean preference defaulting to `false`.
    pub fn get_bool_default(&self, key: &str) -> Preference<bool> {
        self.get_bool(key, DEFAULT_BOOLEAN)
    }

    pub fn get_integer(&self, key: &str, default_value: i32) -> Preference<i32> {
        self.preference(key, default_value, IntegerAdapter)
    }

    /// An integer preference defaulting to `0`.
    pub fn get_integer_default(&self, key: &str) -> Preference<i32> {
        self.get_integer(key, DEFAULT_INTEGER)
    }

    pub fn get_long(&self, key: &str, default_value: i64) -> Preference<i64> {
        self.preference(key, default_value, LongAdapter)
    }

    /// A long preference defaulting to `0`.
    pub fn get_long_default(&self, key: &str) -> Preference<i64> {
        self.get_long(key, DEFAULT_LONG)
    }

    pub fn get_float(&self, key: &str, default_value: f32) -> Preference<f32> {
        self.preference(key, default_value, FloatAdapter)
    }

    /// A float preference defaulting to `0.0`.
    pub fn get_float_default(&self, key: &str) -> Preference<f32> {
        self.get_float(key, DEFAULT_FLOAT)
    }

    pub fn get_string(&self, key: &str, default_value: impl Into<String>) -> Preference<String> {
        self.preference(key, default_value.into(), StringAdapter)
    }

    /// A string preference defaulting to the empty string.
    pub fn get_string_default(&self, key: &str) -> Preference<String> {
        self.get_string(key, DEFAULT_STRING)
    }

    pub fn get_string_set(
        &self,
        key: &str,
        default_value: BTreeSet<String>,
    ) -> Preference<BTreeSet<String>> {
        self.preference(key, default_value, StringSetAdapter)
    }

    /// A string-set preference defaulting to the empty set.
    pub fn get_string_set_default(&self, key: &str) -> Preference<BTreeSet<String>> {
        self.get_string_set(key, BTreeSet::new())
    }

    /// An enum stored by its `Display` name and read back through `FromStr`.
    pub fn get_enum<E>(&self, key: &str, default_value: E) -> Preference<E>
    where
        E: FromStr + Display + Clone + Send + Sync + 'static,
    {
        self.preference(key, default_value, EnumAdapter::<E>::new())
    }

    /// A value of any type, stored as a string through `converter`.
    pub fn get_object<T, C>(&self, key: &str, default_value: T, converter: C) -> Preference<T>
    where
        T: Clone + Send + Sync + 'static,
        C: Converter<T> + 'static,
    {
        self.preference(key, default_value, ConverterAdapter::new(converter))
    }

    /// A serde value stored as a JSON string.
    pub fn get_json<T>(&self, key: &str, default_value: T) -> Preference<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.get_object(key, default_value, JsonConverter::<T>::new())
    }

    /// Removes every entry. Every live subscription emits its default.
    pub fn clear(&self) {
        let mut editor = self.preferences.edit();
        editor.clear();
        editor.apply();
    }
}
