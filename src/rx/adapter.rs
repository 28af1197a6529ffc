use std::collections::BTreeSet;
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Editor, Result, SharedPreferences};

/// Stores and retrieves values of type `T` in a [`SharedPreferences`].
pub trait Adapter<T>: Send + Sync {
    /// Reads the value for `key`, or `default_value` if the key is unset, was stored as
    /// `null`, or holds something that cannot be turned into a `T`.
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &T) -> T;

    /// Stages `value` for `key` in `editor`.
    ///
    /// Implementations must not call [`Editor::apply`] or [`Editor::commit`].
    fn set(&self, key: &str, value: &T, editor: &mut Editor<'_>);
}

pub struct StringAdapter;

impl Adapter<String> for StringAdapter {
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &String) -> String {
        preferences.get_string(key, default_value)
    }

    fn set(&self, key: &str, value: &String, editor: &mut Editor<'_>) {
        editor.put_string(key, value);
    }
}

pub struct BooleanAdapter;

impl Adapter<bool> for BooleanAdapter {
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &bool) -> bool {
        preferences.get_bool(key, *default_value)
    }

    fn set(&self, key: &str, value: &bool, editor: &mut Editor<'_>) {
        editor.put_bool(key, *value);
    }
}

pub struct IntegerAdapter;

impl Adapter<i32> for IntegerAdapter {
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &i32) -> i32 {
        preferences.get_int(key, *default_value)
    }

    fn set(&self, key: &str, value: &i32, editor: &mut Editor<'_>) {
        editor.put_int(key, *value);
    }
}

pub struct LongAdapter;

impl Adapter<i64> for LongAdapter {
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &i64) -> i64 {
        preferences.get_long(key, *default_value)
    }

    fn set(&self, key: &str, value: &i64, editor: &mut Editor<'_>) {
        editor.put_long(key, *value);
    }
}

pub struct FloatAdapter;

impl Adapter<f32> for FloatAdapter {
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &f32) -> f32 {
        preferences.get_float(key, *default_value)
    }

    /// Non-finite floats have no stored form and are not staged.
    fn set(&self, key: &str, value: &f32, editor: &mut Editor<'_>) {
        if !value.is_finite() {
            warn!("Refusing to store non-finite float {} for {:?}", value, key);
            return;
        }
        editor.put_float(key, *value);
    }
}

pub struct StringSetAdapter;

impl Adapter<BTreeSet<String>> for StringSetAdapter {
    fn get(
        &self,
        key: &str,
        preferences: &dyn SharedPreferences,
        default_value: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        preferences.get_string_set(key, default_value)
    }

    fn set(&self, key: &str, value: &BTreeSet<String>, editor: &mut Editor<'_>) {
        editor.put_string_set(key, value);
    }
}

/// Stores an enum by name. Unknown names read as the default.
pub struct EnumAdapter<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E> EnumAdapter<E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E> Default for EnumAdapter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Adapter<E> for EnumAdapter<E>
where
    E: FromStr + Display + Clone,
{
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &E) -> E {
        match preferences.get_value(key) {
            Some(serde_json::Value::String(name)) => {
                name.parse().unwrap_or_else(|_| default_value.clone())
            }
            _ => default_value.clone(),
        }
    }

    fn set(&self, key: &str, value: &E, editor: &mut Editor<'_>) {
        editor.put_string(key, &value.to_string());
    }
}

/// Converts custom types to and from their stored string form.
pub trait Converter<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<String>;
    fn deserialize(&self, serialized: &str) -> Result<T>;
}

/// A [`Converter`] for any serde type, stored as a JSON string.
pub struct JsonConverter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonConverter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Converter<T> for JsonConverter<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize(&self, serialized: &str) -> Result<T> {
        Ok(serde_json::from_str(serialized)?)
    }
}

/// Stores values through a [`Converter`].
///
/// A stored string that fails to convert reads as the default. A value that fails to
/// serialize is not staged, leaving the stored value untouched.
pub struct ConverterAdapter<C> {
    converter: C,
}

impl<C> ConverterAdapter<C> {
    pub fn new(converter: C) -> Self {
        Self { converter }
    }
}

impl<T, C> Adapter<T> for ConverterAdapter<C>
where
    T: Clone,
    C: Converter<T>,
{
    fn get(&self, key: &str, preferences: &dyn SharedPreferences, default_value: &T) -> T {
        let Some(serde_json::Value::String(serialized)) = preferences.get_value(key) else {
            return default_value.clone();
        };
        match self.converter.deserialize(&serialized) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not convert stored value for {:?}: {}", key, e);
                default_value.clone()
            }
        }
    }

    fn set(&self, key: &str, value: &T, editor: &mut Editor<'_>) {
        match self.converter.serialize(value) {
            Ok(serialized) => {
                editor.put_string(key, &serialized);
            }
            Err(e) => warn!("Could not convert value for {:?}: {}", key, e),
        }
    }
}
