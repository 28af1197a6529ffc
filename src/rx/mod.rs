//! Typed preferences and their change streams.
//!
//! [`RxPreferences`] is the entry point: it owns the shared [`KeyChanges`] listener for
//! one store and hands out [`Preference`] handles bound to an [`Adapter`].

pub mod adapter;
pub mod key_changes;
pub mod preference;
pub mod rx_preferences;

pub use adapter::{Adapter, Converter, ConverterAdapter, EnumAdapter, JsonConverter};
pub use key_changes::{KeyChange, KeyChanges};
pub use preference::{Observable, Preference};
pub use rx_preferences::RxPreferences;
