//! Typed access to the persisted key/value state.
//!
//! Keys are optional: a key that was never written reads as
//! [`Persisted::Absent`], which is not the same thing as a present `0` or
//! `false`. Step indices and completion flags both use falsy values as real
//! states, so nothing in the crate tests truthiness on raw values.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// A value read from the store: either never written, or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persisted<T> {
    #[default]
    Absent,
    Present(T),
}

impl<T> Persisted<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Persisted::Absent)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Persisted::Present(_))
    }

    pub fn present(self) -> Option<T> {
        match self {
            Persisted::Present(v) => Some(v),
            Persisted::Absent => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.present().unwrap_or(default)
    }
}

impl<T: Default> Persisted<T> {
    pub fn unwrap_or_default(self) -> T {
        self.present().unwrap_or_default()
    }
}

impl Persisted<bool> {
    /// True only for a present `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Persisted::Present(true))
    }
}

impl<T> From<Option<T>> for Persisted<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Persisted::Present(v),
            None => Persisted::Absent,
        }
    }
}

/// A store key bound to the type of value it holds.
pub struct Key<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> std::fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({})", self.name)
    }
}

/// Pending writes, applied by a backend as one atomic unit.
///
/// `None` removes the key. Later writes to the same key replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    entries: BTreeMap<&'static str, Option<Value>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a value under `key`.
    ///
    /// # Errors
    /// Returns an error if the value cannot be encoded as JSON.
    pub fn put<T: Serialize>(&mut self, key: Key<T>, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(value).map_err(|e| StoreError::Encode {
            key: key.name().to_string(),
            message: e.to_string(),
        })?;
        self.entries.insert(key.name(), Some(encoded));
        Ok(())
    }

    pub fn remove<T>(&mut self, key: Key<T>) {
        self.remove_name(key.name());
    }

    pub(crate) fn remove_name(&mut self, name: &'static str) {
        self.entries.insert(name, None);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Staged write for `name`: `Some(None)` is a staged removal.
    fn staged(&self, name: &str) -> Option<Option<&Value>> {
        self.entries.get(name).map(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&Value>)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v.as_ref()))
    }
}

/// Durable key/value storage.
///
/// Implementations must keep absent keys distinct from falsy values and must
/// apply a [`WriteBatch`] atomically: either every entry lands or none does.
pub trait StateStore {
    /// Raw JSON value for `key`, or `None` if it was never written.
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Apply every entry of `batch` atomically.
    fn apply(&mut self, batch: &WriteBatch) -> Result<(), StoreError>;

    fn get<T: DeserializeOwned>(&self, key: Key<T>) -> Result<Persisted<T>, StoreError>
    where
        Self: Sized,
    {
        decode(key.name(), self.load(key.name())?)
    }

    fn set<T: Serialize>(&mut self, key: Key<T>, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let mut batch = WriteBatch::new();
        batch.put(key, value)?;
        self.apply(&batch)
    }

    fn clear<T>(&mut self, key: Key<T>) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let mut batch = WriteBatch::new();
        batch.remove(key);
        self.apply(&batch)
    }
}

fn decode<T: DeserializeOwned>(name: &str, raw: Option<Value>) -> Result<Persisted<T>, StoreError> {
    match raw {
        None => Ok(Persisted::Absent),
        Some(value) => serde_json::from_value(value)
            .map(Persisted::Present)
            .map_err(|e| StoreError::Decode {
                key: name.to_string(),
                message: e.to_string(),
            }),
    }
}

/// Read-through overlay used for one event.
///
/// Reads see staged writes first; nothing reaches the store until the batch
/// is taken with [`StateTxn::into_batch`] and applied.
pub struct StateTxn<'s, S: StateStore> {
    store: &'s S,
    batch: WriteBatch,
}

impl<'s, S: StateStore> StateTxn<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            batch: WriteBatch::new(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: Key<T>) -> Result<Persisted<T>, StoreError> {
        match self.batch.staged(key.name()) {
            Some(staged) => decode(key.name(), staged.cloned()),
            None => decode(key.name(), self.store.load(key.name())?),
        }
    }

    pub fn set<T: Serialize>(&mut self, key: Key<T>, value: &T) -> Result<(), StoreError> {
        self.batch.put(key, value)
    }

    pub fn clear<T>(&mut self, key: Key<T>) {
        self.batch.remove(key);
    }

    pub(crate) fn clear_name(&mut self, name: &'static str) {
        self.batch.remove_name(name);
    }

    pub fn into_batch(self) -> WriteBatch {
        self.batch
    }
}
