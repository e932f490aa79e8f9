use std::collections::BTreeMap;

use serde_json::Value;

use super::{StateStore, WriteBatch};
use crate::error::StoreError;

/// In-process store. State lives only as long as the value.
///
/// Useful for hosts that persist elsewhere and for tests; `fail_writes`
/// makes every `apply` fail so rollback paths can be exercised.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn apply(&mut self, batch: &WriteBatch) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::ReadOnly("memory store rejects writes".into()));
        }
        for (key, value) in batch.iter() {
            match value {
                Some(v) => {
                    self.values.insert(key.to_string(), v.clone());
                }
                None => {
                    self.values.remove(key);
                }
            }
        }
        Ok(())
    }
}
