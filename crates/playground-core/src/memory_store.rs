//! In-process [`StateStore`].
//!
//! Backed by a sharded concurrent map so each key is updated under its own
//! shard lock; calls on different keys do not serialize on one global lock.
//! Used by tests and by single-process deployments.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexSet;

use crate::error::StoreError;
use crate::store::{Fields, StateStore};

#[derive(Debug, Clone)]
enum Value {
    Fields(Fields),
    Set(IndexSet<String>),
    Sequence(VecDeque<String>),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        match self.data.get(key).as_deref() {
            None => Ok(None),
            Some(Value::Fields(f)) => Ok(Some(f.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        match self.data.entry(key.to_string()) {
            Entry::Vacant(v) => {
                v.insert(Value::Fields(fields));
                Ok(())
            }
            Entry::Occupied(mut o) => match o.get_mut() {
                Value::Fields(existing) => {
                    existing.extend(fields);
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(IndexSet::new()));
        match entry.value_mut() {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        match self.data.get_mut(key).as_deref_mut() {
            None => Ok(false),
            // Keep insertion order of the remaining members.
            Some(Value::Set(set)) => Ok(set.shift_remove(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        match self.data.get(key).as_deref() {
            None => Ok(false),
            Some(Value::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.data.get(key).as_deref() {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn append_to_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Sequence(VecDeque::new()));
        match entry.value_mut() {
            Value::Sequence(seq) => {
                seq.push_back(value.to_string());
                Ok(seq.len())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn list_sequence(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.data.get(key).as_deref() {
            None => Ok(Vec::new()),
            Some(Value::Sequence(seq)) => Ok(seq.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn remove_from_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        match self.data.get_mut(key).as_deref_mut() {
            None => Ok(0),
            Some(Value::Sequence(seq)) => {
                let before = seq.len();
                seq.retain(|v| v != value);
                Ok(before - seq.len())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.data.get_mut(key).as_deref_mut() {
            None => Ok(None),
            Some(Value::Sequence(seq)) => Ok(seq.pop_front()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn get_many_fields(&self, keys: &[String]) -> Result<Vec<Option<Fields>>, StoreError> {
        keys.iter()
            .map(|key| match self.data.get(key.as_str()).as_deref() {
                None => Ok(None),
                Some(Value::Fields(f)) => Ok(Some(f.clone())),
                Some(_) => Err(wrong_type(key)),
            })
            .collect()
    }
}
