//! Reference in-memory `ObjectStore`/`Replica` implementation.
//!
//! Used as the remote message's snapshot store, and as the default `Replica`
//! for tests and benches. Collections are `BTreeMap`s so iteration order (and
//! therefore anything derived from it, like `scan_unique`) is deterministic
//! regardless of insertion order.

use crate::error::{MergeError, Result};
use crate::op::ObjRef;
use crate::store::{ObjectStore, Replica};
use crate::{CollectionName, PrimaryKey};
use std::collections::BTreeMap;

/// An in-memory table store keyed by collection then primary key.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: BTreeMap<CollectionName, BTreeMap<PrimaryKey, serde_json::Value>>,
    version: String,
    /// Snapshot taken at `begin()`, restored by `rollback()`.
    checkpoint: Option<(BTreeMap<CollectionName, BTreeMap<PrimaryKey, serde_json::Value>>, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, bypassing the transactional interface. Used to
    /// seed fixtures and to build the remote message's snapshot store.
    pub fn seed(&mut self, r: ObjRef, payload: serde_json::Value) {
        self.collections
            .entry(r.type_tag)
            .or_default()
            .insert(r.primary_key, payload);
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn merge_delta(base: &serde_json::Value, delta: &serde_json::Value) -> serde_json::Value {
        let mut merged = base.clone();
        if let (Some(merged_obj), Some(delta_obj)) = (merged.as_object_mut(), delta.as_object()) {
            for (k, v) in delta_obj {
                merged_obj.insert(k.clone(), v.clone());
            }
        }
        merged
    }
}

impl ObjectStore for MemoryStore {
    fn fetch(&self, r: &ObjRef) -> Option<serde_json::Value> {
        self.collections.get(&r.type_tag)?.get(&r.primary_key).cloned()
    }

    fn max_pk(&self, type_tag: &str) -> PrimaryKey {
        self.collections
            .get(type_tag)
            .and_then(|rows| rows.keys().max().copied())
            .unwrap_or(0)
    }
}

impl Replica for MemoryStore {
    fn begin(&mut self) -> Result<()> {
        self.checkpoint = Some((self.collections.clone(), self.version.clone()));
        Ok(())
    }

    fn insert(&mut self, r: &ObjRef, payload: &serde_json::Value) -> Result<()> {
        let table = self.collections.entry(r.type_tag.clone()).or_default();
        if table.contains_key(&r.primary_key) {
            return Err(MergeError::ExecutionFailed {
                wrapped: format!("insert: {:?} already exists", r),
            });
        }
        table.insert(r.primary_key, payload.clone());
        Ok(())
    }

    fn update(&mut self, r: &ObjRef, delta: &serde_json::Value) -> Result<()> {
        let table = self.collections.entry(r.type_tag.clone()).or_default();
        let existing = table.get(&r.primary_key).ok_or_else(|| MergeError::ExecutionFailed {
            wrapped: format!("update: {:?} does not exist", r),
        })?;
        let merged = Self::merge_delta(existing, delta);
        table.insert(r.primary_key, merged);
        Ok(())
    }

    fn delete(&mut self, r: &ObjRef) -> Result<()> {
        let table = self.collections.entry(r.type_tag.clone()).or_default();
        table.remove(&r.primary_key);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.checkpoint = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some((collections, version)) = self.checkpoint.take() {
            self.collections = collections;
            self.version = version;
        }
        Ok(())
    }

    fn advance_version(&mut self, version: &str) -> Result<()> {
        self.version = version.to_string();
        Ok(())
    }

    fn scan_unique(
        &self,
        collection: &CollectionName,
        fields: &[String],
    ) -> Vec<(ObjRef, Vec<serde_json::Value>)> {
        let Some(table) = self.collections.get(collection) else {
            return Vec::new();
        };
        table
            .iter()
            .filter_map(|(pk, payload)| {
                let obj = payload.as_object()?;
                let values: Option<Vec<_>> =
                    fields.iter().map(|f| obj.get(f).cloned()).collect();
                values.map(|v| (ObjRef::new(collection.clone(), *pk), v))
            })
            .collect()
    }
}
