//! Static schema description: collections, foreign keys, and unique constraints.
//!
//! The detector and the unique-constraint checker both need to evaluate the
//! `FK` relation and the set of declared unique constraints without any
//! per-call introspection of the database, so the schema carries both as
//! plain declarative data.

use crate::op::ObjRef;
use crate::CollectionName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single foreign-key column: `field_name` on the owning collection holds a
/// primary key of `target_type_tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDef {
    pub field_name: String,
    pub target_type_tag: CollectionName,
}

impl ForeignKeyDef {
    pub fn new(field_name: impl Into<String>, target_type_tag: impl Into<CollectionName>) -> Self {
        Self {
            field_name: field_name.into(),
            target_type_tag: target_type_tag.into(),
        }
    }
}

/// A unique constraint over one or more fields of a single collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraintDef {
    pub name: String,
    pub collection: CollectionName,
    pub fields: Vec<String>,
}

impl UniqueConstraintDef {
    pub fn new(
        name: impl Into<String>,
        collection: impl Into<CollectionName>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            fields,
        }
    }

    /// Extract this constraint's tuple of values from a payload, in field
    /// declaration order. `None` if any field is absent.
    pub fn extract(&self, payload: &serde_json::Value) -> Option<Vec<serde_json::Value>> {
        let obj = payload.as_object()?;
        self.fields
            .iter()
            .map(|f| obj.get(f).cloned())
            .collect::<Option<Vec<_>>>()
    }
}

/// Schema for a single collection: its foreign keys and declared unique
/// constraints. Field-level type validation is intentionally not modeled here
/// -- that belongs to the ORM layer the merge engine treats as an external
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    pub name: CollectionName,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub unique_constraints: Vec<UniqueConstraintDef>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<CollectionName>) -> Self {
        Self {
            name: name.into(),
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    pub fn with_foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn with_unique_constraint(mut self, uc: UniqueConstraintDef) -> Self {
        self.unique_constraints.push(uc);
        self
    }

    /// References this object's FK columns point at, given its payload.
    pub fn fk_neighbors(&self, payload: &serde_json::Value) -> Vec<ObjRef> {
        let Some(obj) = payload.as_object() else {
            return Vec::new();
        };
        self.foreign_keys
            .iter()
            .filter_map(|fk| {
                let value = obj.get(&fk.field_name)?;
                let pk = value.as_i64()?;
                Some(ObjRef::new(fk.target_type_tag.clone(), pk))
            })
            .collect()
    }
}

/// The full static schema consumed by the detector and checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub collections: HashMap<CollectionName, CollectionSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&mut self, collection: CollectionSchema) -> &mut Self {
        self.collections.insert(collection.name.clone(), collection);
        self
    }

    pub fn with_collection(mut self, collection: CollectionSchema) -> Self {
        self.add_collection(collection);
        self
    }

    pub fn get_collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// References `payload` (an object of collection `type_tag`) points at
    /// via its declared foreign keys. Empty if the collection is unknown.
    pub fn fk_neighbors(&self, type_tag: &str, payload: &serde_json::Value) -> Vec<ObjRef> {
        self.get_collection(type_tag)
            .map(|c| c.fk_neighbors(payload))
            .unwrap_or_default()
    }

    /// All unique constraints declared on `type_tag`.
    pub fn unique_constraints(&self, type_tag: &str) -> &[UniqueConstraintDef] {
        self.get_collection(type_tag)
            .map(|c| c.unique_constraints.as_slice())
            .unwrap_or(&[])
    }
}
