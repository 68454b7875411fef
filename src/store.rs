//! Object-store and replica contracts consumed by the merge engine.
//!
//! Two roles share one capability set so the detector and resolver never
//! branch on which side they're fetching from: a `Local-DB` store backed by
//! the current replica, and a `Message` store backed by the remote message's
//! attached object snapshots.

use crate::op::ObjRef;
use crate::schema::Schema;
use crate::{CollectionName, PrimaryKey};

/// Read-only fetch capability shared by the local replica and the remote
/// message's snapshot set.
pub trait ObjectStore {
    /// Fetch the current payload of `r`, or `None` if it doesn't exist in this
    /// store.
    fn fetch(&self, r: &ObjRef) -> Option<serde_json::Value>;

    /// Largest primary key currently assigned in `type_tag`, used by
    /// insert-insert resolution to mint a fresh key. Implementations that
    /// track no rows of `type_tag` return `0`.
    fn max_pk(&self, type_tag: &str) -> PrimaryKey;
}

/// `fk_neighbors` is implemented once, generically, in terms of the schema's
/// declared foreign keys, and shared by every `ObjectStore` implementation.
pub fn fk_neighbors(schema: &Schema, store: &dyn ObjectStore, r: &ObjRef) -> Option<Vec<ObjRef>> {
    let payload = store.fetch(r)?;
    Some(schema.fk_neighbors(&r.type_tag, &payload))
}

/// The persistence layer the executor writes through. A `Replica` is also an
/// `ObjectStore` since it can answer fetches against its own current rows.
pub trait Replica: ObjectStore {
    /// Begin the single transactional scope the whole merge executes under.
    fn begin(&mut self) -> crate::error::Result<()>;

    fn insert(&mut self, r: &ObjRef, payload: &serde_json::Value) -> crate::error::Result<()>;

    fn update(&mut self, r: &ObjRef, delta: &serde_json::Value) -> crate::error::Result<()>;

    fn delete(&mut self, r: &ObjRef) -> crate::error::Result<()>;

    fn commit(&mut self) -> crate::error::Result<()>;

    fn rollback(&mut self) -> crate::error::Result<()>;

    /// Advance the replica's local version marker once the remote operation
    /// set has committed.
    fn advance_version(&mut self, version: &str) -> crate::error::Result<()>;

    /// `(ref, constraint value tuple)` for every active (non-deleted) object
    /// of `collection`, used by the unique-constraint checker's
    /// post-execution projection.
    fn scan_unique(
        &self,
        collection: &CollectionName,
        fields: &[String],
    ) -> Vec<(ObjRef, Vec<serde_json::Value>)>;
}
