//! Conflict detection: the four disjoint conflict sets of `PURPOSE & SCOPE`.

use crate::error::{MergeError, Result, StoreSide};
use crate::op::{Op, OpKind};
use crate::schema::Schema;
use crate::store::{ObjectStore, Replica};

/// One detected conflict: the remote operation and the local operation whose
/// interaction requires resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub remote: Op,
    pub local: Op,
}

/// The four disjoint conflict categories, computed once per merge.
#[derive(Debug, Clone, Default)]
pub struct ConflictSets {
    pub direct: Vec<Conflict>,
    pub dependency: Vec<Conflict>,
    pub reversed_dependency: Vec<Conflict>,
    pub insert: Vec<Conflict>,
}

impl ConflictSets {
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
            && self.dependency.is_empty()
            && self.reversed_dependency.is_empty()
            && self.insert.is_empty()
    }
}

fn is_kind(op: &Op, kinds: &[OpKind]) -> bool {
    kinds.contains(&op.kind())
}

/// Detect all four conflict sets between a compressed remote journal and a
/// compressed local journal.
pub fn detect(
    schema: &Schema,
    local_store: &dyn Replica,
    message_store: &dyn ObjectStore,
    remote: &[Op],
    local: &[Op],
) -> Result<ConflictSets> {
    let mut sets = ConflictSets::default();

    for r in remote {
        for l in local {
            if r.obj_ref() != l.obj_ref() {
                continue;
            }
            if is_kind(r, &[OpKind::Update, OpKind::Delete])
                && is_kind(l, &[OpKind::Update, OpKind::Delete])
            {
                sets.direct.push(Conflict {
                    remote: r.clone(),
                    local: l.clone(),
                });
            }
            if r.kind() == OpKind::Insert && l.kind() == OpKind::Insert {
                sets.insert.push(Conflict {
                    remote: r.clone(),
                    local: l.clone(),
                });
            }
        }
    }

    // Dependency: remote delete of a parent vs. a local insert/update of a
    // child whose FK points at that parent. The child is fetched from the
    // local DB because the local op's effect lives there.
    for r in remote.iter().filter(|op| op.kind() == OpKind::Delete) {
        for l in local
            .iter()
            .filter(|op| matches!(op.kind(), OpKind::Insert | OpKind::Update))
        {
            let child_payload = local_store.fetch(l.obj_ref()).ok_or_else(|| MergeError::FetchMissing {
                side: StoreSide::Local,
                obj_ref: l.obj_ref().clone(),
            })?;
            let neighbors = schema.fk_neighbors(&l.obj_ref().type_tag, &child_payload);
            if neighbors.contains(r.obj_ref()) {
                sets.dependency.push(Conflict {
                    remote: r.clone(),
                    local: l.clone(),
                });
            }
        }
    }

    // Reversed dependency: remote insert/update of a child vs. a local delete
    // of the parent it points at. The child is fetched from the message
    // snapshot store because the remote op's post-state lives there.
    for r in remote
        .iter()
        .filter(|op| matches!(op.kind(), OpKind::Insert | OpKind::Update))
    {
        for l in local.iter().filter(|op| op.kind() == OpKind::Delete) {
            let child_payload = message_store.fetch(r.obj_ref()).ok_or_else(|| MergeError::MessageIntegrity {
                detail: format!("missing snapshot for {:?} needed for FK evaluation", r.obj_ref()),
            })?;
            let neighbors = schema.fk_neighbors(&r.obj_ref().type_tag, &child_payload);
            if neighbors.contains(l.obj_ref()) {
                sets.reversed_dependency.push(Conflict {
                    remote: r.clone(),
                    local: l.clone(),
                });
            }
        }
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::op::ObjRef;
    use crate::schema::{CollectionSchema, ForeignKeyDef};
    use serde_json::json;

    fn schema_with_fk() -> Schema {
        Schema::new().with_collection(
            CollectionSchema::new("comments").with_foreign_key(ForeignKeyDef::new("post_id", "posts")),
        )
    }

    #[test]
    fn direct_conflict_on_update_update() {
        let schema = Schema::new();
        let local_store = MemoryStore::new();
        let message_store = MemoryStore::new();
        let remote = vec![Op::Update {
            obj_ref: ObjRef::new("users", 1),
            sequence_no: 1,
            delta: json!({}),
        }];
        let local = vec![Op::Update {
            obj_ref: ObjRef::new("users", 1),
            sequence_no: 1,
            delta: json!({}),
        }];
        let sets = detect(&schema, &local_store, &message_store, &remote, &local).unwrap();
        assert_eq!(sets.direct.len(), 1);
        assert!(sets.dependency.is_empty());
    }

    #[test]
    fn insert_conflict_on_matching_ref() {
        let schema = Schema::new();
        let local_store = MemoryStore::new();
        let message_store = MemoryStore::new();
        let remote = vec![Op::Insert {
            obj_ref: ObjRef::new("users", 7),
            sequence_no: 1,
            payload: json!({}),
        }];
        let local = vec![Op::Insert {
            obj_ref: ObjRef::new("users", 7),
            sequence_no: 1,
            payload: json!({}),
        }];
        let sets = detect(&schema, &local_store, &message_store, &remote, &local).unwrap();
        assert_eq!(sets.insert.len(), 1);
    }

    #[test]
    fn dependency_conflict_when_local_child_points_at_remote_deleted_parent() {
        let schema = schema_with_fk();
        let mut local_store = MemoryStore::new();
        local_store.seed(ObjRef::new("comments", 10), json!({"post_id": 1}));
        let message_store = MemoryStore::new();

        let remote = vec![Op::Delete {
            obj_ref: ObjRef::new("posts", 1),
            sequence_no: 1,
        }];
        let local = vec![Op::Insert {
            obj_ref: ObjRef::new("comments", 10),
            sequence_no: 1,
            payload: json!({"post_id": 1}),
        }];

        let sets = detect(&schema, &local_store, &message_store, &remote, &local).unwrap();
        assert_eq!(sets.dependency.len(), 1);
    }

    #[test]
    fn dependency_detection_fails_fatally_on_missing_local_fetch() {
        let schema = schema_with_fk();
        let local_store = MemoryStore::new(); // comment row not seeded
        let message_store = MemoryStore::new();

        let remote = vec![Op::Delete {
            obj_ref: ObjRef::new("posts", 1),
            sequence_no: 1,
        }];
        let local = vec![Op::Insert {
            obj_ref: ObjRef::new("comments", 10),
            sequence_no: 1,
            payload: json!({"post_id": 1}),
        }];

        let result = detect(&schema, &local_store, &message_store, &remote, &local);
        assert!(matches!(
            result,
            Err(MergeError::FetchMissing { side: StoreSide::Local, .. })
        ));
    }

    #[test]
    fn reversed_dependency_when_remote_child_points_at_locally_deleted_parent() {
        let schema = schema_with_fk();
        let local_store = MemoryStore::new();
        let mut message_store = MemoryStore::new();
        message_store.seed(ObjRef::new("comments", 10), json!({"post_id": 1}));

        let remote = vec![Op::Update {
            obj_ref: ObjRef::new("comments", 10),
            sequence_no: 1,
            delta: json!({"post_id": 1}),
        }];
        let local = vec![Op::Delete {
            obj_ref: ObjRef::new("posts", 1),
            sequence_no: 1,
        }];

        let sets = detect(&schema, &local_store, &message_store, &remote, &local).unwrap();
        assert_eq!(sets.reversed_dependency.len(), 1);
    }
}
