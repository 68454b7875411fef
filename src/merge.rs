//! The merge entry point: orchestrates compression, conflict detection,
//! resolution, unique-constraint checking, and execution.

use crate::compress::{compress_local, compress_remote};
use crate::conflict::detect;
use crate::error::Result;
use crate::op::Journal;
use crate::report::MergeReport;
use crate::resolve::resolve;
use crate::schema::Schema;
use crate::store::{ObjectStore, Replica};
use crate::unique::check_and_resolve;

/// A server-emitted message: the remote operations since this node's last
/// sync, plus a snapshot store of every object the detector might need to
/// fetch, and the version the replica should advance to on success.
pub struct Message<'a> {
    pub operations: Journal,
    pub snapshots: &'a dyn ObjectStore,
    pub target_version: String,
}

/// Reconcile `local_journal` against `message` and, on success, apply the
/// result to `replica`. Either every effect commits and the journal is
/// pruned, or nothing happens and a typed error is returned.
pub fn merge(local_journal: &Journal, message: &Message<'_>, schema: &Schema, replica: &mut dyn Replica) -> Result<(MergeReport, Journal)> {
    let local_compressed = compress_local(local_journal);
    let remote_compressed = compress_remote(&message.operations);

    let conflicts = detect(
        schema,
        &*replica,
        message.snapshots,
        &remote_compressed.journal,
        &local_compressed.journal,
    )?;

    let resolution = resolve(
        schema,
        &*replica,
        message.snapshots,
        &remote_compressed.journal,
        &local_compressed.journal,
        &conflicts,
    )?;

    let mut remote_execution = resolution.remote_execution;
    check_and_resolve(schema, &*replica, &mut remote_execution)?;

    crate::execute::execute(replica, &remote_execution, &message.target_version)?;

    let report = MergeReport {
        pk_remappings: resolution.pk_remappings,
        reverted_remote_deletes: resolution.reverted_remote_deletes,
        reverted_local_deletes: resolution.reverted_local_deletes,
        dropped_remote_ops: resolution.dropped_remote_ops,
        local_warning_count: local_compressed.warnings.len(),
        new_version: message.target_version.clone(),
    };

    Ok((report, resolution.local_journal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::op::{Op, ObjRef};
    use crate::schema::{CollectionSchema, ForeignKeyDef};
    use serde_json::json;

    #[test]
    fn empty_remote_message_is_a_no_op_and_preserves_local_journal() {
        let schema = Schema::new();
        let mut replica = MemoryStore::new();
        replica.seed(ObjRef::new("users", 1), json!({"name": "Alice"}));

        let local_journal = vec![Op::Update {
            obj_ref: ObjRef::new("users", 1),
            sequence_no: 1,
            delta: json!({"name": "Alice 2"}),
        }];

        let message_store = MemoryStore::new();
        let message = Message {
            operations: vec![],
            snapshots: &message_store,
            target_version: "v1".to_string(),
        };

        let (report, pruned_journal) = merge(&local_journal, &message, &schema, &mut replica).unwrap();
        assert!(report.pk_remappings.is_empty());
        assert_eq!(pruned_journal, local_journal);
        assert_eq!(replica.version(), "v1");
    }

    #[test]
    fn empty_local_journal_applies_remote_message_directly() {
        let schema = Schema::new();
        let mut replica = MemoryStore::new();
        let message_store = MemoryStore::new();

        let message = Message {
            operations: vec![Op::Insert {
                obj_ref: ObjRef::new("users", 1),
                sequence_no: 1,
                payload: json!({"name": "Alice"}),
            }],
            snapshots: &message_store,
            target_version: "v1".to_string(),
        };

        let (_report, pruned_journal) = merge(&[], &message, &schema, &mut replica).unwrap();
        assert!(pruned_journal.is_empty());
        assert_eq!(replica.fetch(&ObjRef::new("users", 1)), Some(json!({"name": "Alice"})));
    }

    #[test]
    fn dependency_conflict_reverts_remote_delete_end_to_end() {
        let schema = Schema::new().with_collection(
            CollectionSchema::new("comments").with_foreign_key(ForeignKeyDef::new("post_id", "posts")),
        );
        let mut replica = MemoryStore::new();
        replica.seed(ObjRef::new("posts", 1), json!({"title": "hi"}));

        let mut message_store = MemoryStore::new();
        message_store.seed(ObjRef::new("posts", 1), json!({"title": "hi"}));

        let local_journal = vec![Op::Insert {
            obj_ref: ObjRef::new("comments", 10),
            sequence_no: 1,
            payload: json!({"post_id": 1}),
        }];

        let message = Message {
            operations: vec![Op::Delete {
                obj_ref: ObjRef::new("posts", 1),
                sequence_no: 1,
            }],
            snapshots: &message_store,
            target_version: "v2".to_string(),
        };

        let (report, pruned_journal) = merge(&local_journal, &message, &schema, &mut replica).unwrap();
        assert_eq!(report.reverted_remote_deletes, vec![ObjRef::new("posts", 1)]);
        assert_eq!(replica.fetch(&ObjRef::new("posts", 1)), Some(json!({"title": "hi"})));
        assert!(pruned_journal
            .iter()
            .any(|op| op.obj_ref() == &ObjRef::new("posts", 1)));
    }

    #[test]
    fn insert_insert_conflict_remaps_remote_pk_end_to_end() {
        let schema = Schema::new();
        let mut replica = MemoryStore::new();
        replica.seed(ObjRef::new("posts", 12), json!({}));

        let message_store = MemoryStore::new();
        let local_journal = vec![Op::Insert {
            obj_ref: ObjRef::new("posts", 7),
            sequence_no: 1,
            payload: json!({"title": "local"}),
        }];
        let message = Message {
            operations: vec![Op::Insert {
                obj_ref: ObjRef::new("posts", 7),
                sequence_no: 1,
                payload: json!({"title": "remote"}),
            }],
            snapshots: &message_store,
            target_version: "v2".to_string(),
        };

        let (report, _pruned) = merge(&local_journal, &message, &schema, &mut replica).unwrap();
        assert_eq!(report.pk_remappings, vec![(ObjRef::new("posts", 7), ObjRef::new("posts", 13))]);
        assert_eq!(replica.fetch(&ObjRef::new("posts", 13)), Some(json!({"title": "remote"})));
    }
}
