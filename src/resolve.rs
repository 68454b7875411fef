//! The fixed conflict-resolution strategy.
//!
//! The node's operations win over the server's except where doing so would
//! destroy data still referenced by the other side. Resolution rewrites both
//! journals and the remote execution set; it never touches the database.

use crate::conflict::ConflictSets;
use crate::error::{MergeError, Result, StoreSide};
use crate::op::{Journal, Op, ObjRef, OpKind};
use crate::schema::Schema;
use crate::store::{ObjectStore, Replica};
use crate::{CollectionName, PrimaryKey};
use std::collections::HashMap;

/// The outcome of resolution: rewritten remote and local operation sets plus
/// a record of every rewrite made, for the `MergeReport`.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Remote operations to hand to the executor, in `sequence_no` order.
    pub remote_execution: Journal,
    /// The local journal after pruning reverted/confirmed entries and adding
    /// any reassertion ops produced by a dependency revert.
    pub local_journal: Journal,
    /// `(old, new)` primary-key remappings applied to insert-insert conflicts.
    pub pk_remappings: Vec<(ObjRef, ObjRef)>,
    /// Parent refs whose remote delete was dropped because a local child
    /// still depends on them.
    pub reverted_remote_deletes: Vec<ObjRef>,
    /// Parent refs whose local delete was undone because a remote child
    /// still depends on them.
    pub reverted_local_deletes: Vec<ObjRef>,
    /// Remote operations dropped from execution by direct-conflict rules.
    pub dropped_remote_ops: Vec<Op>,
}

pub fn resolve(
    schema: &Schema,
    local_store: &dyn Replica,
    message_store: &dyn ObjectStore,
    remote: &Journal,
    local: &Journal,
    conflicts: &ConflictSets,
) -> Result<Resolution> {
    let mut remote_execution: Vec<Op> = remote.clone();
    let mut local_journal: Vec<Op> = local.clone();
    let mut dropped_remote_ops = Vec::new();
    let mut reverted_remote_deletes = Vec::new();
    let mut reverted_local_deletes = Vec::new();
    let mut pk_remappings = Vec::new();

    // Rule 1a: dependency. Remote parent delete reverted; local journal gains
    // a reassertion insert so the next push tells the server the parent
    // still exists.
    for conflict in &conflicts.dependency {
        let parent = conflict.remote.obj_ref().clone();
        remove_op(&mut remote_execution, &conflict.remote, &mut dropped_remote_ops);
        reverted_remote_deletes.push(parent.clone());
        let snapshot = message_store.fetch(&parent).ok_or_else(|| MergeError::MessageIntegrity {
            detail: format!("missing snapshot for reverted parent {:?}", parent),
        })?;
        push_or_replace_insert(&mut local_journal, parent, snapshot, conflict.remote.sequence_no());
    }

    // Rule 1b: reversed dependency. Local parent delete reverted; the remote
    // execution set gains a compensating insert rebuilding the parent.
    for conflict in &conflicts.reversed_dependency {
        let parent = conflict.local.obj_ref().clone();
        remove_op_by_ref(&mut local_journal, &parent);
        reverted_local_deletes.push(parent.clone());
        let snapshot = message_store.fetch(&parent).ok_or_else(|| MergeError::MessageIntegrity {
            detail: format!("missing snapshot for reverted parent {:?}", parent),
        })?;
        // Prepended (sequence_no 0): the parent must execute before any
        // remote op on a child that depends on it.
        push_or_replace_insert(&mut remote_execution, parent, snapshot, 0);
    }

    // Rules 2/3/5: direct conflicts.
    for conflict in &conflicts.direct {
        let (r, l) = (&conflict.remote, &conflict.local);
        match (r.kind(), l.kind()) {
            (OpKind::Delete, OpKind::Delete) => {
                // Rule 5: delete-delete is a confirmed no-op.
                remove_op(&mut remote_execution, r, &mut dropped_remote_ops);
                remove_op_by_ref(&mut local_journal, l.obj_ref());
            }
            (OpKind::Delete, OpKind::Update) => {
                // Rule 2: remote delete suppressed; local update stays pending.
                remove_op(&mut remote_execution, r, &mut dropped_remote_ops);
            }
            (OpKind::Update, OpKind::Delete) => {
                // Rule 2: local delete reverted; remote update materializes
                // the row since the replica no longer has it.
                remove_op_by_ref(&mut local_journal, l.obj_ref());
                reverted_local_deletes.push(l.obj_ref().clone());
                // Prepended (sequence_no 0): the row must be materialized
                // before any other remote op that might depend on it.
                replace_remote_op(
                    &mut remote_execution,
                    r,
                    Op::Insert {
                        obj_ref: r.obj_ref().clone(),
                        sequence_no: 0,
                        payload: r.payload().cloned().unwrap_or_else(|| serde_json::json!({})),
                    },
                );
            }
            (OpKind::Update, OpKind::Update) => {
                // Rule 3: local wins; the remote update is dropped.
                remove_op(&mut remote_execution, r, &mut dropped_remote_ops);
            }
            _ => {}
        }
    }

    // Rule 4: insert-insert. Rewrite the remote insert's primary key and
    // propagate the remap through every other remote op in this merge. A
    // per-table high-water mark is threaded across conflicts so that two
    // insert-insert collisions on the same table mint distinct keys rather
    // than both landing on `max_pk + 1`.
    let mut next_pk: HashMap<CollectionName, PrimaryKey> = HashMap::new();
    for conflict in &conflicts.insert {
        let old_ref = conflict.remote.obj_ref().clone();
        let high_water = next_pk
            .entry(old_ref.type_tag.clone())
            .or_insert_with(|| local_store.max_pk(&old_ref.type_tag));
        *high_water += 1;
        let new_ref = old_ref.with_pk(*high_water);
        pk_remappings.push((old_ref.clone(), new_ref.clone()));

        for op in remote_execution.iter_mut() {
            if op.obj_ref() == &old_ref {
                *op = op.retargeted(new_ref.clone());
            }
        }
        remap_fk_payloads(schema, &mut remote_execution, &old_ref, &new_ref);
    }

    remote_execution.sort();
    local_journal.sort();

    Ok(Resolution {
        remote_execution,
        local_journal,
        pk_remappings,
        reverted_remote_deletes,
        reverted_local_deletes,
        dropped_remote_ops,
    })
}

fn remove_op(ops: &mut Vec<Op>, target: &Op, dropped: &mut Vec<Op>) {
    if let Some(pos) = ops.iter().position(|op| op == target) {
        dropped.push(ops.remove(pos));
    }
}

fn remove_op_by_ref(ops: &mut Vec<Op>, r: &ObjRef) {
    ops.retain(|op| op.obj_ref() != r);
}

fn replace_remote_op(ops: &mut Vec<Op>, old: &Op, new: Op) {
    if let Some(pos) = ops.iter().position(|op| op == old) {
        ops[pos] = new;
    }
}

/// Insert a reassertion op for `r`, replacing any existing op on `r` in the
/// target journal (there should be none in a compressed journal, but this
/// stays defensive).
fn push_or_replace_insert(journal: &mut Vec<Op>, r: ObjRef, payload: serde_json::Value, sequence_no: u64) {
    journal.retain(|op| op.obj_ref() != &r);
    journal.push(Op::Insert {
        obj_ref: r,
        sequence_no,
        payload,
    });
}

/// Rewrite any FK column in `ops`' payloads that points at `old_ref` to point
/// at `new_ref` instead, keeping the remote execution set internally
/// consistent after a primary-key remap.
fn remap_fk_payloads(schema: &Schema, ops: &mut [Op], old_ref: &ObjRef, new_ref: &ObjRef) {
    for op in ops.iter_mut() {
        if op.obj_ref() == new_ref {
            continue;
        }
        let type_tag = op.obj_ref().type_tag.clone();
        let Some(collection) = schema.get_collection(&type_tag) else {
            continue;
        };
        let fk_fields: Vec<String> = collection
            .foreign_keys
            .iter()
            .filter(|fk| fk.target_type_tag == old_ref.type_tag)
            .map(|fk| fk.field_name.clone())
            .collect();
        if fk_fields.is_empty() {
            continue;
        }
        match op {
            Op::Insert { payload, .. } => remap_fields(payload, &fk_fields, old_ref, new_ref),
            Op::Update { delta, .. } => remap_fields(delta, &fk_fields, old_ref, new_ref),
            Op::Delete { .. } => {}
        }
    }
}

fn remap_fields(value: &mut serde_json::Value, fields: &[String], old_ref: &ObjRef, new_ref: &ObjRef) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    for field in fields {
        if let Some(v) = obj.get(field) {
            if v.as_i64() == Some(old_ref.primary_key) {
                obj.insert(field.clone(), serde_json::json!(new_ref.primary_key));
            }
        }
    }
}
