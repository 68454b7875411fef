//! Journal compression: collapse a per-object operation sequence to at most
//! one operation, under one of two dialects.

use crate::op::{group_by_ref, Journal, Op, OpKind};

/// Outcome of compressing one journal: the compressed operations plus any
/// objects whose sequence didn't match a known pattern (local dialect only).
#[derive(Debug, Clone, Default)]
pub struct CompressResult {
    pub journal: Journal,
    pub warnings: Vec<Op>,
}

/// Compress a local journal. Unmatched sequences are passed through unchanged
/// and reported as warnings rather than failing the merge.
pub fn compress_local(journal: &Journal) -> CompressResult {
    let groups = group_by_ref(journal);
    let mut out = Journal::new();
    let mut warnings = Vec::new();

    for ops in groups.into_values() {
        match local_fold(&ops) {
            Some(LocalFold::Op(op)) => out.push(op),
            Some(LocalFold::Drop) => {}
            None => {
                let kinds: Vec<OpKind> = ops.iter().map(Op::kind).collect();
                tracing::warn!(
                    obj_ref = ?ops[0].obj_ref(),
                    sequence = ?kinds,
                    "unmatched local operation sequence; probable external intervention or PK recycling"
                );
                out.extend(ops.iter().cloned());
                warnings.extend(ops);
            }
        }
    }

    out.sort();
    CompressResult { journal: out, warnings }
}

enum LocalFold {
    Op(Op),
    Drop,
}

/// Merge a run of update deltas on top of a base JSON object, field by field.
fn fold_deltas(base: &serde_json::Value, deltas: &[&serde_json::Value]) -> serde_json::Value {
    let mut merged = base.clone();
    if let Some(merged_obj) = merged.as_object_mut() {
        for delta in deltas {
            if let Some(delta_obj) = delta.as_object() {
                for (k, v) in delta_obj {
                    merged_obj.insert(k.clone(), v.clone());
                }
            }
        }
    }
    merged
}

/// `i u*` -> `i` (payload folded); `i u* d` -> drop; `u u*` -> `u` (payload
/// folded); `u* d` -> `d`. The empty-`u*` case of the last pattern covers a
/// lone local delete. Patterns are checked in an order where each test is
/// only reached once the more specific ones above it have failed.
fn local_fold(ops: &[Op]) -> Option<LocalFold> {
    use OpKind::*;
    let kinds: Vec<OpKind> = ops.iter().map(Op::kind).collect();
    let last_idx = kinds.len() - 1;
    let obj_ref = ops[0].obj_ref().clone();
    let seq = ops.last().unwrap().sequence_no();

    // u* d (zero or more updates, terminated by a delete) - includes a lone
    // delete as the zero-update case.
    if kinds[last_idx] == Delete && kinds[..last_idx].iter().all(|k| *k == Update) {
        return Some(LocalFold::Op(Op::Delete { obj_ref, sequence_no: seq }));
    }

    // i u* (insert, possibly followed only by updates, no delete)
    if kinds[0] == Insert && kinds[1..].iter().all(|k| *k == Update) {
        let deltas: Vec<&serde_json::Value> =
            ops[1..].iter().filter_map(|op| op.payload()).collect();
        let payload = fold_deltas(ops[0].payload().unwrap(), &deltas);
        return Some(LocalFold::Op(Op::Insert {
            obj_ref,
            sequence_no: seq,
            payload,
        }));
    }

    // i u* d (insert, updates, then a delete)
    if kinds[0] == Insert && kinds[last_idx] == Delete && kinds[1..last_idx].iter().all(|k| *k == Update) {
        return Some(LocalFold::Drop);
    }

    // u u* (update, possibly followed only by more updates, no delete)
    if kinds[0] == Update && kinds[1..].iter().all(|k| *k == Update) {
        let deltas: Vec<&serde_json::Value> =
            ops[1..].iter().filter_map(|op| op.payload()).collect();
        let delta = fold_deltas(ops[0].payload().unwrap(), &deltas);
        return Some(LocalFold::Op(Op::Update {
            obj_ref,
            sequence_no: seq,
            delta,
        }));
    }

    None
}

/// Compress a remote journal. Reinsertion after deletion is permitted since
/// remote history is multi-origin.
pub fn compress_remote(journal: &Journal) -> CompressResult {
    let groups = group_by_ref(journal);
    let mut out = Journal::new();

    for ops in groups.into_values() {
        if let Some(folded) = remote_fold(&ops) {
            out.push(folded);
        }
    }

    out.sort();
    CompressResult {
        journal: out,
        warnings: Vec::new(),
    }
}

/// `i` -> i; `u` -> u; `d` -> d; `i .* d` -> drop; `i .* ~d` -> i (folded);
/// `u .* d` -> d; `u .* ~d` -> u (folded); `d .* d` -> d; `d .* ~d` -> u
/// (folded; a delete followed by a non-delete terminator is observationally a
/// reinsertion, but since the object already existed on this side of history
/// it folds to an update rather than an insert).
fn remote_fold(ops: &[Op]) -> Option<Op> {
    use OpKind::*;
    if ops.len() == 1 {
        return Some(ops[0].clone());
    }

    let obj_ref = ops[0].obj_ref().clone();
    let first = ops[0].kind();
    let last = ops.last().unwrap();
    let last_is_delete = last.kind() == Delete;
    let seq = last.sequence_no();
    let payload = last.payload().cloned().unwrap_or_else(|| serde_json::json!({}));

    match (first, last_is_delete) {
        (Insert, true) => None,
        (Insert, false) => Some(Op::Insert {
            obj_ref,
            sequence_no: seq,
            payload,
        }),
        (Update, true) => Some(Op::Delete {
            obj_ref,
            sequence_no: seq,
        }),
        (Update, false) => Some(Op::Update {
            obj_ref,
            sequence_no: seq,
            delta: payload,
        }),
        (Delete, true) => Some(Op::Delete {
            obj_ref,
            sequence_no: seq,
        }),
        (Delete, false) => Some(Op::Update {
            obj_ref,
            sequence_no: seq,
            delta: payload,
        }),
    }
}
