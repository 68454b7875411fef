//! Unique-constraint checking.
//!
//! Compression can hide an intermediate value a row passed through, so two
//! objects that never really collided can appear, after compression, to both
//! want the same unique value. This module distinguishes that artifact (a
//! same-journal value swap) from a genuine cross-origin collision, which is
//! always fatal.

use crate::error::{MergeError, Result};
use crate::op::{Journal, Op, ObjRef};
use crate::schema::{Schema, UniqueConstraintDef};
use crate::store::{ObjectStore, Replica};
use std::collections::HashMap;

/// Check every unique constraint touched by `ops` against the replica's
/// current active rows (excluding rows `ops` itself will change), rewriting
/// `ops` in place when a same-journal swap can be resolved through a
/// transaction-scoped temporary value.
pub fn check_and_resolve(schema: &Schema, replica: &dyn Replica, ops: &mut Journal) -> Result<()> {
    let collections: std::collections::BTreeSet<String> =
        ops.iter().map(|op| op.obj_ref().type_tag.clone()).collect();

    for collection in collections {
        for constraint in schema.unique_constraints(&collection) {
            check_constraint(schema, replica, ops, constraint)?;
        }
    }
    Ok(())
}

fn final_value(op: &Op, replica: &dyn Replica, constraint: &UniqueConstraintDef) -> Option<Vec<serde_json::Value>> {
    match op {
        Op::Insert { payload, .. } => constraint.extract(payload),
        Op::Update { obj_ref, delta, .. } => {
            let base = replica.fetch(obj_ref).unwrap_or_else(|| serde_json::json!({}));
            let mut merged = base;
            if let (Some(merged_obj), Some(delta_obj)) = (merged.as_object_mut(), delta.as_object()) {
                for (k, v) in delta_obj {
                    merged_obj.insert(k.clone(), v.clone());
                }
            }
            constraint.extract(&merged)
        }
        Op::Delete { .. } => None,
    }
}

fn check_constraint(
    schema: &Schema,
    replica: &dyn Replica,
    ops: &mut Journal,
    constraint: &UniqueConstraintDef,
) -> Result<()> {
    let touched: std::collections::BTreeSet<ObjRef> = ops
        .iter()
        .filter(|op| op.obj_ref().type_tag == constraint.collection)
        .map(|op| op.obj_ref().clone())
        .collect();

    let mut by_value: HashMap<Vec<serde_json::Value>, Vec<ObjRef>> = HashMap::new();

    for (r, value) in replica.scan_unique(&constraint.collection, &constraint.fields) {
        if touched.contains(&r) {
            continue;
        }
        by_value.entry(value).or_default().push(r);
    }

    let mut op_values: HashMap<ObjRef, Vec<serde_json::Value>> = HashMap::new();
    for op in ops.iter() {
        if op.obj_ref().type_tag != constraint.collection {
            continue;
        }
        if let Some(value) = final_value(op, replica, constraint) {
            by_value.entry(value.clone()).or_default().push(op.obj_ref().clone());
            op_values.insert(op.obj_ref().clone(), value);
        }
    }

    for (value, refs) in by_value.iter() {
        if refs.len() < 2 {
            continue;
        }
        if refs.len() == 2 && refs.iter().all(|r| op_values.contains_key(r)) {
            if try_resolve_swap(schema, replica, ops, constraint, &refs[0], &refs[1]) {
                continue;
            }
        }
        return Err(MergeError::UniqueConstraintCollision {
            constraint: constraint.name.clone(),
            refs: refs.clone(),
            values: value.clone(),
        });
    }

    Ok(())
}

/// A same-journal swap: `a`'s final value is `b`'s current value and vice
/// versa. Resolved by routing `a` through a transaction-scoped placeholder so
/// the replica never observes both rows holding the same value at once.
fn try_resolve_swap(
    _schema: &Schema,
    replica: &dyn Replica,
    ops: &mut Journal,
    constraint: &UniqueConstraintDef,
    a: &ObjRef,
    b: &ObjRef,
) -> bool {
    let a_pos = ops.iter().position(|op| op.obj_ref() == a);
    let b_pos = ops.iter().position(|op| op.obj_ref() == b);
    let (Some(a_pos), Some(b_pos)) = (a_pos, b_pos) else {
        return false;
    };
    if !matches!(ops[a_pos], Op::Update { .. }) || !matches!(ops[b_pos], Op::Update { .. }) {
        return false;
    }

    let a_final = final_value(&ops[a_pos], replica, constraint);
    let b_current = replica.fetch(b).and_then(|p| constraint.extract(&p));
    let b_final = final_value(&ops[b_pos], replica, constraint);
    let a_current = replica.fetch(a).and_then(|p| constraint.extract(&p));

    let is_true_swap = a_final == b_current && b_final == a_current && a_current != b_current;
    if !is_true_swap {
        return false;
    }

    let Op::Update { sequence_no, .. } = &ops[a_pos] else {
        return false;
    };
    let placeholder_seq = *sequence_no;
    let mut placeholder = serde_json::Map::new();
    for field in &constraint.fields {
        placeholder.insert(field.clone(), serde_json::Value::String(format!("__merge_tmp__{}", a.primary_key)));
    }
    let placeholder_op = Op::Update {
        obj_ref: a.clone(),
        sequence_no: placeholder_seq,
        delta: serde_json::Value::Object(placeholder),
    };
    ops.insert(a_pos, placeholder_op);
    true
}
