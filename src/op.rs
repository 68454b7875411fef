//! Operation algebra: references, operations, and per-object sequences.
//!
//! Operations are opaque except for identity `(ref, kind, sequence_no)`; payload
//! content never participates in equality or ordering.

use crate::{CollectionName, PrimaryKey, SequenceNo};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Reference to a single row: its collection (type tag) and primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjRef {
    pub type_tag: CollectionName,
    pub primary_key: PrimaryKey,
}

impl ObjRef {
    pub fn new(type_tag: impl Into<CollectionName>, primary_key: PrimaryKey) -> Self {
        Self {
            type_tag: type_tag.into(),
            primary_key,
        }
    }

    /// Return a copy of this reference pointed at a different primary key.
    pub fn with_pk(&self, primary_key: PrimaryKey) -> Self {
        Self {
            type_tag: self.type_tag.clone(),
            primary_key,
        }
    }
}

/// Discriminant of an operation's kind, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Insert => write!(f, "i"),
            OpKind::Update => write!(f, "u"),
            OpKind::Delete => write!(f, "d"),
        }
    }
}

/// A single operation against an object. Payload is opaque JSON; only `Insert`
/// and `Update` carry one. `Update` payloads are deltas (changed fields only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Op {
    Insert {
        #[serde(rename = "ref")]
        obj_ref: ObjRef,
        sequence_no: SequenceNo,
        payload: serde_json::Value,
    },
    Update {
        #[serde(rename = "ref")]
        obj_ref: ObjRef,
        sequence_no: SequenceNo,
        delta: serde_json::Value,
    },
    Delete {
        #[serde(rename = "ref")]
        obj_ref: ObjRef,
        sequence_no: SequenceNo,
    },
}

impl Op {
    pub fn obj_ref(&self) -> &ObjRef {
        match self {
            Op::Insert { obj_ref, .. } => obj_ref,
            Op::Update { obj_ref, .. } => obj_ref,
            Op::Delete { obj_ref, .. } => obj_ref,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Op::Insert { .. } => OpKind::Insert,
            Op::Update { .. } => OpKind::Update,
            Op::Delete { .. } => OpKind::Delete,
        }
    }

    pub fn sequence_no(&self) -> SequenceNo {
        match self {
            Op::Insert { sequence_no, .. } => *sequence_no,
            Op::Update { sequence_no, .. } => *sequence_no,
            Op::Delete { sequence_no, .. } => *sequence_no,
        }
    }

    /// Payload carried by `Insert`/`Update`; `None` for `Delete`.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Op::Insert { payload, .. } => Some(payload),
            Op::Update { delta, .. } => Some(delta),
            Op::Delete { .. } => None,
        }
    }

    /// Return a copy of this operation retargeted at a different reference,
    /// used by insert-insert primary-key remapping.
    pub fn retargeted(&self, new_ref: ObjRef) -> Op {
        match self {
            Op::Insert {
                sequence_no,
                payload,
                ..
            } => Op::Insert {
                obj_ref: new_ref,
                sequence_no: *sequence_no,
                payload: payload.clone(),
            },
            Op::Update {
                sequence_no, delta, ..
            } => Op::Update {
                obj_ref: new_ref,
                sequence_no: *sequence_no,
                delta: delta.clone(),
            },
            Op::Delete { sequence_no, .. } => Op::Delete {
                obj_ref: new_ref,
                sequence_no: *sequence_no,
            },
        }
    }
}

/// Identity of an operation excludes payload: `(ref, kind, sequence_no)`.
impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        self.obj_ref() == other.obj_ref()
            && self.kind() == other.kind()
            && self.sequence_no() == other.sequence_no()
    }
}
impl Eq for Op {}

/// Journal order is by `sequence_no` alone.
impl PartialOrd for Op {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Op {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence_no().cmp(&other.sequence_no())
    }
}

/// An ordered operation log. Order is by `sequence_no`; callers are expected to
/// hand the compressor and detector journals already sorted, but sorting here
/// is cheap insurance against out-of-order construction.
pub type Journal = Vec<Op>;

/// Return ops in `journal` grouped by `ObjRef`, each group's ops kept in
/// ascending `sequence_no` order.
pub fn group_by_ref(journal: &[Op]) -> std::collections::BTreeMap<ObjRef, Vec<Op>> {
    let mut groups: std::collections::BTreeMap<ObjRef, Vec<Op>> = std::collections::BTreeMap::new();
    for op in journal {
        groups.entry(op.obj_ref().clone()).or_default().push(op.clone());
    }
    for group in groups.values_mut() {
        group.sort();
    }
    groups
}
