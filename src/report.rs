//! The outcome of a successful merge.

use crate::op::{Op, ObjRef};

/// Summary of everything a merge did, returned to the caller on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// `(old, new)` primary keys rewritten by insert-insert resolution.
    pub pk_remappings: Vec<(ObjRef, ObjRef)>,
    /// Parent refs whose remote delete was dropped because a local child
    /// still depended on them.
    pub reverted_remote_deletes: Vec<ObjRef>,
    /// Parent refs whose local delete was undone because a remote child
    /// still depended on them.
    pub reverted_local_deletes: Vec<ObjRef>,
    /// Remote operations dropped from execution by the resolver.
    pub dropped_remote_ops: Vec<Op>,
    /// Count of local per-object sequences the compressor couldn't match and
    /// passed through unchanged.
    pub local_warning_count: usize,
    /// The version identifier the replica advanced to.
    pub new_version: String,
}
