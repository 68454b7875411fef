//! Error taxonomy for the merge engine.

use crate::op::ObjRef;
use thiserror::Error;

/// Which object store a fetch was attempted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSide {
    /// The local replica.
    Local,
    /// The remote message's attached object snapshots.
    Message,
}

impl std::fmt::Display for StoreSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreSide::Local => write!(f, "local"),
            StoreSide::Message => write!(f, "message"),
        }
    }
}

/// All fatal failures a merge can surface. Every variant carries enough
/// context to reproduce the failure; none of them leave the replica or local
/// journal partially mutated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    /// A fetch needed to evaluate a conflict came back empty.
    #[error("fetch missing on {side} side for {obj_ref:?}")]
    FetchMissing { side: StoreSide, obj_ref: ObjRef },

    /// A unique constraint collided and could not be resolved by the scoped
    /// two-phase rewrite.
    #[error("unique constraint '{constraint}' collision on {refs:?}: {values:?}")]
    UniqueConstraintCollision {
        constraint: String,
        refs: Vec<ObjRef>,
        values: Vec<serde_json::Value>,
    },

    /// The replica rejected a write inside the executor's transaction.
    #[error("execution failed: {wrapped}")]
    ExecutionFailed { wrapped: String },

    /// The remote message referenced an object its own snapshots don't
    /// contain, or otherwise failed an internal consistency check.
    #[error("message integrity violation: {detail}")]
    MessageIntegrity { detail: String },

    /// An internal invariant the engine depends on did not hold. This always
    /// indicates a programmer error rather than bad input.
    #[error("internal invariant violated: {detail}")]
    Invariant { detail: String },
}

/// Result type for merge engine operations.
pub type Result<T> = std::result::Result<T, MergeError>;
