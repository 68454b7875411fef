//! # Merge Engine
//!
//! A deterministic reconciliation engine for offline-first relational
//! database synchronization.
//!
//! This crate implements the hard part of a pull/push sync protocol: given a
//! node's journal of uncommitted local mutations and a server-emitted
//! message of remote operations, it produces the minimal set of database
//! writes that reconciles the two, resolving conflicts by a single fixed
//! strategy rather than asking a caller to choose one.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of the network or the wire
//!   protocol that delivers a [`merge::Message`]; it only consumes the
//!   [`store::ObjectStore`] and [`store::Replica`] traits.
//! - **Deterministic**: the same `(replica state, local journal, message)`
//!   always produces the same [`report::MergeReport`] and post-state.
//! - **Atomic**: either every effect of a merge commits, or none do.
//!
//! ## Core Concepts
//!
//! ### Operations
//!
//! Changes are expressed as [`op::Op`] values -- insert, update, or delete of
//! an [`op::ObjRef`] -- carried in an ordered [`op::Journal`]. Two journals
//! matter to a merge: the node's local journal of not-yet-pushed mutations,
//! and the remote message's operations since the last sync.
//!
//! ### Compression
//!
//! Before conflicts are detected, each journal is collapsed to at most one
//! operation per object by [`compress::compress_local`] and
//! [`compress::compress_remote`] -- two distinct pattern-rewrite dialects,
//! since local history has no PK recycling and remote history is
//! multi-origin.
//!
//! ### Conflict detection and resolution
//!
//! [`conflict::detect`] produces four disjoint conflict sets (direct,
//! dependency, reversed-dependency, insert); [`resolve::resolve`] applies a
//! single fixed strategy to all four, rewriting both journals and the remote
//! execution set. There is no user-selectable strategy.
//!
//! ### Execution
//!
//! [`execute::execute`] applies the resolved remote operations to a
//! [`store::Replica`] inside one transactional scope, with
//! [`unique::check_and_resolve`] guarding against constraint collisions that
//! compression can hide.
//!
//! ## Quick Start
//!
//! ```rust
//! use merge_engine::{Schema, memory::MemoryStore, merge::{merge, Message}, op::{Op, ObjRef}};
//! use serde_json::json;
//!
//! let schema = Schema::new();
//! let mut replica = MemoryStore::new();
//! let message_store = MemoryStore::new();
//!
//! let message = Message {
//!     operations: vec![Op::Insert {
//!         obj_ref: ObjRef::new("users", 1),
//!         sequence_no: 1,
//!         payload: json!({"name": "Alice"}),
//!     }],
//!     snapshots: &message_store,
//!     target_version: "v1".to_string(),
//! };
//!
//! let (report, pruned_local_journal) = merge(&[], &message, &schema, &mut replica).unwrap();
//! assert!(pruned_local_journal.is_empty());
//! assert_eq!(report.new_version, "v1");
//! ```

pub mod compress;
pub mod conflict;
pub mod error;
pub mod execute;
pub mod memory;
pub mod merge;
pub mod op;
pub mod report;
pub mod resolve;
pub mod schema;
pub mod store;
pub mod unique;

// Re-export main types at crate root
pub use error::{MergeError, Result};
pub use merge::{merge, Message};
pub use op::{group_by_ref, Journal, Op, ObjRef, OpKind};
pub use report::MergeReport;
pub use schema::{CollectionSchema, ForeignKeyDef, Schema, UniqueConstraintDef};
pub use store::{ObjectStore, Replica};

/// Type aliases for clarity.
pub type CollectionName = String;
/// A row's primary key within its collection. Modeled as a signed integer
/// since insert-insert resolution (see [`resolve`]) remaps it arithmetically.
pub type PrimaryKey = i64;
/// Monotonic per-journal order; operations carry no other timestamp.
pub type SequenceNo = u64;
