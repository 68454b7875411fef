//! Executes the resolved remote operation set against the replica inside a
//! single transactional scope. All-or-nothing: on any failure the
//! transaction rolls back and no local journal changes are committed either.

use crate::error::Result;
use crate::op::{Journal, Op};
use crate::store::Replica;

pub fn execute(replica: &mut dyn Replica, ops: &Journal, new_version: &str) -> Result<()> {
    replica.begin()?;

    for op in ops {
        let outcome = match op {
            Op::Insert { obj_ref, payload, .. } => replica.insert(obj_ref, payload),
            Op::Update { obj_ref, delta, .. } => replica.update(obj_ref, delta),
            Op::Delete { obj_ref, .. } => replica.delete(obj_ref),
        };
        if let Err(err) = outcome {
            replica.rollback()?;
            return Err(err);
        }
    }

    if let Err(err) = replica.advance_version(new_version) {
        replica.rollback()?;
        return Err(err);
    }

    replica.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::op::ObjRef;
    use crate::store::ObjectStore;
    use serde_json::json;

    #[test]
    fn execute_applies_all_ops_and_advances_version() {
        let mut replica = MemoryStore::new();
        let ops = vec![
            Op::Insert {
                obj_ref: ObjRef::new("users", 1),
                sequence_no: 1,
                payload: json!({"name": "Alice"}),
            },
            Op::Insert {
                obj_ref: ObjRef::new("users", 2),
                sequence_no: 2,
                payload: json!({"name": "Bob"}),
            },
        ];
        execute(&mut replica, &ops, "v2").unwrap();
        assert_eq!(replica.fetch(&ObjRef::new("users", 1)), Some(json!({"name": "Alice"})));
        assert_eq!(replica.version(), "v2");
    }

    #[test]
    fn execute_rolls_back_fully_on_failure() {
        let mut replica = MemoryStore::new();
        replica.seed(ObjRef::new("users", 1), json!({"name": "Alice"}));

        let ops = vec![
            Op::Update {
                obj_ref: ObjRef::new("users", 1),
                sequence_no: 1,
                delta: json!({"name": "Updated"}),
            },
            // Update against a nonexistent row fails.
            Op::Update {
                obj_ref: ObjRef::new("users", 99),
                sequence_no: 2,
                delta: json!({"name": "Ghost"}),
            },
        ];

        let result = execute(&mut replica, &ops, "v2");
        assert!(result.is_err());
        assert_eq!(replica.fetch(&ObjRef::new("users", 1)), Some(json!({"name": "Alice"})));
        assert_eq!(replica.version(), "");
    }
}
