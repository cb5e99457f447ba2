//! Property tests
//!
//! Two invariants get the randomized treatment: rollback leaves committed
//! state identical for any staged operation sequence, and transactions
//! over disjoint records commute.

use proptest::prelude::*;
use rivet::{Database, IndexDefinition, IndexKey, KeyType, RecordId, Value};
use std::collections::BTreeMap;

fn db_with_records(values: &[i64]) -> (Database, Vec<RecordId>) {
    let db = Database::new();
    db.create_index(IndexDefinition::not_unique("byValue", "value", KeyType::Int))
        .unwrap();
    let mut ids = Vec::new();
    for value in values {
        let mut tx = db.begin();
        let mut record = db.new_record(1);
        record.set("value", *value);
        let temp = record.id();
        db.save(&mut tx, &record).unwrap();
        ids.push(db.commit(&mut tx).unwrap().bound(temp).unwrap());
    }
    (db, ids)
}

/// Committed index entries plus per-record version and fields
fn observable_state(db: &Database) -> Vec<(IndexKey, RecordId, u64, BTreeMap<String, Value>)> {
    db.range("byValue", None, None, (true, true))
        .unwrap()
        .map(|(key, id)| {
            let record = db.load_committed(id).unwrap().unwrap();
            (key, id, record.version(), record.fields().clone())
        })
        .collect()
}

/// One staged operation against a pool of pre-committed records
#[derive(Debug, Clone)]
enum Op {
    Create(i64),
    Update(usize, i64),
    Delete(usize),
}

fn op_strategy(pool: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..50).prop_map(Op::Create),
        (0..pool, 0i64..50).prop_map(|(i, v)| Op::Update(i, v)),
        (0..pool).prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rollback_is_invisible_for_any_operation_sequence(
        seed in proptest::collection::vec(0i64..20, 3..8),
        ops in proptest::collection::vec(op_strategy(3), 0..20),
    ) {
        let (db, ids) = db_with_records(&seed);
        let before = observable_state(&db);

        let mut tx = db.begin();
        for op in ops {
            // individual operations may fail (stale staged deletes); the
            // property only cares that nothing leaks out of the rollback
            let _ = match op {
                Op::Create(value) => {
                    let mut record = db.new_record(1);
                    record.set("value", value);
                    db.save(&mut tx, &record)
                }
                Op::Update(i, value) => {
                    match db.load(&tx, ids[i % ids.len()]) {
                        Ok(Some(mut record)) => {
                            record.set("value", value);
                            db.save(&mut tx, &record)
                        }
                        _ => Ok(()),
                    }
                }
                Op::Delete(i) => {
                    match db.load(&tx, ids[i % ids.len()]) {
                        Ok(Some(record)) => db.delete(&mut tx, &record),
                        _ => Ok(()),
                    }
                }
            };
        }
        db.rollback(&mut tx).unwrap();

        prop_assert_eq!(observable_state(&db), before);
    }

    #[test]
    fn disjoint_transactions_commute(
        updates_a in proptest::collection::vec(0i64..100, 1..5),
        updates_b in proptest::collection::vec(0i64..100, 1..5),
    ) {
        // two transactions updating disjoint record sets, applied in both
        // orders on identical databases, end in identical states
        let run = |a_first: bool| {
            let (db, ids) = db_with_records(&[1, 2, 3, 4, 5, 6]);
            let (pool_a, pool_b) = ids.split_at(3);

            let apply = |pool: &[RecordId], updates: &[i64]| {
                let mut tx = db.begin();
                for (i, value) in updates.iter().enumerate() {
                    let id = pool[i % pool.len()];
                    let mut record = db.load(&tx, id).unwrap().unwrap();
                    record.set("value", *value);
                    db.save(&mut tx, &record).unwrap();
                }
                db.commit(&mut tx).unwrap();
            };
            if a_first {
                apply(pool_a, &updates_a);
                apply(pool_b, &updates_b);
            } else {
                apply(pool_b, &updates_b);
                apply(pool_a, &updates_a);
            }
            observable_state(&db)
        };

        prop_assert_eq!(run(true), run(false));
    }
}
