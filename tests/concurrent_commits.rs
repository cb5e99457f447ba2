//! Concurrent transactions
//!
//! Transactions over disjoint records and keys all succeed regardless of
//! interleaving; transactions racing over one unique key yield exactly one
//! winner; write contention on one record resolves through caller-side
//! retry on `Conflict`.

use rivet::{
    Database, Error, IndexDefinition, IndexKey, KeyType, RecordId, RetryPolicy, Value,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Barrier;
use std::time::Duration;

fn db_with_value_index() -> Database {
    let db = Database::new();
    db.create_index(IndexDefinition::not_unique("byValue", "value", KeyType::Int))
        .unwrap();
    db
}

fn insert_value(db: &Database, value: i64) -> RecordId {
    let mut tx = db.begin();
    let mut record = db.new_record(1);
    record.set("value", value);
    let temp = record.id();
    db.save(&mut tx, &record).unwrap();
    db.commit(&mut tx).unwrap().bound(temp).unwrap()
}

// ============================================================================
// Disjoint writes never conflict
// ============================================================================

#[test]
fn disjoint_transactions_all_succeed() {
    const THREADS: i64 = 8;
    const PER_THREAD: i64 = 10;

    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = db_with_value_index();
    let barrier = Barrier::new(THREADS as usize);

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let db = &db;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let mut tx = db.begin();
                for i in 0..PER_THREAD {
                    let mut record = db.new_record(1);
                    record.set("value", t * 1000 + i);
                    db.save(&mut tx, &record).unwrap();
                }
                // no retry needed: the write sets are disjoint
                db.commit(&mut tx).unwrap();
            });
        }
    });

    assert_eq!(db.record_count(), (THREADS * PER_THREAD) as usize);
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            let key = IndexKey::from(t * 1000 + i);
            assert_eq!(db.get("byValue", &key).unwrap().count(), 1);
        }
    }
}

#[test]
fn disjoint_updates_commute_across_orders() {
    // the same two transactions, committed in either order, land on the
    // same final state
    let run = |first_is_a: bool| {
        let db = db_with_value_index();
        let a = insert_value(&db, 1);
        let b = insert_value(&db, 2);

        let update = |id: RecordId, value: i64| {
            let mut tx = db.begin();
            let mut record = db.load(&tx, id).unwrap().unwrap();
            record.set("value", value);
            db.save(&mut tx, &record).unwrap();
            db.commit(&mut tx).unwrap();
        };
        if first_is_a {
            update(a, 10);
            update(b, 20);
        } else {
            update(b, 20);
            update(a, 10);
        }

        let keys: Vec<IndexKey> = db.keys("byValue").unwrap().collect();
        let versions = (
            db.metadata(&a).unwrap().version,
            db.metadata(&b).unwrap().version,
        );
        (keys, versions)
    };

    assert_eq!(run(true), run(false));
}

// ============================================================================
// Unique key races
// ============================================================================

#[test]
fn unique_key_race_has_exactly_one_winner() {
    const THREADS: usize = 8;

    let db = Database::new();
    db.create_index(IndexDefinition::unique("uniq", "value", KeyType::Int))
        .unwrap();

    let barrier = Barrier::new(THREADS);
    let wins = AtomicU32::new(0);
    let duplicates = AtomicU32::new(0);

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let db = &db;
            let barrier = &barrier;
            let wins = &wins;
            let duplicates = &duplicates;
            scope.spawn(move || {
                barrier.wait();
                let mut tx = db.begin();
                let mut record = db.new_record(1);
                record.set("value", 42i64);
                let result = db
                    .save(&mut tx, &record)
                    .and_then(|()| db.commit(&mut tx).map(|_| ()));
                match result {
                    Ok(()) => {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Error::DuplicateKey { .. }) => {
                        duplicates.fetch_add(1, Ordering::SeqCst);
                        if tx.is_open() {
                            db.rollback(&mut tx).unwrap();
                        }
                    }
                    Err(other) => panic!("unexpected error: {other:?}"),
                }
            });
        }
    });

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(duplicates.load(Ordering::SeqCst), THREADS as u32 - 1);
    assert_eq!(db.get("uniq", &IndexKey::from(42)).unwrap().count(), 1);
}

// ============================================================================
// Contended record with caller-side retry
// ============================================================================

#[test]
fn contended_increments_converge_with_retry() {
    const THREADS: u64 = 4;
    const INCREMENTS: u64 = 20;

    let db = db_with_value_index();
    let id = insert_value(&db, 0);
    let barrier = Barrier::new(THREADS as usize);
    let policy = RetryPolicy {
        attempts: 50,
        base_delay: Duration::from_millis(1),
    };

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let db = &db;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for _ in 0..INCREMENTS {
                    db.run_with_retry(policy, |tx| {
                        let mut record = db.load(tx, id)?.ok_or(Error::StaleRecordId(id))?;
                        let current = match record.field("value") {
                            Some(Value::Int(v)) => *v,
                            other => panic!("unexpected field {other:?}"),
                        };
                        record.set("value", current + 1);
                        db.save(tx, &record)
                    })
                    .unwrap();
                }
            });
        }
    });

    let record = db.load_committed(id).unwrap().unwrap();
    assert_eq!(
        record.field("value"),
        Some(&Value::Int((THREADS * INCREMENTS) as i64))
    );
    // one version bump per successful commit
    assert_eq!(record.version(), THREADS * INCREMENTS);
}
