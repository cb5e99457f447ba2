//! Optimistic version checks
//!
//! Every record carries the version seen at load time; commit validates it
//! against the store before applying anything. The loser of a write race
//! gets `Conflict` and a fully rolled back transaction.

use rivet::{Database, Error, IndexDefinition, IndexKey, KeyType, RecordId, TransactionStatus, Value};

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
// First committer wins
// ============================================================================

#[test]
fn second_writer_of_the_same_version_conflicts() {
    let db = db_with_value_index();
    let id = insert_value(&db, 1);

    // both transactions load the record at the same version
    let mut t1 = db.begin();
    let mut t2 = db.begin();
    let mut r1 = db.load(&t1, id).unwrap().unwrap();
    let mut r2 = db.load(&t2, id).unwrap().unwrap();
    assert_eq!(r1.version(), r2.version());

    r1.set("value", 2i64);
    db.save(&mut t1, &r1).unwrap();
    r2.set("value", 3i64);
    db.save(&mut t2, &r2).unwrap();

    // the first commit succeeds and bumps the version by one
    db.commit(&mut t1).unwrap();
    assert_eq!(db.metadata(&id).unwrap().version, r1.version() + 1);

    // the second fails with a conflict naming both versions
    let err = db.commit(&mut t2).unwrap_err();
    match err {
        Error::Conflict {
            id: conflicted,
            expected,
            actual,
        } => {
            assert_eq!(conflicted, id);
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
    assert_eq!(t2.status(), TransactionStatus::RolledBack);

    // the winner's write is what persisted
    let record = db.load_committed(id).unwrap().unwrap();
    assert_eq!(record.field("value"), Some(&Value::Int(2)));
}

#[test]
fn conflict_discards_every_staged_operation() {
    let db = db_with_value_index();
    let contested = insert_value(&db, 1);
    let bystander = insert_value(&db, 2);

    let mut tx = db.begin();
    let mut r = db.load(&tx, contested).unwrap().unwrap();
    r.set("value", 10i64);
    db.save(&mut tx, &r).unwrap();
    let mut b = db.load(&tx, bystander).unwrap().unwrap();
    b.set("value", 20i64);
    db.save(&mut tx, &b).unwrap();

    // concurrent writer bumps the contested record
    let mut other = db.begin();
    let mut o = db.load(&other, contested).unwrap().unwrap();
    o.set("value", 5i64);
    db.save(&mut other, &o).unwrap();
    db.commit(&mut other).unwrap();

    assert!(matches!(db.commit(&mut tx), Err(Error::Conflict { .. })));

    // the bystander write was not partially applied
    let b = db.load_committed(bystander).unwrap().unwrap();
    assert_eq!(b.field("value"), Some(&Value::Int(2)));
    assert_eq!(b.version(), 0);
    assert_eq!(db.get("byValue", &IndexKey::from(20)).unwrap().count(), 0);
}

// ============================================================================
// Versions over a record's lifetime
// ============================================================================

#[test]
fn versions_start_at_zero_and_step_by_one() {
    let db = db_with_value_index();
    let id = insert_value(&db, 1);
    assert_eq!(db.metadata(&id).unwrap().version, 0);

    for step in 1..=3u64 {
        let mut tx = db.begin();
        let mut record = db.load(&tx, id).unwrap().unwrap();
        record.set("value", step as i64 * 100);
        db.save(&mut tx, &record).unwrap();
        let outcome = db.commit(&mut tx).unwrap();
        assert_eq!(outcome.version_of(id), Some(step));
    }
    assert_eq!(db.metadata(&id).unwrap().version, 3);
}

#[test]
fn metadata_tracks_creation_and_update_times() {
    let db = db_with_value_index();
    let id = insert_value(&db, 1);
    let created = db.metadata(&id).unwrap();
    assert_eq!(created.created_at, created.updated_at);

    let mut tx = db.begin();
    let mut record = db.load(&tx, id).unwrap().unwrap();
    record.set("value", 2i64);
    db.save(&mut tx, &record).unwrap();
    db.commit(&mut tx).unwrap();

    let updated = db.metadata(&id).unwrap();
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
}

// ============================================================================
// Deleted ids stay dead
// ============================================================================

#[test]
fn touching_a_concurrently_deleted_record_is_stale() {
    let db = db_with_value_index();
    let id = insert_value(&db, 1);

    let mut tx = db.begin();
    let mut record = db.load(&tx, id).unwrap().unwrap();
    record.set("value", 2i64);
    db.save(&mut tx, &record).unwrap();

    // another transaction deletes the record and commits first
    let mut other = db.begin();
    let victim = db.load(&other, id).unwrap().unwrap();
    db.delete(&mut other, &victim).unwrap();
    db.commit(&mut other).unwrap();

    assert!(matches!(db.commit(&mut tx), Err(Error::StaleRecordId(_))));

    // the id reads as absent everywhere afterwards
    assert!(db.load_committed(id).unwrap().is_none());
    assert!(db.metadata(&id).is_none());
    assert!(db.get("byValue", &IndexKey::from(1)).unwrap().is_empty());
}

#[test]
fn saving_against_a_deleted_id_is_rejected_at_staging() {
    let db = db_with_value_index();
    let id = insert_value(&db, 1);
    let loaded = db.load_committed(id).unwrap().unwrap();

    let mut tx = db.begin();
    let record = db.load(&tx, id).unwrap().unwrap();
    db.delete(&mut tx, &record).unwrap();
    db.commit(&mut tx).unwrap();

    let mut late = db.begin();
    let err = db.save(&mut late, &loaded).unwrap_err();
    assert!(matches!(err, Error::StaleRecordId(_)));
}

// ============================================================================
// New record identity
// ============================================================================

#[test]
fn temporary_id_is_bound_exactly_once_at_first_commit() {
    let db = db_with_value_index();

    let mut tx = db.begin();
    let mut record = db.new_record(3);
    record.set("value", 9i64);
    let temp = record.id();
    assert!(temp.is_temporary());

    db.save(&mut tx, &record).unwrap();
    let outcome = db.commit(&mut tx).unwrap();

    let bound = outcome.bound(temp).unwrap();
    assert!(bound.is_persistent());
    assert_eq!(bound.container, 3);

    // the index entry and the store agree on the bound id
    let ids: Vec<RecordId> = db.get("byValue", &IndexKey::from(9)).unwrap().collect();
    assert_eq!(ids, vec![bound]);
    assert!(db.load_committed(bound).unwrap().is_some());
    assert!(db.load_committed(temp).unwrap().is_none());
}

#[test]
fn links_between_new_records_are_rebound_together() {
    let db = Database::new();

    let mut tx = db.begin();
    let mut a = db.new_record(1);
    let mut b = db.new_record(1);
    a.set("other", Value::Link(b.id()));
    b.set("other", Value::Link(a.id()));
    let (temp_a, temp_b) = (a.id(), b.id());
    db.save(&mut tx, &a).unwrap();
    db.save(&mut tx, &b).unwrap();

    let outcome = db.commit(&mut tx).unwrap();
    let bound_a = outcome.bound(temp_a).unwrap();
    let bound_b = outcome.bound(temp_b).unwrap();

    let a = db.load_committed(bound_a).unwrap().unwrap();
    let b = db.load_committed(bound_b).unwrap().unwrap();
    assert_eq!(a.field("other"), Some(&Value::Link(bound_b)));
    assert_eq!(b.field("other"), Some(&Value::Link(bound_a)));
}
