//! # Checkpoint Round-Trip Tests
//!
//! Verifies the persistence law: closing a database and reopening the same
//! path yields a database whose exact aggregates equal those of the
//! original. Also exercises the failure paths a checkpoint can hit.

use sampledb::{Database, Record, Sampler};
use tempfile::tempdir;

fn dataset(count: i64) -> Vec<Record> {
    (1..=count)
        .map(|id| {
            Record::new(
                id,
                (id as f64 * 1.75) % 5000.0,
                (id % 5) as i32,
                (id % 11) as i32,
                1_700_000_000 + id,
            )
        })
        .collect()
}

#[test]
fn close_then_open_preserves_exact_aggregates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sales.chk");

    let db = Database::create(&path);
    db.insert_batch(dataset(5_000)).unwrap();

    let exact_sum = db.sum().unwrap();
    let exact_count = db.count().unwrap();
    let exact_avg = db.avg().unwrap();
    let exact_where = db.sum_where(100.0, 2_000.0).unwrap();
    db.close().unwrap();

    let reopened = Database::open(&path).unwrap();
    assert_eq!(reopened.sum().unwrap(), exact_sum);
    assert_eq!(reopened.count().unwrap(), exact_count);
    assert_eq!(reopened.avg().unwrap(), exact_avg);
    assert_eq!(reopened.sum_where(100.0, 2_000.0).unwrap(), exact_where);
}

#[test]
fn reopened_database_samples_normally() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sales.chk");

    let db = Database::create(&path);
    db.insert_batch(dataset(10_000)).unwrap();
    db.close().unwrap();

    // The leaf cache starts cold after a load; the first sample rebuilds it.
    let reopened = Database::open(&path).unwrap();
    let bag = reopened.sample(&Sampler::Systematic, 10.0).unwrap();
    assert_eq!(bag.len(), 1000);

    let ids: Vec<i64> = bag.iter().map(|r| r.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted, "leaf order must survive the round trip");
}

#[test]
fn drop_without_close_still_checkpoints() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dropped.chk");

    {
        let db = Database::create(&path);
        db.insert_batch(dataset(500)).unwrap();
        // No close: Drop writes the checkpoint best-effort.
    }

    let reopened = Database::open(&path).unwrap();
    assert_eq!(reopened.count().unwrap(), 500);
}

#[test]
fn empty_database_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.chk");

    Database::create(&path).close().unwrap();

    let reopened = Database::open(&path).unwrap();
    assert_eq!(reopened.count().unwrap(), 0);
    assert_eq!(reopened.sum().unwrap(), 0.0);
}

#[test]
fn garbage_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.chk");
    std::fs::write(&path, b"definitely not a checkpoint").unwrap();

    assert!(Database::open(&path).is_err());
}

#[test]
fn duplicate_ids_survive_the_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dups.chk");

    let db = Database::create(&path);
    for _ in 0..10 {
        db.insert(Record::new(7, 1.5, 0, 0, 0)).unwrap();
    }
    db.close().unwrap();

    let reopened = Database::open(&path).unwrap();
    assert_eq!(reopened.count().unwrap(), 10);
    assert_eq!(reopened.sum().unwrap(), 15.0);
}
