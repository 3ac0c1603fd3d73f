use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use hivebox::{BoxOptions, HiveBox, HiveError, Key, TypeRegistry, Value};

fn registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::new())
}

fn open(dir: &Path, name: &str) -> HiveBox {
    HiveBox::open(dir, name, BoxOptions::default(), registry()).unwrap()
}

fn file_len(dir: &Path, name: &str) -> u64 {
    fs::metadata(dir.join(format!("{}.hive", name))).unwrap().len()
}

#[test]
fn survives_reopen() {
    let dir = TempDir::new().unwrap();

    let mut map = open(dir.path(), "basic");
    map.put("a", 1i64).unwrap();
    map.put("b", 2i64).unwrap();
    map.delete("a").unwrap();
    map.close().unwrap();

    let map = open(dir.path(), "basic");
    assert_eq!(map.keys(), vec![Key::Str("b".into())]);
    assert_eq!(map.get("b").unwrap(), Some(Value::Int(2)));
    assert_eq!(map.get("a").unwrap(), None);
    map.close().unwrap();
}

#[test]
fn positional_lookup_uses_key_order() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "positional");

    let mut keys: Vec<String> = (0..100).map(|i| format!("k{}", i)).collect();
    for (i, key) in keys.iter().enumerate() {
        map.put(key.as_str(), i as i64).unwrap();
    }
    keys.sort();

    for (position, key) in keys.iter().enumerate() {
        let expected = map.get(key.as_str()).unwrap();
        assert_eq!(map.get_at(position).unwrap(), expected);
    }
    assert_eq!(map.get_at(keys.len()).unwrap(), None);

    // Integer keys come before every string key.
    map.put(7u32, -1i64).unwrap();
    assert_eq!(map.get_at(0).unwrap(), Some(Value::Int(-1)));
    map.close().unwrap();
}

#[test]
fn compaction_keeps_live_data_and_shrinks_the_file() {
    let dir = TempDir::new().unwrap();

    let mut map = open(dir.path(), "compacted");
    for i in 0..200u32 {
        map.put(i, i as i64).unwrap();
    }
    for i in 0..100u32 {
        map.delete(i).unwrap();
    }
    let before = file_len(dir.path(), "compacted");
    map.compact().unwrap();
    let after = file_len(dir.path(), "compacted");
    assert!(after < before);

    for i in 100..200u32 {
        assert_eq!(map.get(i).unwrap(), Some(Value::Int(i as i64)));
    }
    map.close().unwrap();

    // The compacted file is byte-for-byte as long as a log that only ever
    // saw the live puts.
    let mut fresh = open(dir.path(), "fresh");
    for i in 100..200u32 {
        fresh.put(i, i as i64).unwrap();
    }
    assert_eq!(file_len(dir.path(), "fresh"), after);
    fresh.close().unwrap();

    let map = open(dir.path(), "compacted");
    assert_eq!(map.len(), 100);
    map.close().unwrap();
}

#[test]
fn automatic_compaction_follows_the_strategy() {
    let dir = TempDir::new().unwrap();
    let options = BoxOptions {
        compaction_strategy: Box::new(|_, deleted| deleted >= 10),
        ..BoxOptions::default()
    };
    let mut map = HiveBox::open(dir.path(), "auto", options, registry()).unwrap();

    for round in 0..25i64 {
        map.put("hot", round).unwrap();
    }
    // 24 shadowed puts crossed the threshold along the way, so the file
    // must be far smaller than 25 frames.
    let single = {
        let mut one = open(dir.path(), "single");
        one.put("hot", 24i64).unwrap();
        let len = file_len(dir.path(), "single");
        one.close().unwrap();
        len
    };
    assert!(file_len(dir.path(), "auto") < single * 10);
    assert_eq!(map.get("hot").unwrap(), Some(Value::Int(24)));
    map.close().unwrap();
}

#[test]
fn encrypted_box_roundtrips_and_rejects_wrong_key() {
    let dir = TempDir::new().unwrap();
    let key = [0x5A; 32];

    let options = BoxOptions {
        encryption_key: Some(key),
        ..BoxOptions::default()
    };
    let mut map = HiveBox::open(dir.path(), "sealed", options, registry()).unwrap();
    map.put("x", vec![1i64, 2, 3]).unwrap();
    map.close().unwrap();

    let options = BoxOptions {
        encryption_key: Some(key),
        ..BoxOptions::default()
    };
    let map = HiveBox::open(dir.path(), "sealed", options, registry()).unwrap();
    assert_eq!(map.get("x").unwrap(), Some(Value::IntList(vec![1, 2, 3])));
    map.close().unwrap();

    // Under the wrong key every frame fails its seeded CRC, which a
    // non-recovering open refuses outright.
    let options = BoxOptions {
        encryption_key: Some([0xA5; 32]),
        crash_recovery: false,
        ..BoxOptions::default()
    };
    match HiveBox::open(dir.path(), "sealed", options, registry()) {
        Err(HiveError::CorruptBox) => {}
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn delete_all_writes_only_needed_tombstones() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "tombstones");
    map.put("b", 1i64).unwrap();
    let events = map.watch(None).unwrap();
    let before = file_len(dir.path(), "tombstones");

    map.delete_all(vec![
        Key::Str("a".into()),
        Key::Str("b".into()),
        Key::Str("c".into()),
    ])
    .unwrap();

    // One tombstone for "b": length prefix, key block, CRC.
    assert_eq!(file_len(dir.path(), "tombstones") - before, 11);

    let event = events.try_recv().unwrap();
    assert_eq!(event.key, Key::Str("b".into()));
    assert!(event.deleted);
    assert!(events.try_recv().is_err());
    map.close().unwrap();
}

#[test]
fn delete_of_unknown_key_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "noop");
    map.put("known", 1i64).unwrap();
    let before = file_len(dir.path(), "noop");

    map.delete("missing").unwrap();
    assert_eq!(file_len(dir.path(), "noop"), before);
    map.close().unwrap();
}

#[test]
fn watch_filters_by_key() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "watched");
    let events = map.watch(Some(Key::Str("k1".into()))).unwrap();

    map.put("k2", "v").unwrap();
    map.put("k1", "v").unwrap();

    let only = events.try_recv().unwrap();
    assert_eq!(only.key, Key::Str("k1".into()));
    assert_eq!(only.value, Some(Value::Str("v".into())));
    assert!(events.try_recv().is_err());
    map.close().unwrap();
}

#[test]
fn put_all_emits_events_in_input_order() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "ordered");
    let events = map.watch(None).unwrap();

    map.put_all(vec![
        (Key::Str("z".into()), Value::Int(1)),
        (Key::Str("a".into()), Value::Int(2)),
        (Key::Str("m".into()), Value::Int(3)),
    ])
    .unwrap();

    let order: Vec<Key> = (0..3).map(|_| events.try_recv().unwrap().key).collect();
    assert_eq!(
        order,
        vec![
            Key::Str("z".into()),
            Key::Str("a".into()),
            Key::Str("m".into()),
        ]
    );
    map.close().unwrap();
}

#[test]
fn failed_transaction_leaves_no_trace() {
    #[derive(Debug)]
    struct Opaque;

    impl hivebox::CustomValue for Opaque {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn eq_value(&self, _: &dyn hivebox::CustomValue) -> bool {
            false
        }
    }

    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "atomic");
    map.put("before", 1i64).unwrap();
    let baseline = file_len(dir.path(), "atomic");
    let events = map.watch(None).unwrap();

    let mut txn = map.transaction().unwrap();
    txn.put("a", 2i64).unwrap();
    // No adapter handles this value, so encoding the batch fails.
    txn.put("b", Value::Custom(Arc::new(Opaque))).unwrap();
    match txn.commit() {
        Err(HiveError::UnknownType(_)) => {}
        other => panic!("unexpected: {:?}", other),
    }

    assert_eq!(file_len(dir.path(), "atomic"), baseline);
    assert_eq!(map.get("a").unwrap(), None);
    assert_eq!(map.len(), 1);
    assert!(events.try_recv().is_err());
    map.close().unwrap();
}

#[test]
fn transaction_commit_applies_and_notifies_in_order() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "txn");
    map.put("stale", 0i64).unwrap();
    let events = map.watch(None).unwrap();

    let mut txn = map.transaction().unwrap();
    txn.put("a", 1i64).unwrap();
    txn.put("b", 2i64).unwrap();
    txn.delete("stale").unwrap();
    txn.delete("missing").unwrap();

    // Buffered reads see the transaction, the box does not yet.
    assert_eq!(txn.get("a").unwrap(), Some(Value::Int(1)));
    assert_eq!(txn.get("stale").unwrap(), None);
    assert_eq!(txn.len(), 3);
    txn.commit().unwrap();

    assert_eq!(map.get("a").unwrap(), Some(Value::Int(1)));
    assert_eq!(map.get("stale").unwrap(), None);

    let seen: Vec<(Key, bool)> = (0..3)
        .map(|_| {
            let event = events.try_recv().unwrap();
            (event.key, event.deleted)
        })
        .collect();
    assert_eq!(
        seen,
        vec![
            (Key::Str("a".into()), false),
            (Key::Str("b".into()), false),
            (Key::Str("stale".into()), true),
        ]
    );
    assert!(events.try_recv().is_err());
    map.close().unwrap();
}

#[test]
fn dropped_transaction_is_discarded() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "dropped");
    {
        let mut txn = map.transaction().unwrap();
        txn.put("ghost", 1i64).unwrap();
    }
    assert_eq!(map.get("ghost").unwrap(), None);
    map.close().unwrap();
}

#[test]
fn lazy_box_reads_from_disk() {
    let dir = TempDir::new().unwrap();
    {
        let mut map = open(dir.path(), "lazy");
        map.put("a", "cached".to_owned()).unwrap();
        map.put("b", 2i64).unwrap();
        map.close().unwrap();
    }

    let options = BoxOptions {
        lazy: true,
        ..BoxOptions::default()
    };
    let mut map = HiveBox::open(dir.path(), "lazy", options, registry()).unwrap();
    assert!(map.is_lazy());
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("a").unwrap(), Some(Value::Str("cached".into())));
    assert_eq!(map.get_at(1).unwrap(), Some(Value::Int(2)));

    match map.values() {
        Err(HiveError::UnsupportedOperation(_)) => {}
        other => panic!("unexpected: {:?}", other),
    }
    match map.to_map() {
        Err(HiveError::UnsupportedOperation(_)) => {}
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }

    // Lazy boxes still write and serve the new value back.
    map.put("a", "rewritten".to_owned()).unwrap();
    assert_eq!(map.get("a").unwrap(), Some(Value::Str("rewritten".into())));
    map.close().unwrap();
}

#[test]
fn auto_increment_keys_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut map = open(dir.path(), "autoinc");
        assert_eq!(map.add("first").unwrap(), 0);
        assert_eq!(map.add("second").unwrap(), 1);
        assert_eq!(map.add_all(vec![Value::Int(1), Value::Int(2)]).unwrap(), vec![2, 3]);
        map.close().unwrap();
    }

    let mut map = open(dir.path(), "autoinc");
    assert_eq!(map.add("fifth").unwrap(), 4);
    assert_eq!(map.get(0u32).unwrap(), Some(Value::Str("first".into())));
    map.close().unwrap();
}

#[test]
fn clear_empties_box_and_truncates_file() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "cleared");
    map.put("a", 1i64).unwrap();
    map.put("b", 2i64).unwrap();
    let events = map.watch(None).unwrap();

    assert_eq!(map.clear().unwrap(), 2);
    assert!(map.is_empty());
    assert_eq!(file_len(dir.path(), "cleared"), 0);

    let mut deleted: Vec<Key> = (0..2).map(|_| events.try_recv().unwrap().key).collect();
    deleted.sort();
    assert_eq!(deleted, vec![Key::Str("a".into()), Key::Str("b".into())]);

    map.put("c", 3i64).unwrap();
    assert_eq!(map.len(), 1);
    map.close().unwrap();
}

#[test]
fn values_and_to_map_reflect_the_box() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "snapshot");
    map.put("b", 2i64).unwrap();
    map.put("a", 1i64).unwrap();

    assert_eq!(map.values().unwrap(), vec![Value::Int(1), Value::Int(2)]);
    let snapshot = map.to_map().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[&Key::Str("a".into())], Value::Int(1));
    map.close().unwrap();
}

#[test]
fn second_process_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let map = open(dir.path(), "exclusive");

    match HiveBox::open(dir.path(), "exclusive", BoxOptions::default(), registry()) {
        Err(HiveError::BoxLocked(name)) => assert_eq!(name, "exclusive"),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }

    map.close().unwrap();
    open(dir.path(), "exclusive").close().unwrap();
}

#[test]
fn close_ends_watch_streams() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "closing");
    map.put("a", 1i64).unwrap();
    let events = map.watch(None).unwrap();
    events.try_recv().ok();

    map.close().unwrap();
    assert!(events.recv().is_err());
}

#[test]
fn delete_from_disk_removes_the_box() {
    let dir = TempDir::new().unwrap();
    let mut map = open(dir.path(), "doomed");
    map.put("a", 1i64).unwrap();
    map.delete_from_disk().unwrap();

    assert!(!dir.path().join("doomed.hive").exists());
    let map = open(dir.path(), "doomed");
    assert!(map.is_empty());
    map.close().unwrap();
}

#[test]
fn torn_tail_recovers_to_last_valid_frame() {
    let dir = TempDir::new().unwrap();
    {
        let mut map = open(dir.path(), "recovering");
        map.put("a", 1i64).unwrap();
        map.put("b", 2i64).unwrap();
        map.close().unwrap();
    }
    let path = dir.path().join("recovering.hive");
    let intact = fs::metadata(&path).unwrap().len();
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&[0x40, 0, 0, 0, 1, 2, 3]);
    fs::write(&path, &bytes).unwrap();

    let map = open(dir.path(), "recovering");
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("b").unwrap(), Some(Value::Int(2)));
    assert_eq!(fs::metadata(&path).unwrap().len(), intact);
    map.close().unwrap();
}
