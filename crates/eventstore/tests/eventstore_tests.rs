//! Event store integration tests.

use std::sync::Arc;
use std::thread;

use codec::{EntityId, FieldType, Record, Schema, SchemaRegistry, Timestamp, UnknownFields, Value};
use eventstore::{DecodePolicy, Error, EventStore, RecordKey, StoreConfig};
use ingest::{ImportConfig, Importer};
use tempfile::TempDir;

fn v1() -> Schema {
    Schema::new("screening", 1)
        .required(1, "title", FieldType::Text)
        .field(2, "minutes", FieldType::Uint)
}

fn v2() -> Schema {
    let mut schema = v1().field(3, "language", FieldType::Text).default_value("en");
    schema.version = 2;
    schema
}

fn v3() -> Schema {
    let mut schema = v2().field(4, "subtitled", FieldType::Bool);
    schema.version = 3;
    schema
}

fn registry_v1() -> SchemaRegistry {
    SchemaRegistry::new().with_schema(v1()).unwrap()
}

fn ts(s: &str) -> Timestamp {
    Timestamp::parse_rfc3339(s).unwrap()
}

fn at(micros: i64) -> Timestamp {
    Timestamp::from_micros(micros)
}

fn screening(entity: &str, timestamp: Timestamp, title: &str) -> Record {
    Record::new("screening", entity, timestamp, 1).with_field(1, "title", title)
}

fn open(dir: &TempDir) -> EventStore {
    EventStore::open(&StoreConfig::new(dir.path()), registry_v1()).unwrap()
}

fn titles(records: impl IntoIterator<Item = eventstore::Result<Record>>) -> Vec<String> {
    records
        .into_iter()
        .map(|r| r.unwrap().get("title").and_then(Value::as_text).unwrap().to_string())
        .collect()
}

#[test]
fn test_three_good_one_bad_import() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let importer = Importer::new(ImportConfig::new("screening")).unwrap();

    let report = store
        .import_document(
            &importer,
            r#"{"records": [
                {"entity": "odeon", "timestamp": "2024-03-02T20:00:00Z", "title": "Heat"},
                {"entity": "odeon", "timestamp": "2024-03-01T20:00:00Z", "title": "Alien"},
                {"entity": "odeon", "timestamp": "2024-03-03T20:00:00Z", "minutes": 90},
                {"entity": "odeon", "timestamp": "2024-03-04T20:00:00Z", "title": "Ran"}
            ]}"#,
        )
        .unwrap();

    assert_eq!(report.accepted_count, 3);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].index, 2);
    assert_eq!(report.rejected[0].reason.code(), "missing_field");
    assert!(report.failed.is_empty());
    assert_eq!(report.total(), 4);

    let odeon = EntityId::new("odeon");
    assert_eq!(
        titles(store.read(&odeon, ..).unwrap()),
        vec!["Alien", "Heat", "Ran"]
    );
    assert_eq!(store.stats().unwrap().live, 3);
}

#[test]
fn test_oversized_record_is_refused() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let odeon = EntityId::new("odeon");
    let title = "x".repeat(codec::wire::MAX_BODY_LEN + 1);

    let result = store.write(&screening("odeon", at(10), &title));
    assert!(matches!(
        result,
        Err(Error::Codec(codec::Error::RecordTooLarge { .. }))
    ));
    assert!(store.get(&odeon, &at(10)).unwrap().is_none());
    let mut records = store.read(&odeon, ..).unwrap();
    assert!(records.next().is_none());
    assert_eq!(records.skipped(), 0);
    assert_eq!(store.stats().unwrap().live, 0);
}

#[test]
fn test_import_lists_records_that_fail_to_write() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let mut config = ImportConfig::new("screening");
    config.max_document_bytes = 4 * codec::wire::MAX_BODY_LEN;
    let importer = Importer::new(config).unwrap();

    let huge = "x".repeat(codec::wire::MAX_BODY_LEN + 1);
    let document = serde_json::json!({"records": [
        {"entity": "odeon", "timestamp": "2024-03-01T20:00:00Z", "title": "Alien"},
        {"entity": "odeon", "timestamp": "2024-03-02T20:00:00Z", "title": huge},
        {"entity": "odeon", "timestamp": "2024-03-03T20:00:00Z"},
    ]})
    .to_string();
    let report = store.import_document(&importer, &document).unwrap();

    assert_eq!(report.accepted_count, 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        report.accepted_count + report.failed.len() + report.rejected.len(),
        3
    );
    assert!(!report.is_clean());
    let failure = &report.failed[0];
    assert_eq!(failure.entity_id, EntityId::new("odeon"));
    assert_eq!(failure.timestamp.micros(), ts("2024-03-02T20:00:00Z").micros());
    assert!(failure.error.contains("too large"));

    let odeon = EntityId::new("odeon");
    assert_eq!(titles(store.read(&odeon, ..).unwrap()), vec!["Alien"]);
    assert!(store.get(&odeon, &ts("2024-03-02T20:00:00Z")).unwrap().is_none());
}

#[test]
fn test_malformed_document_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let importer = Importer::new(ImportConfig::new("screening")).unwrap();

    let result = store.import_document(&importer, r#"{"records": [{"entity": "odeon""#);
    assert!(matches!(
        result,
        Err(Error::Ingest(ingest::Error::MalformedDocument { .. }))
    ));
    assert_eq!(store.stats().unwrap().live, 0);

    let unknown = Importer::new(ImportConfig::new("concert")).unwrap();
    assert!(matches!(
        store.import_document(&unknown, r#"{"records": []}"#),
        Err(Error::Codec(codec::Error::UnknownKind(_)))
    ));
}

#[test]
fn test_read_is_time_ordered_and_bounded() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    for (micros, title) in [(30, "c"), (-10, "a"), (20, "b"), (40, "d")] {
        store.write(&screening("odeon", at(micros), title)).unwrap();
    }
    store.write(&screening("odeon-2", at(25), "other")).unwrap();

    let odeon = EntityId::new("odeon");
    assert_eq!(titles(store.read(&odeon, ..).unwrap()), vec!["a", "b", "c", "d"]);
    assert_eq!(titles(store.read(&odeon, at(20)..at(40)).unwrap()), vec!["b", "c"]);
    assert_eq!(titles(store.read(&odeon, at(20)..=at(40)).unwrap()), vec!["b", "c", "d"]);
    assert_eq!(titles(store.read(&odeon, ..at(0)).unwrap()), vec!["a"]);
    assert!(store.read(&EntityId::new("rex"), ..).unwrap().next().is_none());
}

#[test]
fn test_write_same_instant_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let record = screening("odeon", ts("2024-03-01T20:00:00Z"), "Alien");

    store.write(&record).unwrap();
    store.write(&record).unwrap();
    // Same instant expressed in another offset.
    store
        .write(&screening("odeon", ts("2024-03-01T21:00:00+01:00"), "Aliens"))
        .unwrap();

    let odeon = EntityId::new("odeon");
    let all: Vec<_> = store.read(&odeon, ..).unwrap().collect();
    assert_eq!(titles(all), vec!["Aliens"]);
    let stored = store.get(&odeon, &ts("2024-03-01T20:00:00Z")).unwrap().unwrap();
    assert_eq!(stored.timestamp.display_offset().map(|o| o.local_minus_utc()), Some(3600));
}

#[test]
fn test_write_validates_against_schema() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let untitled = Record::new("screening", "odeon", at(0), 1).with_field(2, "minutes", 90_u64);
    assert!(matches!(
        store.write(&untitled),
        Err(Error::Validation { .. })
    ));

    let wrong_type = screening("odeon", at(0), "Alien").with_field(2, "minutes", "long");
    assert!(matches!(
        store.write(&wrong_type),
        Err(Error::Validation { .. })
    ));

    let future = Record::new("screening", "odeon", at(0), 9).with_field(1, "title", "Alien");
    assert!(matches!(
        store.write(&future),
        Err(Error::Codec(codec::Error::UnsupportedSchema { version: 9, .. }))
    ));

    assert!(matches!(
        store.write(&screening("", at(0), "Alien")),
        Err(Error::InvalidKey(_))
    ));
    assert_eq!(store.stats().unwrap().live, 0);
}

#[test]
fn test_tombstone_survives_restart() {
    let dir = TempDir::new().unwrap();
    let odeon = EntityId::new("odeon");
    {
        let store = open(&dir);
        store.write(&screening("odeon", at(1), "Alien")).unwrap();
        store.write(&screening("odeon", at(2), "Heat")).unwrap();
        store.delete(&odeon, &at(1)).unwrap();
    }

    let store = open(&dir);
    assert!(store.get(&odeon, &at(1)).unwrap().is_none());
    assert_eq!(titles(store.read(&odeon, ..).unwrap()), vec!["Heat"]);

    let stats = store.stats().unwrap();
    assert_eq!((stats.live, stats.tombstones), (1, 1));
    assert_eq!(store.compact().unwrap(), 1);
    assert_eq!(store.stats().unwrap().tombstones, 0);
}

#[test]
fn test_delete_entity_and_latest() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    for micros in 1..=5 {
        store
            .write(&screening("odeon", at(micros), &format!("t{micros}")))
            .unwrap();
    }
    store.write(&screening("rex", at(3), "Ran")).unwrap();

    let odeon = EntityId::new("odeon");
    let latest = store.latest(&odeon).unwrap().unwrap();
    assert_eq!(latest.timestamp.micros(), 5);

    assert_eq!(store.delete_entity(&odeon).unwrap(), 5);
    assert!(store.latest(&odeon).unwrap().is_none());
    assert_eq!(titles(store.read(&EntityId::new("rex"), ..).unwrap()), vec!["Ran"]);
}

#[test]
fn test_upgrade_on_read() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store.write(&screening("odeon", at(1), "Alien")).unwrap();
    }

    let mut registry = SchemaRegistry::new()
        .with_schema(v1())
        .unwrap()
        .with_schema(v2())
        .unwrap();
    registry
        .register_upgrade("screening", 1, |payload| payload.with(3, "language", "en"))
        .unwrap();
    let store = EventStore::open(&StoreConfig::new(dir.path()), registry).unwrap();

    let record = store.latest(&EntityId::new("odeon")).unwrap().unwrap();
    assert_eq!(record.schema_version, 2);
    assert_eq!(record.get("title"), Some(&Value::from("Alien")));
    assert_eq!(record.get("language"), Some(&Value::from("en")));
}

#[test]
fn test_upgrades_compose() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store.write(&screening("odeon", at(1), "Alien")).unwrap();
    }

    let mut registry = SchemaRegistry::new()
        .with_schema(v1())
        .unwrap()
        .with_schema(v2())
        .unwrap()
        .with_schema(v3())
        .unwrap();
    registry
        .register_upgrade("screening", 1, |payload| payload.with(3, "language", "fr"))
        .unwrap();
    registry
        .register_upgrade("screening", 2, |payload| {
            let subtitled = payload.get("language") != Some(&Value::from("en"));
            payload.with(4, "subtitled", subtitled)
        })
        .unwrap();
    let store = EventStore::open(&StoreConfig::new(dir.path()), registry).unwrap();

    let record = store.latest(&EntityId::new("odeon")).unwrap().unwrap();
    assert_eq!(record.schema_version, 3);
    assert_eq!(record.get("language"), Some(&Value::from("fr")));
    assert_eq!(record.get("subtitled"), Some(&Value::Bool(true)));
}

#[test]
fn test_missing_upgrade_is_an_error() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store.write(&screening("odeon", at(1), "Alien")).unwrap();
    }

    let registry = SchemaRegistry::new()
        .with_schema(v1())
        .unwrap()
        .with_schema(v2())
        .unwrap();
    let store = EventStore::open(&StoreConfig::new(dir.path()), registry).unwrap();

    let mut records = store.read(&EntityId::new("odeon"), ..).unwrap();
    assert!(matches!(
        records.next(),
        Some(Err(Error::Codec(codec::Error::MissingUpgrade { from: 1, .. })))
    ));
    assert!(records.next().is_none());
}

#[test]
fn test_corrupt_entry_skip_and_strict() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store.write(&screening("odeon", at(10), "Alien")).unwrap();
        store.write(&screening("odeon", at(20), "Heat")).unwrap();
    }
    {
        let raw = storage::Storage::open(dir.path()).unwrap();
        let key = RecordKey::new(EntityId::new("odeon"), &at(15)).encode().unwrap();
        raw.put(&key, b"not a record").unwrap();
    }

    let odeon = EntityId::new("odeon");
    {
        let store = open(&dir);
        let mut records = store.read(&odeon, ..).unwrap();
        let read: Vec<_> = records.by_ref().map(|r| r.unwrap().timestamp.micros()).collect();
        assert_eq!(read, vec![10, 20]);
        assert_eq!(records.skipped(), 1);
    }

    let strict = StoreConfig::new(dir.path()).with_decode(DecodePolicy::Strict);
    let store = EventStore::open(&strict, registry_v1()).unwrap();
    let mut records = store.read(&odeon, ..).unwrap();
    assert_eq!(records.next().unwrap().unwrap().timestamp.micros(), 10);
    assert!(matches!(
        records.next(),
        Some(Err(Error::Codec(codec::Error::CorruptRecord { .. })))
    ));
    assert!(records.next().is_none());
}

#[test]
fn test_unknown_fields_preserved_or_dropped_on_read() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        let record = screening("odeon", at(1), "Alien")
            .with_field(codec::Field::UNTAGGED, "screen", 2_i64);
        store.write(&record).unwrap();
    }

    let odeon = EntityId::new("odeon");
    {
        let store = open(&dir);
        let record = store.get(&odeon, &at(1)).unwrap().unwrap();
        assert_eq!(record.get("screen"), Some(&Value::Int(2)));
    }

    let config = StoreConfig::new(dir.path()).with_unknown_fields(UnknownFields::Drop);
    let store = EventStore::open(&config, registry_v1()).unwrap();
    let record = store.get(&odeon, &at(1)).unwrap().unwrap();
    assert!(record.get("screen").is_none());
    assert_eq!(record.get("title"), Some(&Value::from("Alien")));
}

#[test]
fn test_snapshot_isolation() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let odeon = EntityId::new("odeon");
    store.write(&screening("odeon", at(1), "Alien")).unwrap();

    let snapshot = store.snapshot().unwrap();
    store.write(&screening("odeon", at(2), "Heat")).unwrap();
    store.delete(&odeon, &at(1)).unwrap();

    assert_eq!(titles(snapshot.read(&odeon, ..).unwrap()), vec!["Alien"]);
    assert!(snapshot.get(&odeon, &at(2)).unwrap().is_none());
    assert_eq!(titles(store.read(&odeon, ..).unwrap()), vec!["Heat"]);
}

#[test]
fn test_second_open_is_locked() {
    let dir = TempDir::new().unwrap();
    let _store = open(&dir);
    assert!(matches!(
        EventStore::open(&StoreConfig::new(dir.path()), registry_v1()),
        Err(Error::Storage(storage::Error::Locked { .. }))
    ));
}

#[test]
fn test_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));

    let handles: Vec<_> = (0..4)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let entity = format!("venue-{w}");
                for i in 0..25 {
                    store
                        .write(&screening(&entity, at(i), &format!("{w}-{i}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for w in 0..4 {
        let records: Vec<_> = store
            .read(&EntityId::new(format!("venue-{w}")), ..)
            .unwrap()
            .map(|r| r.unwrap().timestamp.micros())
            .collect();
        assert_eq!(records, (0..25).collect::<Vec<_>>());
    }
}
