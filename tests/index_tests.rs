//! Tests for the growable and compact hash indexes
//!
//! These tests verify:
//! - Insert, lookup, overwrite and delete semantics
//! - Growth escalation when every generation's probe budget is exhausted
//! - Bloom-filtered and plain probing strategies
//! - Position cache coherence after deletes
//! - A bulk workload with growth, deletes and verified misses
//! - Compact index triples with in-place value overwrite

use std::path::{Path, PathBuf};

use stratadb::{
    Config, Database, FieldType, HashIndexConfig, Record, Schema, StrataError, Value,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_db() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.strata");
    (temp_dir, path)
}

fn user_schema() -> Schema {
    Schema::builder()
        .field("name", FieldType::Str(16))
        .field("score", FieldType::U64)
        .build()
        .unwrap()
}

fn user(name: &str, score: u64) -> Record {
    Record::new(vec![Value::Str(name.to_string()), Value::U64(score)])
}

fn create_db(path: &Path, index_config: HashIndexConfig) -> Database {
    let mut db = Database::create(path, Config::default()).unwrap();
    db.create_dataset("users", user_schema()).unwrap();
    db.create_hash_index("by_name", "users", "name", index_config)
        .unwrap();
    db.commit().unwrap();
    db
}

fn small_config() -> HashIndexConfig {
    HashIndexConfig {
        p_init: 2,
        ..Default::default()
    }
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_insert_and_lookup() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_db(&path, HashIndexConfig::default());

    let mut index = db.hash_index("by_name").unwrap();
    assert!(index.insert(&user("alice", 10)).unwrap());

    let record = index.lookup(&Value::Str("alice".into())).unwrap();
    assert_eq!(record.value(1), &Value::U64(10));
    assert!(index.contains(&Value::Str("alice".into())).unwrap());
}

#[test]
fn test_insert_overwrites_in_place() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_db(&path, HashIndexConfig::default());

    let mut index = db.hash_index("by_name").unwrap();
    assert!(index.insert(&user("alice", 10)).unwrap());
    // Second insert for the same key updates the slot, claiming nothing new
    assert!(!index.insert(&user("alice", 20)).unwrap());

    let record = index.lookup(&Value::Str("alice".into())).unwrap();
    assert_eq!(record.value(1), &Value::U64(20));
    assert_eq!(index.scan().unwrap().len(), 1);
}

#[test]
fn test_missing_key_errors() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_db(&path, HashIndexConfig::default());

    let mut index = db.hash_index("by_name").unwrap();
    let ghost = Value::Str("ghost".into());
    assert!(matches!(index.lookup(&ghost), Err(StrataError::KeyNotFound)));
    assert!(matches!(index.delete(&ghost), Err(StrataError::KeyNotFound)));
    assert!(!index.contains(&ghost).unwrap());
}

#[test]
fn test_delete_then_lookup_misses() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_db(&path, HashIndexConfig::default());

    let mut index = db.hash_index("by_name").unwrap();
    index.insert(&user("alice", 10)).unwrap();
    index.delete(&Value::Str("alice".into())).unwrap();

    assert!(matches!(
        index.lookup(&Value::Str("alice".into())),
        Err(StrataError::KeyNotFound)
    ));
    assert!(!index.contains(&Value::Str("alice".into())).unwrap());
    assert!(index.scan().unwrap().is_empty());
}

#[test]
fn test_reinsert_after_delete() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_db(&path, HashIndexConfig::default());

    let mut index = db.hash_index("by_name").unwrap();
    index.insert(&user("alice", 10)).unwrap();
    index.delete(&Value::Str("alice".into())).unwrap();
    index.insert(&user("alice", 30)).unwrap();

    let record = index.lookup(&Value::Str("alice".into())).unwrap();
    assert_eq!(record.value(1), &Value::U64(30));
}

// =============================================================================
// Growth Escalation
// =============================================================================

#[test]
fn test_growth_escalation_keeps_all_keys() {
    let (_temp, path) = setup_temp_db();
    // p_init = 2 with growth_factor 2 starts at capacity 4, forcing growth
    let mut db = create_db(&path, small_config());

    db.begin_transaction();
    {
        let mut index = db.hash_index("by_name").unwrap();
        for i in 0..40 {
            assert!(index.insert(&user(&format!("user{i}"), i)).unwrap());
        }
        assert!(index.generation_count() > 1);

        for i in 0..40 {
            let record = index.lookup(&Value::Str(format!("user{i}"))).unwrap();
            assert_eq!(record.value(1), &Value::U64(i));
        }
    }
    db.end_transaction().unwrap();
}

#[test]
fn test_scan_sees_every_generation() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_db(&path, small_config());

    db.begin_transaction();
    {
        let mut index = db.hash_index("by_name").unwrap();
        for i in 0..25 {
            index.insert(&user(&format!("user{i}"), i)).unwrap();
        }
        let mut scores: Vec<u64> = index
            .scan()
            .unwrap()
            .iter()
            .map(|r| r.value(1).as_u64().unwrap())
            .collect();
        scores.sort_unstable();
        assert_eq!(scores, (0..25).collect::<Vec<u64>>());
    }
    db.end_transaction().unwrap();
}

// =============================================================================
// Probing Strategies and Caching
// =============================================================================

#[test]
fn test_plain_probe_without_bloom() {
    let (_temp, path) = setup_temp_db();
    let config = HashIndexConfig {
        p_init: 2,
        n_bloom_filters: 0,
        ..Default::default()
    };
    let mut db = create_db(&path, config);

    db.begin_transaction();
    {
        let mut index = db.hash_index("by_name").unwrap();
        assert_eq!(index.strategy(), stratadb::index::ProbeStrategy::PlainProbe);
        for i in 0..20 {
            index.insert(&user(&format!("user{i}"), i)).unwrap();
        }
        for i in 0..20 {
            assert!(index.contains(&Value::Str(format!("user{i}"))).unwrap());
        }
        assert!(!index.contains(&Value::Str("absent".into())).unwrap());
    }
    db.end_transaction().unwrap();
}

#[test]
fn test_lookup_without_position_cache() {
    let (_temp, path) = setup_temp_db();
    let config = HashIndexConfig {
        p_init: 2,
        cache_capacity: 0,
        ..Default::default()
    };
    let mut db = create_db(&path, config);

    db.begin_transaction();
    {
        let mut index = db.hash_index("by_name").unwrap();
        for i in 0..20 {
            index.insert(&user(&format!("user{i}"), i)).unwrap();
        }
        // Every hit below comes from a real probe
        for i in 0..20 {
            let record = index.lookup(&Value::Str(format!("user{i}"))).unwrap();
            assert_eq!(record.value(1), &Value::U64(i));
        }
    }
    db.end_transaction().unwrap();
}

#[test]
fn test_cache_dropped_on_delete() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_db(&path, HashIndexConfig::default());

    let mut index = db.hash_index("by_name").unwrap();
    index.insert(&user("alice", 10)).unwrap();
    // Warm the position cache, then delete behind it
    index.lookup(&Value::Str("alice".into())).unwrap();
    index.delete(&Value::Str("alice".into())).unwrap();

    assert!(matches!(
        index.lookup(&Value::Str("alice".into())),
        Err(StrataError::KeyNotFound)
    ));
}

#[test]
fn test_bloom_never_false_negative() {
    let (_temp, path) = setup_temp_db();
    let config = HashIndexConfig {
        p_init: 2,
        n_bloom_filters: 2,
        ..Default::default()
    };
    let mut db = create_db(&path, config);

    db.begin_transaction();
    {
        let mut index = db.hash_index("by_name").unwrap();
        assert_eq!(
            index.strategy(),
            stratadb::index::ProbeStrategy::BloomFilteredProbe
        );
        for i in 0..50 {
            index.insert(&user(&format!("user{i}"), i)).unwrap();
        }
        for i in 0..50 {
            assert!(index.contains(&Value::Str(format!("user{i}"))).unwrap());
        }
    }
    db.end_transaction().unwrap();
}

// =============================================================================
// Bulk Workload
// =============================================================================

#[test]
fn test_bulk_insert_delete_workload() {
    let (_temp, path) = setup_temp_db();
    let config = HashIndexConfig {
        p_init: 10,
        growth_factor: 2,
        probe_factor: 0.5,
        ..Default::default()
    };
    let mut db = create_db(&path, config);

    db.begin_transaction();
    {
        let mut index = db.hash_index("by_name").unwrap();
        for i in 0..2000u64 {
            assert!(index.insert(&user(&format!("key{i}"), i)).unwrap());
        }
        // 2000 keys cannot fit capacity 1024, so at least one growth happened
        assert!(index.p_last() > index.p_init());

        for i in 0..500u64 {
            index.delete(&Value::Str(format!("key{i}"))).unwrap();
        }
        for i in 0..500u64 {
            assert!(matches!(
                index.lookup(&Value::Str(format!("key{i}"))),
                Err(StrataError::KeyNotFound)
            ));
        }
        for i in 500..2000u64 {
            let record = index.lookup(&Value::Str(format!("key{i}"))).unwrap();
            assert_eq!(record.value(1), &Value::U64(i));
        }
    }
    db.end_transaction().unwrap();
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_index_persists_across_reopen() {
    let (_temp, path) = setup_temp_db();
    {
        let mut db = create_db(&path, small_config());
        db.begin_transaction();
        let mut index = db.hash_index("by_name").unwrap();
        for i in 0..30 {
            index.insert(&user(&format!("user{i}"), i)).unwrap();
        }
        index.delete(&Value::Str("user3".into())).unwrap();
        db.end_transaction().unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    let mut index = db.hash_index("by_name").unwrap();
    assert!(index.generation_count() > 1);
    for i in 0..30 {
        let key = Value::Str(format!("user{i}"));
        if i == 3 {
            assert!(!index.contains(&key).unwrap());
        } else {
            assert_eq!(index.lookup(&key).unwrap().value(1), &Value::U64(i));
        }
    }
}

// =============================================================================
// Compact Hash Index
// =============================================================================

fn create_compact_db(path: &Path) -> Database {
    let mut db = Database::create(path, Config::default()).unwrap();
    let value_schema = Schema::builder()
        .field("score", FieldType::U64)
        .build()
        .unwrap();
    let config = HashIndexConfig {
        p_init: 2,
        n_bloom_filters: 0,
        cache_capacity: 0,
        ..Default::default()
    };
    db.create_compact_index("scores", 16, value_schema, config)
        .unwrap();
    db.commit().unwrap();
    db
}

#[test]
fn test_compact_insert_and_lookup() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_compact_db(&path);

    let mut index = db.compact_index("scores").unwrap();
    index
        .insert("alice", &Record::new(vec![Value::U64(10)]))
        .unwrap();

    let record = index.lookup("alice").unwrap();
    assert_eq!(record.value(0), &Value::U64(10));
    assert!(index.contains("alice").unwrap());
    assert!(!index.contains("ghost").unwrap());
    assert!(matches!(
        index.lookup("ghost"),
        Err(StrataError::KeyNotFound)
    ));
}

#[test]
fn test_compact_overwrite_keeps_value_count() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_compact_db(&path);

    let mut index = db.compact_index("scores").unwrap();
    index
        .insert("alice", &Record::new(vec![Value::U64(10)]))
        .unwrap();
    index
        .insert("alice", &Record::new(vec![Value::U64(20)]))
        .unwrap();

    // The triple stays put; only the backing value changed
    assert_eq!(index.value_count(), 1);
    assert_eq!(index.lookup("alice").unwrap().value(0), &Value::U64(20));
}

#[test]
fn test_compact_growth_keeps_all_keys() {
    let (_temp, path) = setup_temp_db();
    let mut db = create_compact_db(&path);

    db.begin_transaction();
    {
        let mut index = db.compact_index("scores").unwrap();
        for i in 0..40u64 {
            index
                .insert(&format!("user{i}"), &Record::new(vec![Value::U64(i)]))
                .unwrap();
        }
        assert!(index.p_last() > index.p_init());
        for i in 0..40u64 {
            let record = index.lookup(&format!("user{i}")).unwrap();
            assert_eq!(record.value(0), &Value::U64(i));
        }
        assert_eq!(index.value_count(), 40);
    }
    db.end_transaction().unwrap();
}

#[test]
fn test_compact_persists_across_reopen() {
    let (_temp, path) = setup_temp_db();
    {
        let mut db = create_compact_db(&path);
        db.begin_transaction();
        let mut index = db.compact_index("scores").unwrap();
        for i in 0..20u64 {
            index
                .insert(&format!("user{i}"), &Record::new(vec![Value::U64(i)]))
                .unwrap();
        }
        db.end_transaction().unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    let mut index = db.compact_index("scores").unwrap();
    assert_eq!(index.value_count(), 20);
    for i in 0..20u64 {
        assert_eq!(index.lookup(&format!("user{i}")).unwrap().value(0), &Value::U64(i));
    }
}
