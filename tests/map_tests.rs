//! Tests for the persistent map
//!
//! These tests verify:
//! - Set/get/remove round trips for serde-encoded values
//! - Entry counting across overwrites and removes
//! - Hashed and literal key modes
//! - Value cache invalidation on remove
//! - Compression and persistence across reopen

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stratadb::{Compression, Config, MapConfig, StrataError, StrataMap};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_map() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.strata");
    (temp_dir, path)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Player {
    name: String,
    level: u32,
    inventory: Vec<String>,
}

fn player(name: &str, level: u32) -> Player {
    Player {
        name: name.to_string(),
        level,
        inventory: vec!["sword".into(), "potion".into()],
    }
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_set_get_round_trip() {
    let (_temp, path) = setup_temp_map();
    let mut map: StrataMap<Player> = StrataMap::create(&path, MapConfig::default()).unwrap();

    let value = player("alice", 3);
    map.set("alice", &value).unwrap();
    assert_eq!(map.get("alice").unwrap(), value);
    assert!(map.contains("alice").unwrap());
    assert!(!map.contains("bob").unwrap());
}

#[test]
fn test_get_missing_key_errors() {
    let (_temp, path) = setup_temp_map();
    let mut map: StrataMap<Player> = StrataMap::create(&path, MapConfig::default()).unwrap();

    assert!(matches!(map.get("ghost"), Err(StrataError::KeyNotFound)));
    assert!(matches!(map.remove("ghost"), Err(StrataError::KeyNotFound)));
}

#[test]
fn test_overwrite_keeps_len() {
    let (_temp, path) = setup_temp_map();
    let mut map: StrataMap<Player> = StrataMap::create(&path, MapConfig::default()).unwrap();

    map.set("alice", &player("alice", 1)).unwrap();
    map.set("alice", &player("alice", 9)).unwrap();

    assert_eq!(map.len().unwrap(), 1);
    assert_eq!(map.get("alice").unwrap().level, 9);
}

#[test]
fn test_remove_decrements_len() {
    let (_temp, path) = setup_temp_map();
    let mut map: StrataMap<Player> = StrataMap::create(&path, MapConfig::default()).unwrap();

    map.set("alice", &player("alice", 1)).unwrap();
    map.set("bob", &player("bob", 2)).unwrap();
    assert_eq!(map.len().unwrap(), 2);

    map.remove("alice").unwrap();
    assert_eq!(map.len().unwrap(), 1);
    assert!(!map.contains("alice").unwrap());
    assert!(map.contains("bob").unwrap());
}

#[test]
fn test_remove_invalidates_value_cache() {
    let (_temp, path) = setup_temp_map();
    let mut map: StrataMap<Player> = StrataMap::create(&path, MapConfig::default()).unwrap();

    map.set("alice", &player("alice", 1)).unwrap();
    // Warm the value cache, then remove behind it
    map.get("alice").unwrap();
    map.remove("alice").unwrap();

    assert!(matches!(map.get("alice"), Err(StrataError::KeyNotFound)));
    assert!(!map.contains("alice").unwrap());
}

#[test]
fn test_values_lists_live_entries() {
    let (_temp, path) = setup_temp_map();
    let mut map: StrataMap<Player> = StrataMap::create(&path, MapConfig::default()).unwrap();

    map.begin_transaction();
    for i in 0..10u32 {
        map.set(&format!("p{i}"), &player(&format!("p{i}"), i)).unwrap();
    }
    map.remove("p0").unwrap();
    map.end_transaction().unwrap();

    let mut levels: Vec<u32> = map.values().unwrap().iter().map(|p| p.level).collect();
    levels.sort_unstable();
    assert_eq!(levels, (1..10).collect::<Vec<u32>>());
}

// =============================================================================
// Key Modes
// =============================================================================

#[test]
fn test_literal_keys() {
    let (_temp, path) = setup_temp_map();
    let config = MapConfig {
        hashed_keys: false,
        max_key_len: 10,
        ..Default::default()
    };
    let mut map: StrataMap<u64> = StrataMap::create(&path, config).unwrap();

    map.set("short", &1).unwrap();
    assert_eq!(map.get("short").unwrap(), 1);

    // A key wider than the schema field is rejected, not truncated
    assert!(matches!(
        map.set("far-too-long-key", &2),
        Err(StrataError::Schema(_))
    ));
}

#[test]
fn test_key_mode_survives_reopen() {
    let (_temp, path) = setup_temp_map();
    {
        let config = MapConfig {
            hashed_keys: false,
            max_key_len: 10,
            ..Default::default()
        };
        let mut map: StrataMap<u64> = StrataMap::create(&path, config).unwrap();
        map.set("alpha", &1).unwrap();
    }

    let mut map: StrataMap<u64> = StrataMap::open(&path).unwrap();
    assert_eq!(map.get("alpha").unwrap(), 1);
}

// =============================================================================
// Compression and Persistence
// =============================================================================

#[test]
fn test_zlib_values_round_trip() {
    let (_temp, path) = setup_temp_map();
    let config = MapConfig {
        database: Config::builder().compression(Compression::Zlib).build(),
        ..Default::default()
    };
    let mut map: StrataMap<Player> = StrataMap::create(&path, config).unwrap();

    let mut value = player("alice", 5);
    value.inventory = vec!["arrow".to_string(); 200];
    map.set("alice", &value).unwrap();
    assert_eq!(map.get("alice").unwrap(), value);
}

#[test]
fn test_map_persists_across_reopen() {
    let (_temp, path) = setup_temp_map();
    {
        let mut map: StrataMap<Player> =
            StrataMap::create(&path, MapConfig::default()).unwrap();
        map.begin_transaction();
        for i in 0..100u32 {
            map.set(&format!("p{i}"), &player(&format!("p{i}"), i)).unwrap();
        }
        map.remove("p50").unwrap();
        map.end_transaction().unwrap();
    }

    let mut map: StrataMap<Player> = StrataMap::open(&path).unwrap();
    assert_eq!(map.len().unwrap(), 99);
    for i in 0..100u32 {
        let key = format!("p{i}");
        if i == 50 {
            assert!(!map.contains(&key).unwrap());
        } else {
            assert_eq!(map.get(&key).unwrap().level, i);
        }
    }
}

#[test]
fn test_open_without_value_cache() {
    let (_temp, path) = setup_temp_map();
    {
        let mut map: StrataMap<u64> = StrataMap::create(&path, MapConfig::default()).unwrap();
        map.set("a", &1).unwrap();
    }

    let mut map: StrataMap<u64> = StrataMap::open_with_cache(&path, 0).unwrap();
    assert_eq!(map.get("a").unwrap(), 1);
}
