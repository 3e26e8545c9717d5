//! Table layer tests: the memory and file implementations, reference
//! resolution, and on-disk change detection.

use crate::common::create_temp_dir;
use mailgate::core::table::file::FileTable;
use mailgate::core::table::mem::MemTable;
use mailgate::core::table::{open_flags, table_flags, Table, TableError, TableRegistry};

#[tokio::test]
async fn mem_table_round_trip() {
    let table = MemTable::new("scratch");
    assert_eq!(table.get("k").await.unwrap(), None);

    table.put("k", "v").await.unwrap();
    assert_eq!(table.get("k").await.unwrap(), Some("v".to_string()));

    assert!(table.del("k").await.unwrap());
    assert!(!table.del("k").await.unwrap());
    assert!(table.is_empty().await);
}

#[tokio::test]
async fn file_table_persists_across_reopen() {
    let dir = create_temp_dir();
    let path = dir.path().join("verify.map");

    {
        let table = FileTable::open(&path, true).await.unwrap();
        table.put("u@x", "0:0:110:250 ok").await.unwrap();
        table.put("gone@x", "2:0:99:550 no").await.unwrap();
        assert!(table.del("gone@x").await.unwrap());
    }

    let table = FileTable::open(&path, false).await.unwrap();
    assert_eq!(
        table.get("u@x").await.unwrap(),
        Some("0:0:110:250 ok".to_string())
    );
    assert_eq!(table.get("gone@x").await.unwrap(), None);
    assert_eq!(
        table.flags(),
        table_flags::WRITABLE | table_flags::PERSISTENT
    );
}

#[tokio::test]
async fn file_table_requires_create_flag_for_missing_file() {
    let dir = create_temp_dir();
    let path = dir.path().join("absent.map");
    assert!(matches!(
        FileTable::open(&path, false).await,
        Err(TableError::Io { .. })
    ));
}

#[tokio::test]
async fn file_table_rejects_second_writer() {
    let dir = create_temp_dir();
    let path = dir.path().join("verify.map");

    let _first = FileTable::open(&path, true).await.unwrap();
    assert!(matches!(
        FileTable::open(&path, false).await,
        Err(TableError::Locked(_))
    ));
}

#[tokio::test]
async fn file_table_rejects_corrupt_content() {
    let dir = create_temp_dir();
    let path = dir.path().join("verify.map");
    std::fs::write(&path, "not json").unwrap();

    assert!(matches!(
        FileTable::open(&path, false).await,
        Err(TableError::Corrupt { .. })
    ));
}

#[tokio::test]
async fn registry_resolves_supported_types() {
    let dir = create_temp_dir();
    let path = dir.path().join("a.json");
    std::fs::write(&path, r#"{"k":"v"}"#).unwrap();

    let registry = TableRegistry::new();

    let mem = registry.open("mem:scratch", 0).await.unwrap();
    assert_eq!(mem.name(), "mem:scratch");

    let snapshot = registry
        .open(&format!("hash:{}", path.display()), 0)
        .await
        .unwrap();
    assert_eq!(snapshot.get("k").await.unwrap(), Some("v".to_string()));
    assert!(matches!(
        snapshot.put("k", "w").await,
        Err(TableError::ReadOnly(_))
    ));

    let file_path = dir.path().join("w.map");
    let writable = registry
        .open(
            &format!("file:{}", file_path.display()),
            open_flags::READ | open_flags::WRITE | open_flags::CREATE,
        )
        .await
        .unwrap();
    writable.put("k", "v").await.unwrap();
}

#[tokio::test]
async fn registry_rejects_unknown_types() {
    let registry = TableRegistry::new();
    assert!(matches!(
        registry.open("ldap:directory", 0).await,
        Err(TableError::UnsupportedType(_))
    ));
    assert!(matches!(
        registry.open("nocolon", 0).await,
        Err(TableError::UnsupportedType(_))
    ));
}

#[tokio::test]
async fn registry_reports_vanished_backing_file_as_changed() {
    let dir = create_temp_dir();
    let path = dir.path().join("a.json");
    std::fs::write(&path, r#"{"k":"v"}"#).unwrap();
    let reference = format!("hash:{}", path.display());

    let registry = TableRegistry::new();
    registry.open(&reference, 0).await.unwrap();
    assert_eq!(registry.changed(), None);

    std::fs::remove_file(&path).unwrap();
    assert_eq!(registry.changed(), Some(reference));
}

#[tokio::test]
async fn registry_reports_rewritten_backing_file_as_changed() {
    let dir = create_temp_dir();
    let path = dir.path().join("a.json");
    std::fs::write(&path, r#"{"k":"v"}"#).unwrap();
    let reference = format!("hash:{}", path.display());

    let registry = TableRegistry::new();
    registry.open(&reference, 0).await.unwrap();
    assert_eq!(registry.changed(), None);

    // Give the filesystem a chance to assign a distinct mtime.
    std::thread::sleep(std::time::Duration::from_millis(50));
    std::fs::write(&path, r#"{"k":"w"}"#).unwrap();
    assert_eq!(registry.changed(), Some(reference));
}

#[tokio::test]
async fn registry_watches_each_backing_file_once() {
    let dir = create_temp_dir();
    let path = dir.path().join("a.json");
    std::fs::write(&path, r#"{"k":"v"}"#).unwrap();
    let reference = format!("hash:{}", path.display());

    let registry = TableRegistry::new();
    registry.open(&reference, 0).await.unwrap();
    registry.open(&reference, 0).await.unwrap();
    assert_eq!(registry.watched_len(), 1);
}
