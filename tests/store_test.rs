//! Integration tests for the link store
//!
//! The store is accessed concurrently by a background collection run and an
//! interactive query/delete flow; these tests exercise the per-call
//! connection contract across multiple handles on the same file.

use tempfile::TempDir;
use tgcollect::storage::LinkStore;

#[test]
fn test_writes_visible_across_handles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("telegram_links.db");

    let writer = LinkStore::open(&path).unwrap();
    let reader = LinkStore::open(&path).unwrap();

    assert!(writer.save("https://t.me/shared", "u1", "kw").unwrap());
    assert!(reader.exists("https://t.me/shared").unwrap());
    assert_eq!(reader.search(Some("kw"), None).unwrap().len(), 1);
}

#[test]
fn test_interactive_delete_during_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("telegram_links.db");

    // One handle plays the background run, the other the user browsing
    let run = LinkStore::open(&path).unwrap();
    let ui = LinkStore::open(&path).unwrap();

    run.save("https://t.me/a", "u1", "kw").unwrap();
    run.save("https://t.me/b", "u1", "kw").unwrap();

    let id = ui.search(None, Some("t.me/a")).unwrap()[0].id;
    assert!(ui.delete(id).unwrap());

    // The run's next gate check sees the deletion immediately
    assert!(!run.exists("https://t.me/a").unwrap());
    assert!(run.exists("https://t.me/b").unwrap());
    assert!(run.save("https://t.me/a", "u2", "kw").unwrap());
}

#[test]
fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("telegram_links.db");

    {
        let store = LinkStore::open(&path).unwrap();
        store.save("https://t.me/persist", "u1", "kw").unwrap();
    }

    let reopened = LinkStore::open(&path).unwrap();
    assert!(reopened.exists("https://t.me/persist").unwrap());

    let rows = reopened.search(None, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source, "u1");
}

#[test]
fn test_duplicate_save_counts_once_per_lifetime() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("telegram_links.db");
    let store = LinkStore::open(&path).unwrap();

    assert!(store.save("https://t.me/once", "u1", "first").unwrap());
    for _ in 0..5 {
        assert!(!store.save("https://t.me/once", "other", "later").unwrap());
    }

    let rows = store.search(None, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].keyword, "first");
}
