use super::*;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

fn fp(n: u64) -> Fingerprint {
    Fingerprint { hi: 0xabc, lo: n }
}

fn must_execute(r: Reservation<'_>) -> CacheTicket<'_> {
    match r {
        Reservation::MustExecute(t) => t,
        other => panic!("expected MustExecute, got {other:?}"),
    }
}

/// Commit an entry holding `size` bytes and drop its lease.
fn produce(store: &CacheStore, key: Fingerprint, size: usize) {
    let ticket = must_execute(store.reserve(key).unwrap());
    std::fs::write(ticket.staging_dir().join("out.png"), vec![7u8; size]).unwrap();
    drop(ticket.commit().unwrap());
}

#[test]
fn miss_commit_then_hit() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();

    let ticket = must_execute(store.reserve(fp(1)).unwrap());
    assert!(ticket.staging_dir().is_dir());
    std::fs::write(ticket.staging_dir().join("a_normal.png"), b"0123456789").unwrap();
    let lease = ticket.commit().unwrap();
    assert_eq!(lease.path(), root.path().join(fp(1).to_string()));
    assert!(lease.path().join("a_normal.png").is_file());
    assert!(lease.path().join(META_FILE).is_file());
    assert_eq!(store.entry(fp(1)).unwrap().refs, 1);
    drop(lease);
    assert_eq!(store.entry(fp(1)).unwrap().refs, 0);

    match store.reserve(fp(1)).unwrap() {
        Reservation::Hit(l) => assert!(l.path().join("a_normal.png").is_file()),
        other => panic!("expected hit, got {other:?}"),
    }
    let stats = store.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_bytes, 10);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn released_ticket_leaves_no_entry() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    let ticket = must_execute(store.reserve(fp(2)).unwrap());
    let staging = ticket.staging_dir().to_path_buf();
    std::fs::write(staging.join("partial.png"), b"x").unwrap();
    ticket.release();
    assert!(!staging.exists());
    assert!(store.entry(fp(2)).is_none());
    // No negative caching: the next caller executes again.
    must_execute(store.reserve(fp(2)).unwrap());
}

#[test]
fn concurrent_reservations_execute_once() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    let executions = AtomicUsize::new(0);
    let running = AtomicUsize::new(0);
    let max_running = AtomicUsize::new(0);
    let hits = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| match store.reserve(fp(3)).unwrap() {
                Reservation::MustExecute(ticket) => {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    executions.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    std::fs::write(ticket.staging_dir().join("out.png"), b"data").unwrap();
                    running.fetch_sub(1, Ordering::SeqCst);
                    drop(ticket.commit().unwrap());
                }
                Reservation::Hit(_) | Reservation::WaitThenHit(_) => {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(max_running.load(Ordering::SeqCst), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 7);
}

#[test]
fn waiter_takes_over_after_failed_producer() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    let ticket = must_execute(store.reserve(fp(4)).unwrap());

    std::thread::scope(|s| {
        let waiter = s.spawn(|| {
            matches!(
                store.reserve(fp(4)).unwrap(),
                Reservation::MustExecute(_)
            )
        });
        std::thread::sleep(Duration::from_millis(50));
        drop(ticket);
        assert!(waiter.join().unwrap());
    });
}

#[test]
fn waiter_sees_commit() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    let ticket = must_execute(store.reserve(fp(5)).unwrap());

    std::thread::scope(|s| {
        let waiter = s.spawn(|| {
            matches!(
                store.reserve(fp(5)).unwrap(),
                Reservation::WaitThenHit(_)
            )
        });
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(ticket.staging_dir().join("out.png"), b"x").unwrap();
        drop(ticket.commit().unwrap());
        assert!(waiter.join().unwrap());
    });
}

#[test]
fn evicts_least_recently_used_first() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 25).unwrap();
    produce(&store, fp(10), 10);
    produce(&store, fp(11), 10);
    // Touch 10 so that 11 becomes the LRU entry.
    drop(store.reserve(fp(10)).unwrap());
    produce(&store, fp(12), 10);

    assert!(store.entry(fp(10)).is_some());
    assert!(store.entry(fp(11)).is_none());
    assert!(!root.path().join(fp(11).to_string()).exists());
    assert!(store.entry(fp(12)).is_some());
    assert!(store.stats().total_bytes <= 25);
}

#[test]
fn referenced_entries_are_never_evicted() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 15).unwrap();
    produce(&store, fp(20), 10);
    let held = match store.reserve(fp(20)).unwrap() {
        Reservation::Hit(l) => l,
        other => panic!("expected hit, got {other:?}"),
    };

    produce(&store, fp(21), 10);
    assert!(store.entry(fp(20)).is_some());
    assert!(held.path().join("out.png").is_file());
    assert!(store.entry(fp(21)).is_none());
    assert!(store.stats().total_bytes <= 15);

    drop(held);
    assert!(store.entry(fp(20)).is_some());
}

#[test]
fn oversized_entry_is_dropped_once_unreferenced() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 5).unwrap();
    let ticket = must_execute(store.reserve(fp(30)).unwrap());
    std::fs::write(ticket.staging_dir().join("big.png"), vec![0u8; 64]).unwrap();
    let lease = ticket.commit().unwrap();
    assert!(lease.path().join("big.png").is_file());
    drop(lease);
    assert!(store.entry(fp(30)).is_none());
    assert_eq!(store.stats().total_bytes, 0);
}

#[test]
fn reopen_rebuilds_and_cleans() {
    let root = tempfile::tempdir().unwrap();
    {
        let store = CacheStore::open(root.path(), 1 << 20).unwrap();
        produce(&store, fp(40), 12);
        produce(&store, fp(41), 3);
    }
    let corrupt = root.path().join(fp(42).to_string());
    std::fs::create_dir_all(&corrupt).unwrap();
    std::fs::write(corrupt.join(META_FILE), b"{not json").unwrap();
    let leftover = root.path().join(STAGING_DIR).join("junk");
    std::fs::create_dir_all(&leftover).unwrap();
    std::fs::create_dir_all(root.path().join("unrelated")).unwrap();

    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    let stats = store.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.total_bytes, 15);
    assert!(!corrupt.exists());
    assert!(!leftover.exists());
    assert!(root.path().join("unrelated").is_dir());
    assert!(matches!(store.reserve(fp(40)).unwrap(), Reservation::Hit(_)));
}

#[test]
fn reopen_with_smaller_budget_evicts_oldest() {
    let root = tempfile::tempdir().unwrap();
    {
        let store = CacheStore::open(root.path(), 1 << 20).unwrap();
        produce(&store, fp(50), 10);
        produce(&store, fp(51), 10);
    }
    let store = CacheStore::open(root.path(), 10).unwrap();
    assert_eq!(store.stats().entries, 1);
    assert!(store.stats().total_bytes <= 10);
}

#[test]
fn clear_skips_referenced_entries() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    produce(&store, fp(60), 1);
    produce(&store, fp(61), 1);
    let _held = store.reserve(fp(61)).unwrap();
    assert_eq!(store.clear().unwrap(), 1);
    assert!(store.entry(fp(60)).is_none());
    assert!(store.entry(fp(61)).is_some());
}

#[test]
fn vanished_entry_is_a_miss() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    produce(&store, fp(70), 4);
    std::fs::remove_dir_all(root.path().join(fp(70).to_string())).unwrap();
    must_execute(store.reserve(fp(70)).unwrap());
    assert_eq!(store.stats().total_bytes, 0);
}

#[test]
fn commit_replaces_untracked_directory() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    let ticket = must_execute(store.reserve(fp(80)).unwrap());
    let stale = root.path().join(fp(80).to_string());
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("old.png"), b"old").unwrap();

    std::fs::write(ticket.staging_dir().join("new.png"), b"new").unwrap();
    let lease = ticket.commit().unwrap();
    assert!(lease.path().join("new.png").is_file());
    assert!(!lease.path().join("old.png").exists());
}

#[test]
fn commit_reports_unremovable_stale_entry() {
    let root = tempfile::tempdir().unwrap();
    let store = CacheStore::open(root.path(), 1 << 20).unwrap();
    let ticket = must_execute(store.reserve(fp(81)).unwrap());
    std::fs::write(root.path().join(fp(81).to_string()), b"not a directory").unwrap();
    std::fs::write(ticket.staging_dir().join("new.png"), b"new").unwrap();

    match ticket.commit() {
        Err(MatflowError::Cache(msg)) => assert!(msg.contains("stale entry"), "{msg}"),
        other => panic!("expected cache error, got {other:?}"),
    }
    assert_eq!(store.stats().in_flight, 0);
    assert!(store.entry(fp(81)).is_none());
}
