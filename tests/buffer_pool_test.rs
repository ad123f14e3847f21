//! Integration tests for the buffer pool: locking, eviction, commit and abort

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use heapdb::common::{Config, DbError, PageId, Permission, TransactionId};
use heapdb::execution::{collect_tuples, OpIterator};
use heapdb::tuple::{DataType, Tuple, TupleDesc, Value};
use heapdb::Database;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::{tempdir, TempDir};

// 64-byte pages of 4-byte tuples: floor(512 / 33) = 15 slots per page
const SMALL_PAGE: usize = 64;
const SLOTS_PER_SMALL_PAGE: i32 = 15;

fn int_desc() -> Arc<TupleDesc> {
    TupleDesc::builder().field("v", DataType::Integer).build_arc()
}

fn int_tuple(v: i32) -> Tuple {
    Tuple::new(int_desc(), vec![Value::Integer(v)]).unwrap()
}

fn setup(page_size: usize, pool_pages: usize) -> (Arc<Database>, u32, TempDir) {
    let dir = tempdir().unwrap();
    let config = Config::default()
        .with_page_size(page_size)
        .with_buffer_pool_pages(pool_pages);
    let db = Database::new(config).unwrap();
    let table_id = db
        .create_table("t", dir.path().join("t.dat"), int_desc())
        .unwrap();
    (Arc::new(db), table_id, dir)
}

fn insert_committed(db: &Database, table_id: u32, values: impl IntoIterator<Item = i32>) {
    let tid = db.begin_transaction();
    for v in values {
        db.buffer_pool().insert_tuple(tid, table_id, int_tuple(v)).unwrap();
    }
    db.commit(tid).unwrap();
}

fn scan_values(db: &Database, tid: TransactionId, table_id: u32) -> Vec<i32> {
    let file = db.catalog().heap_file(table_id).unwrap();
    let mut iter = file.scan(Arc::clone(db.buffer_pool()), tid);
    iter.open().unwrap();
    let mut values: Vec<i32> = collect_tuples(&mut iter)
        .unwrap()
        .iter()
        .map(|t| t.value(0).unwrap().as_i64().unwrap() as i32)
        .collect();
    values.sort();
    values
}

fn committed_values(db: &Database, table_id: u32) -> Vec<i32> {
    let tid = db.begin_transaction();
    let values = scan_values(db, tid, table_id);
    db.commit(tid).unwrap();
    values
}

#[test]
fn test_shared_locks_do_not_block() {
    let (db, table_id, _dir) = setup(4096, 10);
    insert_committed(&db, table_id, [1]);
    let pid = PageId::new(table_id, 0);

    let t1 = db.begin_transaction();
    let t2 = db.begin_transaction();
    let _g1 = db.buffer_pool().get_page(t1, pid, Permission::Read).unwrap();
    let _g2 = db.buffer_pool().get_page(t2, pid, Permission::Read).unwrap();

    assert!(db.buffer_pool().holds_lock(t1, pid));
    assert!(db.buffer_pool().holds_lock(t2, pid));
}

#[test]
fn test_writer_blocks_until_readers_complete() {
    let (db, table_id, _dir) = setup(4096, 10);
    insert_committed(&db, table_id, [1]);
    let pid = PageId::new(table_id, 0);

    let t1 = db.begin_transaction();
    let t2 = db.begin_transaction();
    drop(db.buffer_pool().get_page(t1, pid, Permission::Read).unwrap());
    drop(db.buffer_pool().get_page(t2, pid, Permission::Read).unwrap());

    let acquired = Arc::new(AtomicBool::new(false));
    let writer = {
        let db = Arc::clone(&db);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let t3 = db.begin_transaction();
            let guard = db.buffer_pool().get_page(t3, pid, Permission::ReadWrite).unwrap();
            acquired.store(true, Ordering::SeqCst);
            drop(guard);
            db.commit(t3).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    db.commit(t1).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    db.commit(t2).unwrap();
    writer.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_deadlock_aborts_exactly_one_transaction() {
    let (db, table_id, _dir) = setup(SMALL_PAGE, 10);
    insert_committed(&db, table_id, 0..SLOTS_PER_SMALL_PAGE * 2);
    let pages = [PageId::new(table_id, 0), PageId::new(table_id, 1)];

    let barrier = Arc::new(Barrier::new(2));
    let aborts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            let aborts = Arc::clone(&aborts);
            thread::spawn(move || {
                let tid = db.begin_transaction();
                let first = pages[i];
                let second = pages[1 - i];

                drop(db.buffer_pool().get_page(tid, first, Permission::ReadWrite).unwrap());
                barrier.wait();

                match db.buffer_pool().get_page(tid, second, Permission::ReadWrite) {
                    Ok(guard) => {
                        drop(guard);
                        db.commit(tid).unwrap();
                    }
                    Err(err) => {
                        assert!(matches!(err, DbError::TransactionAborted(t) if t == tid));
                        aborts.fetch_add(1, Ordering::SeqCst);
                        db.abort(tid).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(aborts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_abort_reverts_inserts_and_deletes() {
    let (db, table_id, _dir) = setup(4096, 10);
    insert_committed(&db, table_id, 0..5);

    let tid = db.begin_transaction();
    let file = db.catalog().heap_file(table_id).unwrap();
    let mut iter = file.scan(Arc::clone(db.buffer_pool()), tid);
    iter.open().unwrap();
    let existing = collect_tuples(&mut iter).unwrap();
    iter.close();

    db.buffer_pool().delete_tuple(tid, &existing[0]).unwrap();
    db.buffer_pool().delete_tuple(tid, &existing[1]).unwrap();
    for v in 100..103 {
        db.buffer_pool().insert_tuple(tid, table_id, int_tuple(v)).unwrap();
    }
    assert_eq!(scan_values(&db, tid, table_id), vec![2, 3, 4, 100, 101, 102]);
    assert!(db.buffer_pool().is_dirty(PageId::new(table_id, 0)));

    db.abort(tid).unwrap();
    assert!(!db.buffer_pool().is_dirty(PageId::new(table_id, 0)));
    assert_eq!(committed_values(&db, table_id), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_commit_flushes_dirty_pages() {
    let (db, table_id, _dir) = setup(4096, 10);
    let pid = PageId::new(table_id, 0);

    let tid = db.begin_transaction();
    db.buffer_pool().insert_tuple(tid, table_id, int_tuple(7)).unwrap();
    assert!(db.buffer_pool().is_dirty(pid));

    // Nothing reaches disk before commit
    let file = db.catalog().heap_file(table_id).unwrap();
    assert_eq!(file.read_page(pid).unwrap().tuples().count(), 0);

    db.commit(tid).unwrap();
    assert!(!db.buffer_pool().is_dirty(pid));
    assert_eq!(file.read_page(pid).unwrap().tuples().count(), 1);
    assert!(!db.buffer_pool().holds_lock(tid, pid));
}

#[test]
fn test_buffer_pool_full_when_every_page_is_dirty() {
    let (db, table_id, _dir) = setup(SMALL_PAGE, 2);

    let tid = db.begin_transaction();
    for v in 0..SLOTS_PER_SMALL_PAGE * 2 {
        db.buffer_pool().insert_tuple(tid, table_id, int_tuple(v)).unwrap();
    }
    assert_eq!(db.buffer_pool().cached_page_count(), 2);

    // A third page is needed but both cached pages hold uncommitted changes
    let err = db
        .buffer_pool()
        .insert_tuple(tid, table_id, int_tuple(-1))
        .unwrap_err();
    assert!(matches!(err, DbError::BufferPoolFull));
    db.abort(tid).unwrap();
}

#[test]
fn test_eviction_keeps_pool_within_capacity() {
    let (db, table_id, _dir) = setup(SMALL_PAGE, 3);

    // Commit page by page so pages become clean and evictable
    for chunk in 0..6 {
        let start = chunk * SLOTS_PER_SMALL_PAGE;
        insert_committed(&db, table_id, start..start + SLOTS_PER_SMALL_PAGE);
        assert!(db.buffer_pool().cached_page_count() <= 3);
    }

    let values = committed_values(&db, table_id);
    assert_eq!(values.len(), (SLOTS_PER_SMALL_PAGE * 6) as usize);
    assert!(db.buffer_pool().cached_page_count() <= db.buffer_pool().capacity());
}

#[test]
fn test_flush_and_discard_page() {
    let (db, table_id, _dir) = setup(4096, 10);
    insert_committed(&db, table_id, [1, 2]);
    let pid = PageId::new(table_id, 0);
    let file = db.catalog().heap_file(table_id).unwrap();

    let tid = db.begin_transaction();
    db.buffer_pool().insert_tuple(tid, table_id, int_tuple(3)).unwrap();
    db.buffer_pool().flush_page(pid).unwrap();
    assert_eq!(file.read_page(pid).unwrap().tuples().count(), 3);

    db.buffer_pool().discard_page(pid);
    assert_eq!(db.buffer_pool().cached_page_count(), 0);
    db.commit(tid).unwrap();
}

#[test]
fn test_randomized_workload_matches_model() {
    let (db, table_id, _dir) = setup(SMALL_PAGE, 8);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut model: Vec<i32> = Vec::new();
    let mut next_value = 0;

    for _ in 0..20 {
        let tid = db.begin_transaction();
        let mut pending = model.clone();

        for _ in 0..rng.gen_range(1..6) {
            if !pending.is_empty() && rng.gen_bool(0.3) {
                let file = db.catalog().heap_file(table_id).unwrap();
                let mut iter = file.scan(Arc::clone(db.buffer_pool()), tid);
                iter.open().unwrap();
                let tuples = collect_tuples(&mut iter).unwrap();
                let victim = &tuples[rng.gen_range(0..tuples.len())];
                let value = victim.value(0).unwrap().as_i64().unwrap() as i32;

                db.buffer_pool().delete_tuple(tid, victim).unwrap();
                let pos = pending.iter().position(|&v| v == value).unwrap();
                pending.remove(pos);
            } else {
                db.buffer_pool()
                    .insert_tuple(tid, table_id, int_tuple(next_value))
                    .unwrap();
                pending.push(next_value);
                next_value += 1;
            }
        }

        if rng.gen_bool(0.7) {
            db.commit(tid).unwrap();
            model = pending;
        } else {
            db.abort(tid).unwrap();
        }

        let mut expected = model.clone();
        expected.sort();
        assert_eq!(committed_values(&db, table_id), expected);
    }
}

#[test]
fn test_second_writer_blocks_until_first_completes() {
    let (db, table_id, _dir) = setup(4096, 10);
    insert_committed(&db, table_id, [1]);
    let pid = PageId::new(table_id, 0);

    let t1 = db.begin_transaction();
    drop(db.buffer_pool().get_page(t1, pid, Permission::ReadWrite).unwrap());

    let acquired = Arc::new(AtomicBool::new(false));
    let second = {
        let db = Arc::clone(&db);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let t2 = db.begin_transaction();
            drop(db.buffer_pool().get_page(t2, pid, Permission::ReadWrite).unwrap());
            acquired.store(true, Ordering::SeqCst);
            db.commit(t2).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    db.commit(t1).unwrap();
    second.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_abort_mid_scan_releases_locks() {
    let (db, table_id, _dir) = setup(SMALL_PAGE, 10);
    insert_committed(&db, table_id, 0..SLOTS_PER_SMALL_PAGE * 3);
    let file = db.catalog().heap_file(table_id).unwrap();
    let page_count = file.page_count();
    assert_eq!(page_count, 3);

    let t1 = db.begin_transaction();
    let mut iter = file.scan(Arc::clone(db.buffer_pool()), t1);
    iter.open().unwrap();
    iter.next().unwrap();
    assert!(db.buffer_pool().holds_lock(t1, PageId::new(table_id, 0)));

    db.abort(t1).unwrap();
    assert!(!db.buffer_pool().holds_lock(t1, PageId::new(table_id, 0)));

    // The stale iterator can still be restarted and closed
    iter.rewind().unwrap();
    iter.close();
    assert!(matches!(iter.has_next(), Err(DbError::IteratorNotOpen)));

    let t2 = db.begin_transaction();
    for page_no in 0..page_count {
        let pid = PageId::new(table_id, page_no);
        db.buffer_pool()
            .get_page(t2, pid, Permission::ReadWrite)
            .unwrap();
        assert!(db.buffer_pool().holds_lock(t2, pid));
    }
    db.commit(t2).unwrap();
    assert_eq!(
        committed_values(&db, table_id),
        (0..SLOTS_PER_SMALL_PAGE * 3).collect::<Vec<_>>()
    );
}

#[test]
fn test_cached_pages_are_not_reread() {
    let (db, table_id, _dir) = setup(4096, 10);
    insert_committed(&db, table_id, 0..10);
    let file = db.catalog().heap_file(table_id).unwrap();

    let reads = file.disk_reads();
    assert_eq!(committed_values(&db, table_id), (0..10).collect::<Vec<_>>());
    assert_eq!(file.disk_reads(), reads);

    // Aborting drops the dirtied page, so the next scan loads it again
    let tid = db.begin_transaction();
    db.buffer_pool().insert_tuple(tid, table_id, int_tuple(99)).unwrap();
    assert_eq!(file.disk_reads(), reads);
    let writes = file.disk_writes();
    db.abort(tid).unwrap();
    assert_eq!(file.disk_writes(), writes);

    assert_eq!(committed_values(&db, table_id), (0..10).collect::<Vec<_>>());
    assert_eq!(file.disk_reads(), reads + 1);
}

#[test]
fn test_concurrent_misses_stay_within_capacity() {
    let (db, table_id, _dir) = setup(SMALL_PAGE, 4);
    for chunk in 0..8 {
        let start = chunk * SLOTS_PER_SMALL_PAGE;
        insert_committed(&db, table_id, start..start + SLOTS_PER_SMALL_PAGE);
    }

    let handles: Vec<_> = (0..3u32)
        .map(|worker| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for round in 0..40u32 {
                    let pid = PageId::new(table_id, (worker * 3 + round) % 8);
                    let tid = db.begin_transaction();
                    {
                        let guard = db.buffer_pool().get_page(tid, pid, Permission::Read).unwrap();
                        assert_eq!(
                            guard.read().tuples().count(),
                            SLOTS_PER_SMALL_PAGE as usize
                        );
                    }
                    db.commit(tid).unwrap();
                    assert!(db.buffer_pool().cached_page_count() <= 4);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(db.buffer_pool().cached_page_count() <= 4);
}
