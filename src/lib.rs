//! heapdb - a single-node relational storage and execution engine
//!
//! Tables are heap files of fixed-size pages. Pages are cached by a bounded
//! buffer pool that enforces strict two-phase locking per transaction, and a
//! small pull-based executor runs scans, joins and grouped aggregations on
//! top of it.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page format and file I/O
//!   - `HeapPage`: header bitmap plus fixed-width tuple slots
//!   - `HeapFile`: a table's page array; inserts, deletes and scans
//!   - `DiskManager` / `DiskScheduler`: positioned page I/O on a worker thread
//!
//! - **Buffer Pool** (`buffer`): the only path to page contents
//!   - `BufferPool`: page cache with no-steal, commit flush and abort discard
//!   - `LruKReplacer`: LRU-K choice among clean, unpinned pages
//!   - `PageGuard`: pinned handle to a cached page
//!
//! - **Concurrency** (`concurrency`): `LockManager` with shared/exclusive page
//!   locks and wait-for-graph deadlock detection
//!
//! - **Catalog** (`catalog`): table id to heap file and descriptor
//!
//! - **Execution** (`execution`): `OpIterator` protocol, `SeqScan`, `Join`,
//!   `Aggregate`
//!
//! # Example
//!
//! ```rust,no_run
//! use heapdb::common::Config;
//! use heapdb::tuple::{DataType, TupleBuilder, TupleDesc};
//! use heapdb::Database;
//!
//! let db = Database::new(Config::default()).unwrap();
//! let desc = TupleDesc::builder()
//!     .field("id", DataType::Integer)
//!     .field("name", DataType::VarChar(32))
//!     .build_arc();
//! let table_id = db.create_table("users", "users.dat", desc.clone()).unwrap();
//!
//! let tid = db.begin_transaction();
//! let tuple = TupleBuilder::new(desc).value(1i32).value("alice").build().unwrap();
//! db.buffer_pool().insert_tuple(tid, table_id, tuple).unwrap();
//! db.commit(tid).unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod database;
pub mod execution;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{Config, DbError, PageId, Permission, RecordId, Result, TransactionId};
pub use database::Database;
