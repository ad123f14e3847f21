use thiserror::Error;

use super::types::{PageId, TransactionId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Invalid page: {0}")]
    InvalidPage(PageId),

    #[error("Invalid record id: {0}")]
    InvalidRecordId(String),

    #[error("Record of {size} bytes does not fit in a {page_size}-byte page")]
    RecordTooLarge { size: usize, page_size: usize },

    #[error("Buffer pool is full, no clean page can be evicted")]
    BufferPoolFull,

    #[error("Transaction {0} aborted")]
    TransactionAborted(TransactionId),

    #[error("Iterator is not open")]
    IteratorNotOpen,

    #[error("No more tuples")]
    NoSuchElement,

    #[error("Aggregate {op} is not supported over {data_type} fields")]
    UnsupportedAggregate { op: String, data_type: String },

    #[error("Page {0} has no empty slot")]
    PageFull(PageId),

    #[error("Tuple descriptor mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("No field named {0}")]
    NoSuchField(String),

    #[error("Table {0} not found")]
    TableNotFound(u32),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Page {0} was fetched read-only")]
    ReadOnlyPage(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Integer overflow: {0}")]
    Overflow(String),
}

impl DbError {
    /// Returns true if the caller should retry the whole transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::TransactionAborted(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
