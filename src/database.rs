use std::path::Path;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::{Config, Result, TransactionId};
use crate::tuple::TupleDesc;

/// Bundles the catalog and buffer pool of one database instance.
pub struct Database {
    config: Config,
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(Catalog::new(config.page_size));
        let buffer_pool = Arc::new(BufferPool::new(
            config.buffer_pool_pages,
            config.lru_k,
            Arc::clone(&catalog),
        ));

        Ok(Self {
            config,
            catalog,
            buffer_pool,
        })
    }

    /// Registers a table backed by the heap file at `path`.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        desc: Arc<TupleDesc>,
    ) -> Result<u32> {
        self.catalog.add_table(name, path, desc)
    }

    pub fn begin_transaction(&self) -> TransactionId {
        TransactionId::new()
    }

    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, true)
    }

    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, false)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }
}
