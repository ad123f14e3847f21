//! Table registry: maps table ids to heap files and tuple descriptors.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::common::{DbError, Result};
use crate::storage::HeapFile;
use crate::tuple::TupleDesc;

struct TableEntry {
    name: String,
    file: Arc<HeapFile>,
}

/// In-memory catalog of the tables of one database. Table ids are assigned
/// in registration order starting at 1.
pub struct Catalog {
    page_size: usize,
    next_table_id: AtomicU32,
    tables: RwLock<BTreeMap<u32, TableEntry>>,
}

impl Catalog {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            next_table_id: AtomicU32::new(1),
            tables: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens the heap file at `path` (creating it if missing) and registers
    /// it under `name`. Returns the new table id.
    pub fn add_table<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        desc: Arc<TupleDesc>,
    ) -> Result<u32> {
        let mut tables = self.tables.write();
        if tables.values().any(|entry| entry.name == name) {
            return Err(DbError::TableAlreadyExists(name.to_string()));
        }

        let table_id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let file = HeapFile::open(table_id, path, desc, self.page_size)?;
        info!(
            table_id,
            name,
            path = %file.path().display(),
            pages = file.page_count(),
            "registered table"
        );

        tables.insert(
            table_id,
            TableEntry {
                name: name.to_string(),
                file: Arc::new(file),
            },
        );
        Ok(table_id)
    }

    pub fn heap_file(&self, table_id: u32) -> Result<Arc<HeapFile>> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or(DbError::TableNotFound(table_id))
    }

    pub fn tuple_desc(&self, table_id: u32) -> Result<Arc<TupleDesc>> {
        Ok(Arc::clone(self.heap_file(table_id)?.desc()))
    }

    pub fn table_id(&self, name: &str) -> Option<u32> {
        self.tables
            .read()
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
    }

    pub fn table_name(&self, table_id: u32) -> Option<String> {
        self.tables.read().get(&table_id).map(|entry| entry.name.clone())
    }

    /// Registered table ids in ascending order.
    pub fn table_ids(&self) -> Vec<u32> {
        self.tables.read().keys().copied().collect()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::DataType;
    use tempfile::tempdir;

    fn desc() -> Arc<TupleDesc> {
        TupleDesc::builder()
            .field("id", DataType::Integer)
            .field("name", DataType::VarChar(16))
            .build_arc()
    }

    #[test]
    fn test_add_and_lookup() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new(4096);

        let users = catalog.add_table("users", dir.path().join("users.dat"), desc()).unwrap();
        let orders = catalog.add_table("orders", dir.path().join("orders.dat"), desc()).unwrap();

        assert_ne!(users, orders);
        assert_eq!(catalog.table_id("users"), Some(users));
        assert_eq!(catalog.table_name(orders).as_deref(), Some("orders"));
        assert_eq!(catalog.table_ids(), vec![users, orders]);
        assert_eq!(*catalog.tuple_desc(users).unwrap(), *desc());
        assert_eq!(catalog.heap_file(users).unwrap().table_id(), users);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new(4096);
        catalog.add_table("t", dir.path().join("a.dat"), desc()).unwrap();

        let err = catalog.add_table("t", dir.path().join("b.dat"), desc());
        assert!(matches!(err, Err(DbError::TableAlreadyExists(_))));
    }

    #[test]
    fn test_unknown_table() {
        let catalog = Catalog::new(4096);
        assert!(matches!(catalog.heap_file(42), Err(DbError::TableNotFound(42))));
        assert_eq!(catalog.table_id("missing"), None);
    }
}
