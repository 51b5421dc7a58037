//! Database abstraction layer
//!
//! Provides a unified interface for different database backends (memory,
//! sled, redb). Allows switching between storage engines via feature flags.

use anyhow::Result;
use std::path::Path;

/// Tree holding one bincode-encoded `TenantSnapshot` per tenant id
pub const TENANT_MODULES_TREE: &str = "tenant_modules";
/// Tree holding audit records keyed by tenant id and tenant version
pub const MODULE_AUDIT_TREE: &str = "module_audit";

/// Precondition for a guarded write: `key` in `tree` must currently hold
/// `expected` (`None` = key absent)
#[derive(Debug, Clone, Copy)]
pub struct WriteGuard<'a> {
    pub tree: &'a str,
    pub key: &'a [u8],
    pub expected: Option<&'a [u8]>,
}

/// Single insert performed by a guarded write
#[derive(Debug, Clone, Copy)]
pub struct WriteOp<'a> {
    pub tree: &'a str,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// Database abstraction trait
///
/// Provides a unified interface for key-value storage operations
/// that can be implemented by different backends.
pub trait Database: Send + Sync {
    /// Open a named tree/table
    fn open_tree(&self, name: &str) -> Result<Box<dyn Tree>>;

    /// Flush all pending writes
    fn flush(&self) -> Result<()>;

    /// Apply all `writes` in one transaction if `guard` holds
    ///
    /// Returns `Ok(false)` and writes nothing when the guarded value differs.
    /// Either every write lands or none does.
    fn write_if_unchanged(&self, guard: WriteGuard<'_>, writes: &[WriteOp<'_>]) -> Result<bool>;
}

/// Tree/Table abstraction trait
///
/// Represents a named collection of key-value pairs within a database.
pub trait Tree: Send + Sync {
    /// Insert a key-value pair
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Get number of entries
    fn len(&self) -> Result<usize>;

    /// Check if tree is empty
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterate over all key-value pairs in key order
    fn iter(&self) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_>;

    /// Iterate over the key-value pairs whose key starts with `prefix`
    fn scan_prefix(
        &self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_>;
}

/// Database backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// Process-local, nothing persisted
    Memory,
    Sled,
    Redb,
}

/// Create a database instance based on backend type
pub fn create_database<P: AsRef<Path>>(
    data_dir: P,
    backend: DatabaseBackend,
) -> Result<Box<dyn Database>> {
    match backend {
        DatabaseBackend::Memory => Ok(Box::new(memory_impl::MemoryDatabase::new())),
        #[cfg(feature = "sled")]
        DatabaseBackend::Sled => Ok(Box::new(sled_impl::SledDatabase::new(data_dir)?)),
        #[cfg(not(feature = "sled"))]
        DatabaseBackend::Sled => Err(anyhow::anyhow!(
            "Sled backend not available (feature not enabled)"
        )),
        #[cfg(feature = "redb")]
        DatabaseBackend::Redb => Ok(Box::new(redb_impl::RedbDatabase::new(data_dir)?)),
        #[cfg(not(feature = "redb"))]
        DatabaseBackend::Redb => {
            let _ = data_dir;
            Err(anyhow::anyhow!(
                "Redb backend not available (feature not enabled)"
            ))
        }
    }
}

/// Get default persistent database backend
///
/// Returns the preferred backend (redb if available, otherwise sled, and
/// memory when neither feature is enabled).
pub fn default_backend() -> DatabaseBackend {
    #[cfg(feature = "redb")]
    {
        DatabaseBackend::Redb
    }
    #[cfg(all(not(feature = "redb"), feature = "sled"))]
    {
        DatabaseBackend::Sled
    }
    #[cfg(all(not(feature = "redb"), not(feature = "sled")))]
    {
        DatabaseBackend::Memory
    }
}

/// Get fallback database backend
///
/// Returns an alternative persistent backend if the primary fails.
/// Returns None if no fallback is available.
pub fn fallback_backend(primary: DatabaseBackend) -> Option<DatabaseBackend> {
    match primary {
        DatabaseBackend::Redb => {
            #[cfg(feature = "sled")]
            {
                Some(DatabaseBackend::Sled)
            }
            #[cfg(not(feature = "sled"))]
            {
                None
            }
        }
        DatabaseBackend::Sled => {
            #[cfg(feature = "redb")]
            {
                Some(DatabaseBackend::Redb)
            }
            #[cfg(not(feature = "redb"))]
            {
                None
            }
        }
        DatabaseBackend::Memory => None,
    }
}

// In-memory implementation
mod memory_impl {
    use super::{Database, Tree, WriteGuard, WriteOp};
    use anyhow::Result;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, RwLock};

    type Table = BTreeMap<Vec<u8>, Vec<u8>>;
    type Tables = Arc<RwLock<HashMap<String, Table>>>;

    fn poisoned<T>(_: T) -> anyhow::Error {
        anyhow::anyhow!("Memory database lock poisoned")
    }

    /// All trees live behind one lock, so a guarded write is atomic
    #[derive(Default)]
    pub struct MemoryDatabase {
        tables: Tables,
    }

    impl MemoryDatabase {
        pub fn new() -> Self {
            Self {
                tables: Arc::new(RwLock::new(HashMap::new())),
            }
        }
    }

    impl Database for MemoryDatabase {
        fn open_tree(&self, name: &str) -> Result<Box<dyn Tree>> {
            self.tables
                .write()
                .map_err(poisoned)?
                .entry(name.to_string())
                .or_default();
            Ok(Box::new(MemoryTree {
                tables: Arc::clone(&self.tables),
                name: name.to_string(),
            }))
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn write_if_unchanged(&self, guard: WriteGuard<'_>, writes: &[WriteOp<'_>]) -> Result<bool> {
            let mut tables = self.tables.write().map_err(poisoned)?;
            let current = tables
                .get(guard.tree)
                .and_then(|table| table.get(guard.key))
                .map(Vec::as_slice);
            if current != guard.expected {
                return Ok(false);
            }
            for op in writes {
                tables
                    .entry(op.tree.to_string())
                    .or_default()
                    .insert(op.key.to_vec(), op.value.to_vec());
            }
            Ok(true)
        }
    }

    struct MemoryTree {
        tables: Tables,
        name: String,
    }

    impl MemoryTree {
        fn collect<F>(&self, filter: F) -> Result<Vec<(Vec<u8>, Vec<u8>)>>
        where
            F: Fn(&[u8]) -> bool,
        {
            let tables = self.tables.read().map_err(poisoned)?;
            Ok(tables
                .get(&self.name)
                .map(|table| {
                    table
                        .iter()
                        .filter(|(k, _)| filter(k.as_slice()))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    impl Tree for MemoryTree {
        fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
            self.tables
                .write()
                .map_err(poisoned)?
                .entry(self.name.clone())
                .or_default()
                .insert(key.to_vec(), value.to_vec());
            Ok(())
        }

        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
            let tables = self.tables.read().map_err(poisoned)?;
            Ok(tables.get(&self.name).and_then(|t| t.get(key)).cloned())
        }

        fn len(&self) -> Result<usize> {
            let tables = self.tables.read().map_err(poisoned)?;
            Ok(tables.get(&self.name).map_or(0, BTreeMap::len))
        }

        fn iter(&self) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_> {
            match self.collect(|_| true) {
                Ok(items) => Box::new(items.into_iter().map(Ok)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        }

        fn scan_prefix(
            &self,
            prefix: &[u8],
        ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_> {
            match self.collect(|k| k.starts_with(prefix)) {
                Ok(items) => Box::new(items.into_iter().map(Ok)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        }
    }
}

// Sled implementation
#[cfg(feature = "sled")]
mod sled_impl {
    use super::{Database, Tree, WriteGuard, WriteOp};
    use anyhow::Result;
    use sled::transaction::{ConflictableTransactionError, TransactionError};
    use sled::{Db, Transactional};
    use std::path::Path;
    use std::sync::Arc;

    pub struct SledDatabase {
        db: Arc<Db>,
    }

    impl SledDatabase {
        pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
            let db = sled::open(data_dir)?;
            Ok(Self { db: Arc::new(db) })
        }
    }

    impl Database for SledDatabase {
        fn open_tree(&self, name: &str) -> Result<Box<dyn Tree>> {
            let tree = self.db.open_tree(name)?;
            Ok(Box::new(SledTree {
                tree: Arc::new(tree),
            }))
        }

        fn flush(&self) -> Result<()> {
            self.db.flush()?;
            Ok(())
        }

        fn write_if_unchanged(&self, guard: WriteGuard<'_>, writes: &[WriteOp<'_>]) -> Result<bool> {
            // Position 0 is the guarded tree; writes index into the rest
            let mut names: Vec<&str> = vec![guard.tree];
            for op in writes {
                if !names.contains(&op.tree) {
                    names.push(op.tree);
                }
            }
            let trees = names
                .iter()
                .map(|name| self.db.open_tree(name))
                .collect::<std::result::Result<Vec<sled::Tree>, _>>()?;

            let result = trees.as_slice().transaction(|txs| {
                let current = txs[0].get(guard.key)?;
                if current.as_deref() != guard.expected {
                    return Ok(false);
                }
                for op in writes {
                    let position = names.iter().position(|n| *n == op.tree).unwrap_or(0);
                    txs[position].insert(op.key, op.value)?;
                }
                Ok::<bool, ConflictableTransactionError<()>>(true)
            });

            match result {
                Ok(applied) => Ok(applied),
                Err(TransactionError::Abort(())) => Ok(false),
                Err(TransactionError::Storage(e)) => {
                    Err(anyhow::anyhow!("Sled transaction error: {}", e))
                }
            }
        }
    }

    struct SledTree {
        tree: Arc<sled::Tree>,
    }

    impl Tree for SledTree {
        fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
            self.tree.insert(key, value)?;
            Ok(())
        }

        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
            Ok(self.tree.get(key)?.map(|v| v.to_vec()))
        }

        fn len(&self) -> Result<usize> {
            Ok(self.tree.len())
        }

        fn iter(&self) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_> {
            Box::new(self.tree.iter().map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|e| anyhow::anyhow!("Sled iteration error: {}", e))
            }))
        }

        fn scan_prefix(
            &self,
            prefix: &[u8],
        ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_> {
            Box::new(self.tree.scan_prefix(prefix).map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|e| anyhow::anyhow!("Sled iteration error: {}", e))
            }))
        }
    }
}

// Redb implementation
#[cfg(feature = "redb")]
mod redb_impl {
    use super::{Database, Tree, WriteGuard, WriteOp, MODULE_AUDIT_TREE, TENANT_MODULES_TREE};
    use anyhow::Result;
    use redb::{Database as RedbDb, ReadableTable, TableDefinition};
    use std::path::Path;
    use std::sync::Arc;

    // Redb requires static table definitions, so every tree is declared here
    static TENANT_MODULES_TABLE: TableDefinition<&[u8], &[u8]> =
        TableDefinition::new(TENANT_MODULES_TREE);
    static MODULE_AUDIT_TABLE: TableDefinition<&[u8], &[u8]> =
        TableDefinition::new(MODULE_AUDIT_TREE);

    type TableDef = &'static TableDefinition<'static, &'static [u8], &'static [u8]>;

    fn table_def(name: &str) -> Result<TableDef> {
        match name {
            TENANT_MODULES_TREE => Ok(&TENANT_MODULES_TABLE),
            MODULE_AUDIT_TREE => Ok(&MODULE_AUDIT_TABLE),
            _ => Err(anyhow::anyhow!(
                "Unknown table name: {}. Redb requires pre-defined tables.",
                name
            )),
        }
    }

    pub struct RedbDatabase {
        db: Arc<RedbDb>,
    }

    impl RedbDatabase {
        pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
            use std::sync::Mutex;
            // Serialize database creation (prevents lock conflicts in tests)
            static DB_CREATE_MUTEX: Mutex<()> = Mutex::new(());
            let _guard = DB_CREATE_MUTEX
                .lock()
                .map_err(|_| anyhow::anyhow!("Redb creation lock poisoned"))?;

            std::fs::create_dir_all(data_dir.as_ref())?;
            let db_path = data_dir.as_ref().join("modules.redb");
            // Opens the file if it exists, creates it otherwise
            let db = RedbDb::create(&db_path)?;

            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(TENANT_MODULES_TABLE)?;
                let _ = write_txn.open_table(MODULE_AUDIT_TABLE)?;
            }
            write_txn.commit()?;

            Ok(Self { db: Arc::new(db) })
        }
    }

    impl Database for RedbDatabase {
        fn open_tree(&self, name: &str) -> Result<Box<dyn Tree>> {
            Ok(Box::new(RedbTree {
                db: Arc::clone(&self.db),
                table_def: table_def(name)?,
            }))
        }

        fn flush(&self) -> Result<()> {
            // Redb flushes on transaction commit
            let write_txn = self.db.begin_write()?;
            write_txn.commit()?;
            Ok(())
        }

        fn write_if_unchanged(&self, guard: WriteGuard<'_>, writes: &[WriteOp<'_>]) -> Result<bool> {
            let guard_def = table_def(guard.tree)?;
            let write_txn = self.db.begin_write()?;

            let unchanged = {
                let table = write_txn.open_table(*guard_def)?;
                let current = table.get(guard.key)?.map(|v| v.value().to_vec());
                current.as_deref() == guard.expected
            };
            if !unchanged {
                write_txn.abort()?;
                return Ok(false);
            }

            for op in writes {
                let mut table = write_txn.open_table(*table_def(op.tree)?)?;
                table.insert(op.key, op.value)?;
            }
            write_txn.commit()?;
            Ok(true)
        }
    }

    struct RedbTree {
        db: Arc<RedbDb>,
        table_def: TableDef,
    }

    impl RedbTree {
        fn collect_range(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(*self.table_def)?;

            // The read transaction must outlive the range, so items are collected
            let mut items = Vec::new();
            for item in table.range::<&[u8]>(prefix..)? {
                let (key, value) = item?;
                let key = key.value().to_vec();
                if !key.starts_with(prefix) {
                    break;
                }
                items.push((key, value.value().to_vec()));
            }
            Ok(items)
        }
    }

    impl Tree for RedbTree {
        fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
            let write_txn = self.db.begin_write()?;
            {
                let mut table = write_txn.open_table(*self.table_def)?;
                table.insert(key, value)?;
            }
            write_txn.commit()?;
            Ok(())
        }

        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(*self.table_def)?;
            let result = table.get(key)?.map(|v| v.value().to_vec());
            Ok(result)
        }

        fn len(&self) -> Result<usize> {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(*self.table_def)?;
            Ok(table.len()? as usize)
        }

        fn iter(&self) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_> {
            self.scan_prefix(&[])
        }

        fn scan_prefix(
            &self,
            prefix: &[u8],
        ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_> {
            match self.collect_range(prefix) {
                Ok(items) => Box::new(items.into_iter().map(Ok)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        }
    }
}
