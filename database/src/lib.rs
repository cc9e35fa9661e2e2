//! Small key-value store for bridge state.
//!
//! Values are compressed with `snap` in both backends. The persistent backend keeps a single named
//! table in an `libmdbx` environment. The in-memory backend swaps whole `im` maps so that a batch
//! is applied entirely or not at all.

use std::{borrow::Cow, path::Path, sync::Arc};

use anyhow::{ensure, Result};
use bytesize::ByteSize;
use im::OrdMap;
use libmdbx::{DatabaseFlags, Environment, Geometry, WriteFlags};
use parking_lot::Mutex;
use snap::raw::{Decoder, Encoder};
use thiserror::Error;
use tracing::info;

const GROWTH_STEP: ByteSize = ByteSize::mib(4);
const MAX_TABLES: usize = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DatabaseMode {
    ReadOnly,
    ReadWrite,
}

impl DatabaseMode {
    const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    // Zero tells `libmdbx` to open existing files without creating any.
    #[cfg(target_os = "linux")]
    const fn file_mode(self) -> u32 {
        match self {
            Self::ReadOnly => 0,
            Self::ReadWrite => 0o600,
        }
    }

    #[cfg(not(target_os = "linux"))]
    const fn file_mode(self) -> u16 {
        match self {
            Self::ReadOnly => 0,
            Self::ReadWrite => 0o600,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("database directory {directory:?} is not valid Unicode")]
    NonUnicodeDirectory { directory: Box<Path> },
    #[error("database {table} was opened read-only")]
    ReadOnly { table: String },
}

pub struct Database {
    backend: Backend,
}

enum Backend {
    Mdbx(MdbxStore),
    Memory(MemoryStore),
}

impl Database {
    pub fn persistent(
        table: &str,
        directory: impl AsRef<Path>,
        max_size: ByteSize,
        mode: DatabaseMode,
    ) -> Result<Self> {
        let store = MdbxStore::open(table, directory.as_ref(), max_size, mode)?;

        Ok(Self {
            backend: Backend::Mdbx(store),
        })
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::default()),
        }
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Mdbx(store) => store.get(key.as_ref()),
            Backend::Memory(store) => store.get(key.as_ref()),
        }
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        match &self.backend {
            Backend::Mdbx(store) => store.contains_key(key.as_ref()),
            Backend::Memory(store) => Ok(store.contains_key(key.as_ref())),
        }
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch([(key, value)])
    }

    /// Writes all pairs in one transaction.
    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        let compressed = pairs
            .into_iter()
            .map(|(key, value)| -> Result<_> { Ok((key, compress(value.as_ref())?)) })
            .collect::<Result<Vec<_>>>()?;

        match &self.backend {
            Backend::Mdbx(store) => store.put_batch(compressed),
            Backend::Memory(store) => {
                store.put_batch(compressed);
                Ok(())
            }
        }
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        match &self.backend {
            Backend::Mdbx(store) => store.delete(key.as_ref()),
            Backend::Memory(store) => {
                store.delete(key.as_ref());
                Ok(())
            }
        }
    }
}

struct MdbxStore {
    table: String,
    mode: DatabaseMode,
    environment: Environment,
}

impl MdbxStore {
    fn open(table: &str, directory: &Path, max_size: ByteSize, mode: DatabaseMode) -> Result<Self> {
        ensure!(
            directory.to_str().is_some(),
            Error::NonUnicodeDirectory {
                directory: directory.into(),
            },
        );

        if !mode.is_read_only() {
            fs_err::create_dir_all(directory)?;
        }

        let environment = Environment::builder()
            .set_max_dbs(MAX_TABLES)
            .set_geometry(Geometry {
                size: Some(..usize::try_from(max_size.as_u64())?),
                growth_step: Some(isize::try_from(GROWTH_STEP.as_u64())?),
                shrink_threshold: None,
                page_size: None,
            })
            .open_with_permissions(directory, mode.file_mode())?;

        if !mode.is_read_only() {
            let transaction = environment.begin_rw_txn()?;
            transaction.create_db(Some(table), DatabaseFlags::default())?;
            transaction.commit()?;
        }

        info!("opened {table} in {} ({mode:?})", directory.display());

        Ok(Self {
            table: table.to_owned(),
            mode,
            environment,
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let transaction = self.environment.begin_ro_txn()?;
        let table = transaction.open_db(Some(&self.table))?;

        transaction
            .get::<Cow<'_, [u8]>>(table.dbi(), key)?
            .map(|compressed| decompress(&compressed))
            .transpose()
    }

    fn contains_key(&self, key: &[u8]) -> Result<bool> {
        let transaction = self.environment.begin_ro_txn()?;
        let table = transaction.open_db(Some(&self.table))?;

        Ok(transaction.get::<()>(table.dbi(), key)?.is_some())
    }

    fn put_batch(&self, pairs: Vec<(impl AsRef<[u8]>, Vec<u8>)>) -> Result<()> {
        self.ensure_writable()?;

        let transaction = self.environment.begin_rw_txn()?;
        let table = transaction.open_db(Some(&self.table))?;

        for (key, compressed) in pairs {
            transaction.put(table.dbi(), key, compressed, WriteFlags::default())?;
        }

        transaction.commit()?;

        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;

        let transaction = self.environment.begin_rw_txn()?;
        let table = transaction.open_db(Some(&self.table))?;
        let mut cursor = transaction.cursor(&table)?;

        if cursor.set::<()>(key)?.is_some() {
            cursor.del(WriteFlags::default())?;
            transaction.commit()?;
        }

        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        ensure!(
            !self.mode.is_read_only(),
            Error::ReadOnly {
                table: self.table.clone(),
            },
        );

        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    map: Mutex<OrdMap<Arc<[u8]>, Arc<[u8]>>>,
}

impl MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.map
            .lock()
            .get(key)
            .map(|compressed| decompress(compressed))
            .transpose()
    }

    fn contains_key(&self, key: &[u8]) -> bool {
        self.map.lock().contains_key(key)
    }

    fn put_batch(&self, pairs: Vec<(impl AsRef<[u8]>, Vec<u8>)>) {
        let mut map = self.map.lock();

        let updated = pairs
            .into_iter()
            .fold(map.clone(), |mut updated, (key, compressed)| {
                updated.insert(key.as_ref().into(), compressed.into());
                updated
            });

        *map = updated;
    }

    fn delete(&self, key: &[u8]) {
        self.map.lock().remove(key);
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    Ok(Encoder::new().compress_vec(data)?)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    Ok(Decoder::new().decompress_vec(data)?)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    const TABLE: &str = "bridge";

    fn persistent(directory: &TempDir) -> Result<Database> {
        Database::persistent(
            TABLE,
            directory.path(),
            ByteSize::mib(1),
            DatabaseMode::ReadWrite,
        )
    }

    fn in_memory(_directory: &TempDir) -> Result<Database> {
        Ok(Database::in_memory())
    }

    #[test_case(persistent; "persistent")]
    #[test_case(in_memory; "in memory")]
    fn batch_is_readable_and_overwritable(
        open: fn(&TempDir) -> Result<Database>,
    ) -> Result<()> {
        let directory = TempDir::new()?;
        let database = open(&directory)?;

        database.put_batch([("head", b"1".as_slice()), ("tail", b"2".as_slice())])?;
        database.put("head", "3")?;

        assert_eq!(database.get("head")?.as_deref(), Some(b"3".as_slice()));
        assert_eq!(database.get("tail")?.as_deref(), Some(b"2".as_slice()));
        assert_eq!(database.get("missing")?, None);

        Ok(())
    }

    #[test_case(persistent; "persistent")]
    #[test_case(in_memory; "in memory")]
    fn deleted_key_is_gone(open: fn(&TempDir) -> Result<Database>) -> Result<()> {
        let directory = TempDir::new()?;
        let database = open(&directory)?;

        database.put("head", "1")?;
        database.delete("head")?;
        database.delete("never written")?;

        assert!(!database.contains_key("head")?);
        assert_eq!(database.get("head")?, None);

        Ok(())
    }

    #[test_case(persistent; "persistent")]
    #[test_case(in_memory; "in memory")]
    fn large_values_survive_compression(open: fn(&TempDir) -> Result<Database>) -> Result<()> {
        let directory = TempDir::new()?;
        let database = open(&directory)?;
        let value = (0..=u8::MAX).cycle().take(100_000).collect::<Vec<_>>();

        database.put("blob", &value)?;

        assert_eq!(database.get("blob")?, Some(value));

        Ok(())
    }

    #[test]
    fn reopened_database_is_read_only() -> Result<()> {
        let directory = TempDir::new()?;

        persistent(&directory)?.put("head", "1")?;

        let database = Database::persistent(
            TABLE,
            directory.path(),
            ByteSize::mib(1),
            DatabaseMode::ReadOnly,
        )?;

        assert_eq!(database.get("head")?.as_deref(), Some(b"1".as_slice()));

        let error = database
            .put("head", "2")
            .expect_err("read-only database should refuse writes");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::ReadOnly { .. }),
        ));

        Ok(())
    }
}
