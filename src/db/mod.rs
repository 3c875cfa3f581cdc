use crate::cache::DataCache;
use crate::changes::ChangeSet;
use crate::config::Config;
use crate::error::combine;
use crate::merge::{self, IdGenerator, LoadedBundle, MergeStats};
use crate::model::{Document, Location, Meta, MonikerKind, MonikerLocations, ResultChunk};
use crate::persistence::{Patcher, Reader, Writer};
use crate::serialization::{JsonSerializer, Serializer};
use anyhow::{Context, Result, bail};
use blake3::Hasher;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

mod migrations;

pub use migrations::SCHEMA_VERSION;

#[derive(Debug)]
struct ConnectionCustomizer {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDigest {
    pub rows: usize,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleDigest {
    pub documents: TableDigest,
    pub result_chunks: TableDigest,
    pub definitions: TableDigest,
    pub references: TableDigest,
}

/// Read-only view of a bundle file. Safe to share between threads.
pub struct BundleReader {
    path: PathBuf,
    read_pool: Pool<SqliteConnectionManager>,
    cache: DataCache,
    serializer: Box<dyn Serializer>,
}

impl BundleReader {
    pub fn open(path: &Path, cache: DataCache) -> Result<Self> {
        if !path.is_file() {
            bail!("bundle {} does not exist", path.display());
        }
        let reader = Self::connect(path, cache)?;
        migrations::check_schema(&*reader.read_conn()?)
            .with_context(|| format!("open bundle {}", path.display()))?;
        Ok(reader)
    }

    fn connect(path: &Path, cache: DataCache) -> Result<Self> {
        let config = Config::get();
        let manager = SqliteConnectionManager::file(path).with_flags(
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        );
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(config.busy_timeout_secs))
            .connection_customizer(Box::new(ConnectionCustomizer {
                busy_timeout: Duration::from_secs(config.busy_timeout_secs),
            }))
            .build(manager)
            .with_context(|| format!("create read pool for {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            read_pool,
            cache,
            serializer: Box::new(JsonSerializer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| format!("get read connection for {}", self.path.display()))
    }

    /// blake3 digest of the raw blobs of every relation, keyed in primary-key order.
    pub fn digest(&self) -> Result<BundleDigest> {
        Ok(BundleDigest {
            documents: self.digest_table("SELECT path, data FROM documents ORDER BY path")?,
            result_chunks: self.digest_table(
                "SELECT CAST(id AS TEXT), data FROM result_chunks ORDER BY id",
            )?,
            definitions: self.digest_table(
                "SELECT scheme || ':' || identifier, data FROM definitions ORDER BY scheme, identifier",
            )?,
            references: self.digest_table(
                "SELECT scheme || ':' || identifier, data FROM \"references\" ORDER BY scheme, identifier",
            )?,
        })
    }

    fn digest_table(&self, sql: &str) -> Result<TableDigest> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            Ok((key, data))
        })?;
        digest_rows(rows)
    }

    fn read_locations(&self, kind: MonikerKind, scheme: &str, identifier: &str) -> Result<Vec<Location>> {
        let sql = format!(
            "SELECT data FROM {} WHERE scheme = ? AND identifier = ?",
            kind.table()
        );
        let data: Option<Vec<u8>> = self
            .read_conn()?
            .query_row(&sql, params![scheme, identifier], |row| row.get(0))
            .optional()
            .with_context(|| format!("read {} for {scheme}:{identifier}", kind.table()))?;
        match data {
            Some(data) => self.serializer.unmarshal_locations(&data),
            None => Ok(Vec::new()),
        }
    }
}

impl Reader for BundleReader {
    fn read_meta(&self) -> Result<Meta> {
        let num_result_chunks: Option<i64> = self
            .read_conn()?
            .query_row("SELECT num_result_chunks FROM meta LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
            .context("read meta")?;
        match num_result_chunks {
            Some(n) if n > 0 => Ok(Meta {
                num_result_chunks: n as usize,
            }),
            Some(n) => bail!("bundle {} has invalid chunk count {n}", self.path.display()),
            None => bail!("bundle {} has no meta row", self.path.display()),
        }
    }

    fn paths_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT path FROM documents
             WHERE substr(path, 1, length(?1)) = ?1
             ORDER BY path",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    fn read_document(&self, path: &str) -> Result<Option<Arc<Document>>> {
        if let Some(document) = self.cache.document(path) {
            return Ok(Some(document));
        }
        let data: Option<Vec<u8>> = self
            .read_conn()?
            .query_row(
                "SELECT data FROM documents WHERE path = ?",
                params![path],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read document {path}"))?;
        let Some(data) = data else {
            return Ok(None);
        };
        let document = Arc::new(
            self.serializer
                .unmarshal_document(&data)
                .with_context(|| format!("document {path}"))?,
        );
        self.cache.insert_document(path, Arc::clone(&document));
        Ok(Some(document))
    }

    fn read_result_chunk(&self, index: usize) -> Result<Option<Arc<ResultChunk>>> {
        if let Some(chunk) = self.cache.result_chunk(index) {
            return Ok(Some(chunk));
        }
        let data: Option<Vec<u8>> = self
            .read_conn()?
            .query_row(
                "SELECT data FROM result_chunks WHERE id = ?",
                params![index as i64],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read result chunk {index}"))?;
        let Some(data) = data else {
            return Ok(None);
        };
        let chunk = Arc::new(
            self.serializer
                .unmarshal_result_chunk(&data)
                .with_context(|| format!("result chunk {index}"))?,
        );
        self.cache.insert_result_chunk(index, Arc::clone(&chunk));
        Ok(Some(chunk))
    }

    fn read_definitions(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>> {
        self.read_locations(MonikerKind::Definitions, scheme, identifier)
    }

    fn read_references(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>> {
        self.read_locations(MonikerKind::References, scheme, identifier)
    }

    fn read_moniker_locations(&self, kind: MonikerKind) -> Result<Vec<MonikerLocations>> {
        let conn = self.read_conn()?;
        let sql = format!(
            "SELECT scheme, identifier, data FROM {} ORDER BY scheme, identifier",
            kind.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let scheme: String = row.get(0)?;
            let identifier: String = row.get(1)?;
            let data: Vec<u8> = row.get(2)?;
            Ok((scheme, identifier, data))
        })?;
        let mut monikers = Vec::new();
        for row in rows {
            let (scheme, identifier, data) = row?;
            let locations = self
                .serializer
                .unmarshal_locations(&data)
                .with_context(|| format!("{} {scheme}:{identifier}", kind.table()))?;
            monikers.push(MonikerLocations {
                scheme,
                identifier,
                locations,
            });
        }
        Ok(monikers)
    }
}

/// A bundle opened for writing. Every write of one `BundleDb` lifetime runs in
/// a single transaction that `close` commits or rolls back.
pub struct BundleDb {
    reader: BundleReader,
    write_conn: Mutex<Connection>,
}

impl BundleDb {
    /// Creates a new, empty bundle at `path`, which must not exist yet.
    pub fn create(path: &Path, cache: DataCache) -> Result<Self> {
        if path.exists() {
            bail!("bundle {} already exists", path.display());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create bundle directory {}", parent.display()))?;
            }
        }

        let write_conn = open_write_conn(path)?;
        write_conn.execute_batch("BEGIN")?;
        migrations::create_tables(&write_conn)?;
        tracing::debug!("created bundle {}", path.display());

        Ok(Self {
            reader: BundleReader::connect(path, cache)?,
            write_conn: Mutex::new(write_conn),
        })
    }

    /// Opens an existing bundle for patching.
    pub fn open(path: &Path, cache: DataCache) -> Result<Self> {
        if !path.is_file() {
            bail!("bundle {} does not exist", path.display());
        }
        let write_conn = open_write_conn(path)?;
        migrations::check_schema(&write_conn)
            .with_context(|| format!("open bundle {}", path.display()))?;
        write_conn.execute_batch("BEGIN")?;

        Ok(Self {
            reader: BundleReader::connect(path, cache)?,
            write_conn: Mutex::new(write_conn),
        })
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    pub fn digest(&self) -> Result<BundleDigest> {
        self.reader.digest()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.write_conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the whole graph (documents, chunks, monikers) with `bundle`.
    /// Meta is left alone.
    fn overwrite(&mut self, bundle: &LoadedBundle) -> Result<()> {
        self.conn().execute_batch(
            r#"
            DELETE FROM documents;
            DELETE FROM result_chunks;
            DELETE FROM definitions;
            DELETE FROM "references";
            "#,
        )?;
        self.write_documents(&bundle.documents)?;
        self.write_result_chunks(&bundle.result_chunks)?;
        self.write_definitions(&bundle.definitions)?;
        self.write_references(&bundle.references)?;
        Ok(())
    }

    fn write_monikers(&mut self, kind: MonikerKind, monikers: &[MonikerLocations]) -> Result<()> {
        let conn = self.conn();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (scheme, identifier, data) VALUES (?, ?, ?)",
            kind.table()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        for moniker in monikers {
            let data = self.reader.serializer.marshal_locations(&moniker.locations)?;
            stmt.execute(params![moniker.scheme, moniker.identifier, data])?;
        }
        Ok(())
    }
}

impl Reader for BundleDb {
    fn read_meta(&self) -> Result<Meta> {
        self.reader.read_meta()
    }

    fn paths_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.reader.paths_with_prefix(prefix)
    }

    fn read_document(&self, path: &str) -> Result<Option<Arc<Document>>> {
        self.reader.read_document(path)
    }

    fn read_result_chunk(&self, index: usize) -> Result<Option<Arc<ResultChunk>>> {
        self.reader.read_result_chunk(index)
    }

    fn read_definitions(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>> {
        self.reader.read_definitions(scheme, identifier)
    }

    fn read_references(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>> {
        self.reader.read_references(scheme, identifier)
    }

    fn read_moniker_locations(&self, kind: MonikerKind) -> Result<Vec<MonikerLocations>> {
        self.reader.read_moniker_locations(kind)
    }
}

impl Writer for BundleDb {
    fn write_meta(&mut self, meta: &Meta) -> Result<()> {
        if meta.num_result_chunks == 0 {
            bail!("a bundle needs at least one result chunk");
        }
        let conn = self.conn();
        conn.execute("DELETE FROM meta", [])?;
        conn.execute(
            "INSERT INTO meta (num_result_chunks) VALUES (?)",
            params![meta.num_result_chunks as i64],
        )?;
        Ok(())
    }

    fn write_documents(&mut self, documents: &BTreeMap<String, Document>) -> Result<()> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("INSERT OR REPLACE INTO documents (path, data) VALUES (?, ?)")?;
        for (path, document) in documents {
            let data = self
                .reader
                .serializer
                .marshal_document(document)
                .with_context(|| format!("document {path}"))?;
            stmt.execute(params![path, data])?;
        }
        self.reader.cache.clear();
        Ok(())
    }

    fn write_result_chunks(&mut self, chunks: &BTreeMap<usize, ResultChunk>) -> Result<()> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("INSERT OR REPLACE INTO result_chunks (id, data) VALUES (?, ?)")?;
        for (index, chunk) in chunks {
            let data = self
                .reader
                .serializer
                .marshal_result_chunk(chunk)
                .with_context(|| format!("result chunk {index}"))?;
            stmt.execute(params![*index as i64, data])?;
        }
        self.reader.cache.clear();
        Ok(())
    }

    fn write_definitions(&mut self, monikers: &[MonikerLocations]) -> Result<()> {
        self.write_monikers(MonikerKind::Definitions, monikers)
    }

    fn write_references(&mut self, monikers: &[MonikerLocations]) -> Result<()> {
        self.write_monikers(MonikerKind::References, monikers)
    }

    fn close(self, result: Result<()>) -> Result<()> {
        let BundleDb { reader, write_conn } = self;
        let path = reader.path.clone();
        // Pooled readers must be gone before the commit takes its exclusive lock.
        drop(reader);

        let conn = write_conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let finished = if result.is_ok() {
            conn.execute_batch("COMMIT")
                .with_context(|| format!("commit bundle {}", path.display()))
        } else {
            tracing::debug!("rolling back bundle {}", path.display());
            conn.execute_batch("ROLLBACK")
                .with_context(|| format!("roll back bundle {}", path.display()))
        };
        let closed = conn.close().map_err(|(_, err)| {
            anyhow::Error::new(err).context(format!("close bundle {}", path.display()))
        });
        combine(result, combine(finished, closed))
    }
}

impl Patcher for BundleDb {
    fn patch_database(
        &mut self,
        patch: &dyn Reader,
        changes: &ChangeSet,
        ids: &mut dyn IdGenerator,
    ) -> Result<MergeStats> {
        let base = LoadedBundle::load(&*self).context("load base bundle")?;
        let patch = LoadedBundle::load(patch).context("load patch bundle")?;
        let (merged, stats) = merge::merge(base, &patch, changes, ids)?;
        self.overwrite(&merged).context("write merged bundle")?;
        Ok(stats)
    }
}

fn open_write_conn(path: &Path) -> Result<Connection> {
    let config = Config::get();
    let conn = Connection::open(path)
        .with_context(|| format!("open sqlite bundle at {}", path.display()))?;
    conn.busy_timeout(Duration::from_secs(config.busy_timeout_secs))?;
    // Bundles are copied and renamed as single files; keep the journal out of a sidecar.
    conn.execute_batch(
        "
        PRAGMA journal_mode = DELETE;
        PRAGMA synchronous = FULL;
        ",
    )?;
    Ok(conn)
}

fn digest_rows<I>(rows: I) -> Result<TableDigest>
where
    I: Iterator<Item = rusqlite::Result<(String, Vec<u8>)>>,
{
    let mut hasher = Hasher::new();
    let mut count = 0;
    for row in rows {
        let (key, data) = row?;
        hasher.update(key.as_bytes());
        hasher.update(b"\0");
        hasher.update(&(data.len() as u64).to_le_bytes());
        hasher.update(&data);
        count += 1;
    }
    Ok(TableDigest {
        rows: count,
        hash: hasher.finalize().to_hex().to_string(),
    })
}
