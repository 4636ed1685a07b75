//! SQLite implementation of the GraphStore trait.
//!
//! A durable local replica. It uses rusqlite with bundled SQLite, wrapped in
//! async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use vellum_core::now_millis;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{CasOutcome, GraphStore, Node};

const KIND_VALUE: i64 = 0;
const KIND_TOMBSTONE: i64 = 1;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

fn row_to_node(kind: i64, data: Option<Vec<u8>>, stamp: i64) -> Result<Node> {
    match (kind, data) {
        (KIND_VALUE, Some(data)) => Ok(Node::Value(Bytes::from(data))),
        (KIND_TOMBSTONE, _) => Ok(Node::Tombstone { deleted_at: stamp }),
        (kind, _) => Err(StoreError::InvalidData(format!(
            "unexpected node kind {kind}"
        ))),
    }
}

fn read_node(conn: &Connection, path: &str) -> Result<Option<Node>> {
    let row: Option<(i64, Option<Vec<u8>>, i64)> = conn
        .query_row(
            "SELECT kind, data, stamp FROM nodes WHERE path = ?1",
            params![path],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    row.map(|(kind, data, stamp)| row_to_node(kind, data, stamp))
        .transpose()
}

fn write_node(conn: &Connection, path: &str, node: &Node) -> Result<()> {
    let (kind, data, stamp) = match node {
        Node::Value(bytes) => (KIND_VALUE, Some(bytes.to_vec()), now_millis()),
        Node::Tombstone { deleted_at } => (KIND_TOMBSTONE, None, *deleted_at),
    };

    conn.execute(
        "INSERT INTO nodes (path, kind, data, stamp) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(path) DO UPDATE SET kind = excluded.kind, data = excluded.data, stamp = excluded.stamp",
        params![path, kind, data, stamp],
    )?;
    Ok(())
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn put(&self, path: &str, node: Node) -> Result<()> {
        let path = path.to_string();
        self.run(move |conn| write_node(conn, &path, &node)).await
    }

    async fn get(&self, path: &str) -> Result<Option<Node>> {
        let path = path.to_string();
        self.run(move |conn| read_node(conn, &path)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Node)>> {
        let prefix = prefix.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT path, kind, data, stamp FROM nodes
                 WHERE substr(path, 1, length(?1)) = ?1
                 ORDER BY path",
            )?;
            let rows = stmt.query_map(params![prefix], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<Vec<u8>>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (path, kind, data, stamp) = row?;
                out.push((path, row_to_node(kind, data, stamp)?));
            }
            Ok(out)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<&Node>,
        new: Node,
    ) -> Result<CasOutcome> {
        let path = path.to_string();
        let expected = expected.cloned();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let current = read_node(&tx, &path)?;
            if current != expected {
                return Ok(CasOutcome::Mismatch { current });
            }
            write_node(&tx, &path, &new)?;
            tx.commit()?;
            Ok(CasOutcome::Swapped)
        })
        .await
    }
}
