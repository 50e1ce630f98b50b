//! SQLite-backed persistent cache storage.

use super::traits::{CacheStats, CacheStorage, NamespaceMeta};
use crate::error::{NetfirstError, Result};
use crate::http::{RequestKey, Response, ResponseType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite-based cache storage.
///
/// All namespaces share one database file and survive process restarts.
/// Thread-safe via internal mutex on the connection, which also provides the
/// per-key atomicity [`CacheStorage`] requires.
pub struct SqliteCacheStorage {
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStorage {
    /// Open (or create) the cache database at the given path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| NetfirstError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| NetfirstError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // WAL keeps readers unblocked while a background write is in flight
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| NetfirstError::Database {
            message: format!("Failed to set pragmas: {}", e),
            source: Some(e),
        })?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema()?;

        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(NetfirstError::lock_poisoned)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Namespaces, id preserves creation order
            CREATE TABLE IF NOT EXISTS cache_namespaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                last_modified TEXT
            );

            -- Stored responses keyed by request identity
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL
                    REFERENCES cache_namespaces(namespace) ON DELETE CASCADE,
                key TEXT NOT NULL,
                status INTEGER NOT NULL,
                response_type TEXT NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            "#,
        )
        .map_err(|e| NetfirstError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn ensure_namespace(conn: &Connection, namespace: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO cache_namespaces (namespace, created_at) VALUES (?1, ?2)",
            params![namespace, Utc::now().to_rfc3339()],
        )
        .map_err(|e| NetfirstError::Database {
            message: format!("Failed to create namespace '{}': {}", namespace, e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn parse_time(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl CacheStorage for SqliteCacheStorage {
    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT namespace FROM cache_namespaces ORDER BY id")
            .map_err(|e| NetfirstError::Database {
                message: format!("Failed to prepare namespace query: {}", e),
                source: Some(e),
            })?;

        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn has(&self, namespace: &str) -> Result<bool> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM cache_namespaces WHERE namespace = ?1",
                params![namespace],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    fn open(&self, namespace: &str) -> Result<()> {
        let conn = self.lock()?;
        Self::ensure_namespace(&conn, namespace)
    }

    fn delete(&self, namespace: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let entries = tx
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(|e| NetfirstError::Database {
                message: format!("Failed to delete entries of '{}': {}", namespace, e),
                source: Some(e),
            })?;
        let deleted = tx.execute(
            "DELETE FROM cache_namespaces WHERE namespace = ?1",
            params![namespace],
        )?;
        tx.commit()?;

        if deleted > 0 {
            debug!("Deleted namespace '{}' ({} entries)", namespace, entries);
        }
        Ok(deleted > 0)
    }

    fn put(&self, namespace: &str, key: &RequestKey, response: &Response) -> Result<()> {
        let headers = serde_json::to_string(&response.headers)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::ensure_namespace(&tx, namespace)?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (namespace, key, status, response_type, headers, body, size_bytes, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                namespace,
                key.as_str(),
                response.status,
                response.response_type.as_str(),
                headers,
                response.body.as_ref(),
                response.size_bytes() as i64,
                now,
            ],
        )
        .map_err(|e| NetfirstError::Database {
            message: format!("Failed to store cache entry: {}", e),
            source: Some(e),
        })?;
        tx.execute(
            "UPDATE cache_namespaces SET last_modified = ?1 WHERE namespace = ?2",
            params![now, namespace],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn match_request(&self, namespace: &str, key: &RequestKey) -> Result<Option<Response>> {
        let conn = self.lock()?;

        let row: Option<(u16, String, String, Vec<u8>)> = conn
            .query_row(
                r#"
                SELECT status, response_type, headers, body
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2
                "#,
                params![namespace, key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| NetfirstError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let Some((status, response_type, headers, body)) = row else {
            return Ok(None);
        };

        let response_type = ResponseType::parse(&response_type).ok_or_else(|| {
            NetfirstError::Other(format!("Unknown stored response type: {}", response_type))
        })?;

        Ok(Some(Response {
            status,
            response_type,
            headers: serde_json::from_str(&headers)?,
            body: body.into(),
        }))
    }

    fn entries(&self, namespace: &str) -> Result<Vec<RequestKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM cache_entries WHERE namespace = ?1 ORDER BY key",
        )?;

        let raw = stmt
            .query_map(params![namespace], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.iter().map(|k| RequestKey::parse(k)).collect()
    }

    fn remove(&self, namespace: &str, key: &RequestKey) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT n.namespace, n.created_at, n.last_modified,
                       COUNT(e.key), COALESCE(SUM(e.size_bytes), 0)
                FROM cache_namespaces n
                LEFT JOIN cache_entries e ON e.namespace = n.namespace
                GROUP BY n.id
                ORDER BY n.id
                "#,
            )
            .map_err(|e| NetfirstError::Database {
                message: format!("Failed to prepare namespace stats query: {}", e),
                source: Some(e),
            })?;

        let namespaces = stmt
            .query_map([], |row| {
                let namespace: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                let last_modified: Option<String> = row.get(2)?;
                let entry_count: i64 = row.get(3)?;
                let total_size_bytes: i64 = row.get(4)?;
                Ok((namespace, created_at, last_modified, entry_count, total_size_bytes))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(
                |(namespace, created_at, last_modified, entry_count, total_size_bytes)| {
                    NamespaceMeta {
                        namespace,
                        entry_count: entry_count as usize,
                        total_size_bytes: total_size_bytes as u64,
                        created_at: Self::parse_time(&created_at).unwrap_or_else(Utc::now),
                        last_modified: last_modified.as_deref().and_then(Self::parse_time),
                    }
                },
            )
            .collect();

        Ok(CacheStats::from_namespaces(namespaces))
    }
}
