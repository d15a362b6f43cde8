//! Database connection management
//!
//! Wraps a single SQLite connection in WAL mode. Readers and writers share
//! the connection behind a mutex; writes are durable on return. `close` is
//! idempotent and subsequent operations report `StorageUnavailable`.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::{DurandalError, Result};

/// Storage engine wrapping SQLite
pub struct Store {
    db_path: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

/// Rows and count returned by the raw query escape hatch
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryOutput {
    pub rows: Vec<serde_json::Map<String, Value>>,
    pub row_count: usize,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Self::create_connection(db_path)?;
        run_migrations(&conn)?;

        Ok(Self {
            db_path: db_path.to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open an in-memory database (used by tests and the self-test)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn create_connection(db_path: &str) -> Result<Connection> {
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(db_path, flags)?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-64000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| DurandalError::StorageUnavailable("store is closed".to_string()))?;
        f(conn)
    }

    /// Execute a function inside a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| DurandalError::StorageUnavailable("store is closed".to_string()))?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Run arbitrary SQL with `$1,$2,…` positional placeholders
    ///
    /// Maintenance/self-test escape hatch. Placeholders are translated to
    /// SQLite's `?N` form; all values are bound as parameters.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        let sql = translate_placeholders(sql);
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let column_names: Vec<String> =
                stmt.column_names().iter().map(|s| s.to_string()).collect();

            let bound: Vec<Box<dyn rusqlite::ToSql>> =
                params.iter().map(json_to_sql).collect::<Result<_>>()?;

            if stmt.column_count() == 0 {
                let count = stmt.execute(rusqlite::params_from_iter(
                    bound.iter().map(|p| p.as_ref()),
                ))?;
                return Ok(QueryOutput {
                    rows: Vec::new(),
                    row_count: count,
                });
            }

            let mut rows = stmt.query(rusqlite::params_from_iter(
                bound.iter().map(|p| p.as_ref()),
            ))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = serde_json::Map::new();
                for (idx, name) in column_names.iter().enumerate() {
                    record.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?));
                }
                out.push(record);
            }
            let row_count = out.len();
            Ok(QueryOutput {
                rows: out,
                row_count,
            })
        })
    }

    /// Database size in bytes
    pub fn db_size(&self) -> Result<i64> {
        self.with_connection(|conn| {
            let size: i64 = conn.query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )?;
            Ok(size)
        })
    }

    /// Vacuum the database to reclaim space
    pub fn vacuum(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
    }

    /// Maintenance pass: refresh planner statistics, rebuild derived
    /// indices, and compact. Safe to call at any time.
    pub fn optimize(&self) -> Result<crate::types::StoreSnapshot> {
        self.with_connection(super::queries::analyze_and_reindex)?;
        self.vacuum()?;

        let total_memories =
            self.with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?)
            })?;
        Ok(crate::types::StoreSnapshot {
            total_memories,
            db_size_bytes: self.db_size()?,
        })
    }

    /// Release the underlying handle; safe to call more than once
    pub fn close(&self) {
        let mut guard = self.conn.lock();
        if let Some(conn) = guard.take() {
            let _ = conn.close();
        }
    }

    /// Whether the store has been closed
    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    /// Database path
    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            conn: self.conn.clone(),
        }
    }
}

/// Translate `$1,$2,…` placeholders into SQLite's `?1,?2,…`
///
/// Dollar placeholders inside single-quoted string literals are left alone.
pub fn translate_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if c == '$' && !in_string && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            out.push('?');
            continue;
        }
        out.push(c);
    }

    out
}

fn json_to_sql(value: &Value) -> Result<Box<dyn rusqlite::ToSql>> {
    Ok(match value {
        Value::Null => Box::new(None::<String>),
        Value::Bool(b) => Box::new(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else if let Some(f) = n.as_f64() {
                Box::new(f)
            } else {
                return Err(DurandalError::validation("params", "unsupported number"));
            }
        }
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    })
}

fn value_ref_to_json(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.db_path(), ":memory:");
    }

    #[test]
    fn close_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.close();
        store.close();
        assert!(store.is_closed());
        let err = store.with_connection(|_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), "StorageUnavailable");
    }

    #[test]
    fn translate_dollar_placeholders() {
        assert_eq!(
            translate_placeholders("SELECT * FROM memories WHERE id = $1 AND content LIKE $2"),
            "SELECT * FROM memories WHERE id = ?1 AND content LIKE ?2"
        );
        // Dollar signs inside string literals are untouched
        assert_eq!(
            translate_placeholders("SELECT '$1' WHERE id = $1"),
            "SELECT '$1' WHERE id = ?1"
        );
        // A bare dollar without a digit is untouched
        assert_eq!(translate_placeholders("SELECT '$' || $1"), "SELECT '$' || ?1");
    }

    #[test]
    fn raw_query_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let out = store
            .query(
                "INSERT INTO memories (content, metadata, created_at) VALUES ($1, $2, $3)",
                &[
                    json!("raw insert"),
                    json!("{}"),
                    json!("2026-01-01T00:00:00Z"),
                ],
            )
            .unwrap();
        assert_eq!(out.row_count, 1);

        let out = store
            .query("SELECT content FROM memories WHERE content = $1", &[json!("raw insert")])
            .unwrap();
        assert_eq!(out.row_count, 1);
        assert_eq!(out.rows[0].get("content").unwrap(), "raw insert");
    }
}
