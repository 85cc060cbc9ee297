//! A [`Cursor`] over a `rusqlite` connection.

use std::collections::VecDeque;

use rusqlite::Connection;
use rusqlite::types::Value as SqliteValue;
use sqlxact_core::{Cursor, Dialect, Error, Result, Row, Value};

use crate::config::SqliteConfig;

/// A SQLite connection exposed through the [`Cursor`] interface.
///
/// Rows produced by a statement are read eagerly and buffered until fetched
/// or until the next statement runs. The connection is in autocommit mode
/// unless a `BEGIN` statement is executed.
pub struct SqliteCursor {
    conn: Connection,
    rows: VecDeque<Row>,
    rowcount: usize,
    closed: bool,
}

impl SqliteCursor {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(Error::driver)?;
        conn.busy_timeout(config.busy_timeout())
            .map_err(Error::driver)?;
        if config.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(Error::driver)?;
        }
        tracing::debug!(
            path = ?config.path,
            foreign_keys = config.foreign_keys,
            "Opened SQLite database"
        );
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database with the default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            rows: VecDeque::new(),
            rowcount: 0,
            closed: false,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Rows changed by the last statement that returned no rows.
    pub fn rowcount(&self) -> usize {
        self.rowcount
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Query("cursor is closed".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCursor")
            .field("buffered_rows", &self.rows.len())
            .field("rowcount", &self.rowcount)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Map a value onto one of SQLite's storage classes.
fn to_sqlite(value: &Value) -> SqliteValue {
    match Dialect::Sqlite.sql_repr(value) {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(b)),
        Value::SmallInt(v) => SqliteValue::Integer(i64::from(v)),
        Value::Int(v) => SqliteValue::Integer(i64::from(v)),
        Value::BigInt(v) => SqliteValue::Integer(v),
        Value::Double(v) => SqliteValue::Real(v),
        Value::Bytes(v) => SqliteValue::Blob(v),
        Value::Text(v) => SqliteValue::Text(v),
        other => SqliteValue::Text(other.to_string()),
    }
}

fn from_sqlite(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(v) => Value::BigInt(v),
        SqliteValue::Real(v) => Value::Double(v),
        SqliteValue::Text(v) => Value::Text(v),
        SqliteValue::Blob(v) => Value::Bytes(v),
    }
}

impl Cursor for SqliteCursor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.check_open()?;
        self.rows.clear();
        self.rowcount = 0;
        tracing::trace!(sql = %sql, params = params.len(), "Executing statement");

        let mut stmt = self.conn.prepare(sql).map_err(Error::driver)?;
        let params = rusqlite::params_from_iter(params.iter().map(to_sqlite));
        let columns = stmt.column_count();
        if columns == 0 {
            self.rowcount = stmt.execute(params).map_err(Error::driver)?;
            return Ok(());
        }

        let mut rows = stmt.query(params).map_err(Error::driver)?;
        while let Some(row) = rows.next().map_err(Error::driver)? {
            let values = (0..columns)
                .map(|i| row.get::<_, SqliteValue>(i).map(from_sqlite))
                .collect::<rusqlite::Result<Row>>()
                .map_err(Error::driver)?;
            self.rows.push_back(values);
        }
        Ok(())
    }

    fn fetchone(&mut self) -> Result<Option<Row>> {
        self.check_open()?;
        Ok(self.rows.pop_front())
    }

    fn fetchall(&mut self) -> Result<Vec<Row>> {
        self.check_open()?;
        Ok(self.rows.drain(..).collect())
    }

    fn close(&mut self) -> Result<()> {
        self.rows.clear();
        self.closed = true;
        Ok(())
    }
}
