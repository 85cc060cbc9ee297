//! The database driver boundary.
//!
//! sqlxact never talks to a database directly. Everything goes through a
//! [`Cursor`], a minimal synchronous interface in the spirit of a DB-API
//! cursor: execute a statement with positional parameters, then fetch the
//! rows it produced.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::value::Value;

/// A result row, in column order.
pub type Row = Vec<Value>;

/// A synchronous database cursor.
pub trait Cursor {
    /// Execute one statement with positional parameters. Any rows the
    /// statement produces become available to the fetch methods.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()>;

    /// Execute one statement once per parameter row.
    fn executemany(&mut self, sql: &str, rows: &[Row]) -> Result<()> {
        for params in rows {
            self.execute(sql, params)?;
        }
        Ok(())
    }

    /// Fetch the next row of the last statement, or `None` when exhausted.
    fn fetchone(&mut self) -> Result<Option<Row>>;

    /// Fetch up to `size` rows.
    fn fetchmany(&mut self, size: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// Fetch every remaining row.
    fn fetchall(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Release the cursor.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<C: Cursor + ?Sized> Cursor for &mut C {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        (**self).execute(sql, params)
    }

    fn executemany(&mut self, sql: &str, rows: &[Row]) -> Result<()> {
        (**self).executemany(sql, rows)
    }

    fn fetchone(&mut self) -> Result<Option<Row>> {
        (**self).fetchone()
    }

    fn fetchmany(&mut self, size: usize) -> Result<Vec<Row>> {
        (**self).fetchmany(size)
    }

    fn fetchall(&mut self) -> Result<Vec<Row>> {
        (**self).fetchall()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        (**self).execute(sql, params)
    }

    fn executemany(&mut self, sql: &str, rows: &[Row]) -> Result<()> {
        (**self).executemany(sql, rows)
    }

    fn fetchone(&mut self) -> Result<Option<Row>> {
        (**self).fetchone()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

// ============================================================================
// Mock cursor
// ============================================================================

/// One statement seen by a [`MockCursor`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Error returned by a [`MockCursor`] told to fail.
#[derive(Debug, thiserror::Error)]
#[error("mock failure on statement {index}: {sql}")]
pub struct MockFailure {
    pub index: usize,
    pub sql: String,
}

/// An in-memory cursor that records every statement it is given.
///
/// Statements starting with `SELECT` (or `WITH`) consume the next queued
/// result set; other statements produce no rows. A cursor can be told to fail
/// the n-th statement (0-based) to exercise rollback paths.
#[derive(Debug, Default)]
pub struct MockCursor {
    calls: Vec<MockCall>,
    results: VecDeque<Vec<Row>>,
    current: VecDeque<Row>,
    fail_at: Option<usize>,
    closed: bool,
}

impl MockCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next row-producing statement.
    pub fn push_result(&mut self, rows: Vec<Row>) -> &mut Self {
        self.results.push_back(rows);
        self
    }

    /// Fail the statement at 0-based position `index`.
    pub fn fail_at(&mut self, index: usize) -> &mut Self {
        self.fail_at = Some(index);
        self
    }

    /// Every statement executed so far, in order.
    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    /// The SQL text of every statement executed so far.
    pub fn statements(&self) -> Vec<&str> {
        self.calls.iter().map(|c| c.sql.as_str()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn returns_rows(sql: &str) -> bool {
        let head = sql.trim_start().to_ascii_uppercase();
        head.starts_with("SELECT") || head.starts_with("WITH")
    }
}

impl Cursor for MockCursor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        let index = self.calls.len();
        self.calls.push(MockCall {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if self.fail_at == Some(index) {
            return Err(Error::driver(MockFailure {
                index,
                sql: sql.to_string(),
            }));
        }
        self.current.clear();
        if Self::returns_rows(sql) {
            self.current = self.results.pop_front().unwrap_or_default().into();
        }
        Ok(())
    }

    fn fetchone(&mut self) -> Result<Option<Row>> {
        Ok(self.current.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mut cur = MockCursor::new();
        cur.execute("INSERT INTO t (a) VALUES (?);", &[Value::Int(1)])
            .unwrap();
        cur.executemany(
            "INSERT INTO t (a) VALUES (?);",
            &[vec![Value::Int(2)], vec![Value::Int(3)]],
        )
        .unwrap();
        assert_eq!(cur.calls().len(), 3);
        assert_eq!(cur.calls()[2].params, vec![Value::Int(3)]);
    }

    #[test]
    fn test_mock_returns_queued_rows() {
        let mut cur = MockCursor::new();
        cur.push_result(vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        cur.execute("UPDATE t SET a=1;", &[]).unwrap();
        assert_eq!(cur.fetchone().unwrap(), None);
        cur.execute("SELECT a FROM t;", &[]).unwrap();
        assert_eq!(cur.fetchmany(5).unwrap().len(), 2);
        assert_eq!(cur.fetchone().unwrap(), None);
    }

    #[test]
    fn test_mock_failure() {
        let mut cur = MockCursor::new();
        cur.fail_at(1);
        cur.execute("BEGIN TRANSACTION;", &[]).unwrap();
        let err = cur.execute("INSERT INTO t VALUES (1);", &[]).unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
        assert_eq!(cur.statements().len(), 2);
    }

    #[test]
    fn test_fetchall_through_reference() {
        let mut cur = MockCursor::new();
        cur.push_result(vec![vec![Value::Int(1)]]);
        let by_ref: &mut dyn Cursor = &mut cur;
        by_ref.execute("SELECT 1;", &[]).unwrap();
        assert_eq!(by_ref.fetchall().unwrap(), vec![vec![Value::Int(1)]]);
    }
}
