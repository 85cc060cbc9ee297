//! A cursor wrapper that writes every call to a log.

use std::io::Write;

use sqlxact_core::{Cursor, Result, Row, Value};

/// Wraps another [`Cursor`] and describes each call on `writer` before
/// passing it through. Results and errors are returned unchanged.
///
/// ```ignore
/// let mut cursor = LoggingCursor::new(SqliteCursor::open_in_memory()?, std::io::stdout());
/// ```
#[derive(Debug)]
pub struct LoggingCursor<C, W> {
    inner: C,
    writer: W,
}

impl<C: Cursor, W: Write> LoggingCursor<C, W> {
    pub fn new(inner: C, writer: W) -> Self {
        Self { inner, writer }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Split into the wrapped cursor and the writer.
    pub fn into_parts(self) -> (C, W) {
        (self.inner, self.writer)
    }
}

fn describe(params: &[Value]) -> String {
    let items: Vec<String> = params.iter().map(ToString::to_string).collect();
    format!("({})", items.join(", "))
}

impl<C: Cursor, W: Write> Cursor for LoggingCursor<C, W> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        writeln!(self.writer, "Executed SQL: '{sql}' with params {}", describe(params))?;
        self.inner.execute(sql, params)
    }

    fn executemany(&mut self, sql: &str, rows: &[Row]) -> Result<()> {
        writeln!(self.writer, "Executed SQL: '{sql}' with params:")?;
        for row in rows {
            writeln!(self.writer, "{}", describe(row))?;
        }
        writeln!(self.writer)?;
        self.inner.executemany(sql, rows)
    }

    fn fetchone(&mut self) -> Result<Option<Row>> {
        let row = self.inner.fetchone()?;
        match &row {
            Some(values) => writeln!(self.writer, "Fetched a row:\n{}", describe(values))?,
            None => writeln!(self.writer, "Fetched a row:\nNone")?,
        }
        Ok(row)
    }

    fn fetchmany(&mut self, size: usize) -> Result<Vec<Row>> {
        let rows = self.inner.fetchmany(size)?;
        writeln!(self.writer, "Fetched {} rows", rows.len())?;
        Ok(rows)
    }

    fn fetchall(&mut self) -> Result<Vec<Row>> {
        let rows = self.inner.fetchall()?;
        writeln!(self.writer, "Fetched {} rows", rows.len())?;
        Ok(rows)
    }

    fn close(&mut self) -> Result<()> {
        writeln!(self.writer, "Closed cursor")?;
        self.writer.flush()?;
        self.inner.close()
    }
}
