//! Sequences of integer identifiers.
//!
//! PostgreSQL has native sequences. SQLite has none, so a sequence is emulated
//! by a single-row table holding the start, the interval and the last and next
//! values.

use sqlxact_core::{Context, ContextSource, Cursor, Dialect, Error, Result, Value, validate_identifier};

/// A named sequence.
///
/// A field linked to a sequence takes a fresh value from it on `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    name: String,
    sql_name: String,
    schema: Option<String>,
    start: i64,
    interval: i64,
    index_type: String,
    sql_options: String,
}

impl Sequence {
    /// A sequence starting at 1 with interval 1.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sql_name: name.clone(),
            name,
            schema: None,
            start: 1,
            interval: 1,
            index_type: "BIGINT".to_string(),
            sql_options: String::new(),
        }
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    pub fn interval(mut self, interval: i64) -> Self {
        self.interval = interval;
        self
    }

    pub fn sql_name(mut self, sql_name: impl Into<String>) -> Self {
        self.sql_name = sql_name.into();
        self
    }

    /// The SQL integer type of the values.
    pub fn index_type(mut self, index_type: impl Into<String>) -> Self {
        self.index_type = index_type.into();
        self
    }

    /// Extra SQL appended to the sequence definition.
    pub fn sql_options(mut self, options: impl Into<String>) -> Self {
        self.sql_options = options.into();
        self
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Check the names and the interval.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        validate_identifier(&self.sql_name)?;
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }
        if self.interval == 0 {
            return Err(Error::Definition(format!(
                "sequence {} has a zero interval",
                self.name
            )));
        }
        Ok(())
    }

    pub fn qualified_name(&self, dialect: Dialect) -> String {
        dialect.qualified_name(self.schema(), &self.sql_name)
    }

    pub fn create_sequence_sql(&self, dialect: Dialect) -> Vec<String> {
        dialect.create_sequence_sql(
            &self.qualified_name(dialect),
            self.start,
            self.interval,
            &self.index_type,
            &self.sql_options,
        )
    }

    pub fn nextval_sequence_sql(&self, dialect: Dialect) -> Vec<String> {
        dialect.nextval_sequence_sql(&self.qualified_name(dialect))
    }

    pub fn reset_sequence_sql(&self, dialect: Dialect) -> Vec<String> {
        dialect.reset_sequence_sql(&self.qualified_name(dialect))
    }

    pub fn create(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        self.validate()?;
        tracing::info!(sequence = %self.qualified_name(dialect), "Creating sequence");
        for sql in self.create_sequence_sql(dialect) {
            cursor.execute(&sql, &[])?;
        }
        Ok(())
    }

    /// Advance the sequence and return the new value.
    pub fn nextval(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<i64> {
        for sql in self.nextval_sequence_sql(dialect) {
            cursor.execute(&sql, &[])?;
        }
        let row = cursor.fetchone()?.ok_or_else(|| {
            Error::Query(format!("sequence {} returned no value", self.name))
        })?;
        let value = row
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Query(format!("sequence {} returned a non-integer", self.name)))?;
        tracing::debug!(sequence = %self.name, value, "Advanced sequence");
        Ok(value)
    }

    /// Restart the sequence at its start value.
    pub fn reset(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        for sql in self.reset_sequence_sql(dialect) {
            cursor.execute(&sql, &[])?;
        }
        Ok(())
    }
}

impl ContextSource for Sequence {
    fn describe(&self) -> String {
        format!("sequence {}", self.name)
    }

    fn refresh(&self, _: &Context, _: &mut dyn Cursor, _: Dialect) -> Result<Option<Value>> {
        Ok(None)
    }

    fn update(&self, _: &Context, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<Value> {
        self.nextval(cursor, dialect).map(Value::BigInt)
    }
}
