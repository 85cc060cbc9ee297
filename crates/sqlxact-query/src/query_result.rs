//! Record lists filled from a query.

use std::sync::Arc;

use sqlxact_core::{Context, Cursor, Dialect, Error, IsolationLevel, Result, Value, in_transaction};
use sqlxact_schema::RecordList;

use crate::query::{Query, QueryDef};

/// A record list bound to a query that has a result record type.
///
/// `refresh` replaces the contents with the rows the query returns.
#[derive(Debug, Clone)]
pub struct QueryResult {
    query: Query,
    records: RecordList,
    isolation_level: Option<IsolationLevel>,
}

impl QueryResult {
    pub fn new(def: &Arc<QueryDef>) -> Result<Self> {
        let record_def = def.result_def().ok_or_else(|| {
            Error::Definition(format!(
                "query {} has no result record type and can not back a result list",
                def.name()
            ))
        })?;
        Ok(Self {
            records: RecordList::new(record_def),
            query: Query::new(def),
            isolation_level: None,
        })
    }

    /// Isolation level used by [`QueryResult::refresh`].
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    pub fn records(&self) -> &RecordList {
        &self.records
    }

    /// Replace the contents. The list must hold the query's result type.
    pub fn set_records(&mut self, records: RecordList) -> Result<()> {
        if !Arc::ptr_eq(records.def(), self.records.def()) {
            return Err(Error::WrongRecordType {
                expected: self.records.def().name().to_string(),
                found: records.def().name().to_string(),
            });
        }
        self.records = records;
        Ok(())
    }

    pub fn into_records(self) -> RecordList {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn set_context(&mut self, context: &Context) -> Result<()> {
        self.query.set_context(context)
    }

    pub fn get_context(&self) -> Context {
        self.query.get_context()
    }

    /// Take query parameters from `context` and return the statement and its
    /// parameters.
    pub fn context_select_sql(
        &mut self,
        context: &Context,
        dialect: Dialect,
    ) -> Result<(String, Vec<Value>)> {
        self.query.set_context(context)?;
        Ok((
            self.query.query_sql(dialect),
            self.query.query_values_sql_repr(dialect),
        ))
    }

    /// Replace the contents with the remaining rows of an executed query.
    pub fn load(&mut self, cursor: &mut dyn Cursor) -> Result<()> {
        self.records = self.query.result_recordlist(cursor)?;
        Ok(())
    }

    /// Run the query in its own database transaction and store the rows.
    pub fn refresh(&mut self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        self.records.clear();
        let isolation_level = self.isolation_level;
        in_transaction(cursor, dialect, isolation_level, |cursor| {
            self.query.execute(cursor, dialect)?;
            self.load(cursor)
        })?;
        tracing::debug!(
            query = %self.query.def().name(),
            rows = self.records.len(),
            "Refreshed query result"
        );
        Ok(())
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a sqlxact_schema::Record;
    type IntoIter = std::slice::Iter<'a, sqlxact_schema::Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
