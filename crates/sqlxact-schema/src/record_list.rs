//! Ordered, type-checked lists of records.

use std::sync::Arc;

use sqlxact_core::{Context, Dialect, Error, Result, Row, Value};

use crate::record::{Record, RecordDef};

/// A list of records that all share one definition.
///
/// Every operation that adds records checks that they were built from the
/// list's definition and fails with [`Error::WrongRecordType`] otherwise.
#[derive(Debug, Clone)]
pub struct RecordList {
    def: Arc<RecordDef>,
    records: Vec<Record>,
}

impl RecordList {
    pub fn new(def: &Arc<RecordDef>) -> Self {
        Self {
            def: Arc::clone(def),
            records: Vec::new(),
        }
    }

    pub fn from_records(
        def: &Arc<RecordDef>,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self> {
        let mut list = Self::new(def);
        list.extend(records)?;
        Ok(list)
    }

    pub fn def(&self) -> &Arc<RecordDef> {
        &self.def
    }

    fn check(&self, record: &Record) -> Result<()> {
        if record.is_instance_of(&self.def) {
            Ok(())
        } else {
            Err(Error::WrongRecordType {
                expected: self.def.name().to_string(),
                found: record.def().name().to_string(),
            })
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.records.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.records.len(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    pub fn push(&mut self, record: Record) -> Result<()> {
        self.check(&record)?;
        self.records.push(record);
        Ok(())
    }

    /// Append every record, or none of them if any has the wrong type.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) -> Result<()> {
        let records: Vec<Record> = records.into_iter().collect();
        records.iter().try_for_each(|r| self.check(r))?;
        self.records.extend(records);
        Ok(())
    }

    /// Insert a record at `index`. An index past the end appends.
    pub fn insert(&mut self, index: usize, record: Record) -> Result<()> {
        self.check(&record)?;
        let index = index.min(self.records.len());
        self.records.insert(index, record);
        Ok(())
    }

    /// Replace the record at `index`, returning the old one.
    pub fn set(&mut self, index: usize, record: Record) -> Result<Record> {
        self.check(&record)?;
        self.check_index(index)?;
        Ok(std::mem::replace(&mut self.records[index], record))
    }

    pub fn remove(&mut self, index: usize) -> Result<Record> {
        self.check_index(index)?;
        Ok(self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        self.records.iter_mut()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The values of one field across every record, in list order.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value> + '_> {
        let i = self.def.field_index(name)?;
        Ok(self.records.iter().map(move |r| &r.values()[i]))
    }

    /// Stored values of every record.
    pub fn values(&self) -> Vec<Row> {
        self.records.iter().map(|r| r.values().to_vec()).collect()
    }

    /// Resolve every record against `context`, in list order.
    pub fn values_with_context(&mut self, context: &mut Context) -> Result<Vec<Row>> {
        self.records
            .iter_mut()
            .map(|r| r.values_with_context(context))
            .collect()
    }

    /// Bound parameters for every record, optionally resolved against a
    /// context.
    pub fn values_sql_repr(
        &mut self,
        mut context: Option<&mut Context>,
        dialect: Dialect,
    ) -> Result<Vec<Row>> {
        self.records
            .iter_mut()
            .map(|r| r.values_sql_repr(context.as_deref_mut(), dialect))
            .collect()
    }

    /// Replace the contents with one record per row.
    pub fn set_rows(&mut self, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        let records = rows
            .into_iter()
            .map(|row| Record::from_row(&self.def, row))
            .collect::<Result<Vec<_>>>()?;
        self.records = records;
        Ok(())
    }

    /// Forwards to [`RecordDef::context_select_sql`].
    pub fn context_select_sql(
        &self,
        context: &Context,
        dialect: Dialect,
        allow_unlimited: bool,
    ) -> Result<(String, Vec<Value>)> {
        self.def.context_select_sql(context, dialect, allow_unlimited)
    }
}

impl PartialEq for RecordList {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def) && self.records == other.records
    }
}

impl<'a> IntoIterator for &'a RecordList {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for RecordList {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
