//! Transaction instances and the operations run on them.

use std::fmt;
use std::sync::Arc;

use sqlxact_core::{Context, Cursor, Dialect, Error, Field, Result, Value, in_transaction};
use sqlxact_query::QueryResult;
use sqlxact_schema::{Record, RecordList};

use crate::definition::{ListMember, TransactionDef};

/// Statement generator shared by the update and delete passes.
type RecordStatement =
    fn(&mut Record, Option<&mut Context>, Dialect) -> Result<(String, Vec<Value>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    InsertExisting,
    InsertNew,
    Update,
    Delete,
}

/// Values for the context fields and members of a [`TransactionDef`].
///
/// Record members start absent and list members start empty. Cloning a
/// transaction copies every member, so the copy can be changed without
/// affecting the original.
#[derive(Debug, Clone)]
pub struct Transaction {
    def: Arc<TransactionDef>,
    context_values: Vec<Value>,
    records: Vec<Option<Record>>,
    lists: Vec<ListMember>,
}

impl Transaction {
    pub fn new(def: &Arc<TransactionDef>) -> Self {
        Self {
            context_values: vec![Value::Null; def.context_fields.len()],
            records: vec![None; def.records.len()],
            lists: def.lists.iter().map(|(_, m)| m.clone()).collect(),
            def: Arc::clone(def),
        }
    }

    pub fn def(&self) -> &Arc<TransactionDef> {
        &self.def
    }

    // ========================================================================
    // Context fields
    // ========================================================================

    pub fn get(&self, name: &str) -> Result<&Value> {
        let i = self.def.context_field_index(name)?;
        Ok(&self.context_values[i])
    }

    /// Set a context field, converting the value to the field's type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let i = self.def.context_field_index(name)?;
        self.context_values[i] = self.def.context_fields[i].convert(value.into())?;
        Ok(())
    }

    /// Builder-style [`Transaction::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    // ========================================================================
    // Members
    // ========================================================================

    pub fn record(&self, name: &str) -> Result<Option<&Record>> {
        let i = self.def.record_index(name)?;
        Ok(self.records[i].as_ref())
    }

    pub fn record_mut(&mut self, name: &str) -> Result<Option<&mut Record>> {
        let i = self.def.record_index(name)?;
        Ok(self.records[i].as_mut())
    }

    /// Attach a record. It must be an instance of the member's definition.
    pub fn set_record(&mut self, name: &str, record: Record) -> Result<()> {
        let i = self.def.record_index(name)?;
        let expected = &self.def.records[i].1;
        if !record.is_instance_of(expected) {
            return Err(Error::WrongRecordType {
                expected: expected.name().to_string(),
                found: record.def().name().to_string(),
            });
        }
        self.records[i] = Some(record);
        Ok(())
    }

    /// Builder-style [`Transaction::set_record`].
    pub fn with_record(mut self, name: &str, record: Record) -> Result<Self> {
        self.set_record(name, record)?;
        Ok(self)
    }

    /// Detach and return a record member.
    pub fn take_record(&mut self, name: &str) -> Result<Option<Record>> {
        let i = self.def.record_index(name)?;
        Ok(self.records[i].take())
    }

    /// Return a record member, creating an empty one first if it is absent.
    /// An existing record is returned unchanged.
    pub fn ensure_record(&mut self, name: &str) -> Result<&mut Record> {
        let i = self.def.record_index(name)?;
        let def = &self.def.records[i].1;
        Ok(self.records[i].get_or_insert_with(|| Record::new(def)))
    }

    /// Records held by a list member of either kind.
    pub fn record_list(&self, name: &str) -> Result<&RecordList> {
        let i = self.def.list_index(name)?;
        Ok(self.lists[i].records())
    }

    /// Mutable access to a record list member. Query results can only be
    /// changed through [`Transaction::query_result_mut`].
    pub fn record_list_mut(&mut self, name: &str) -> Result<&mut RecordList> {
        let i = self.def.list_index(name)?;
        match &mut self.lists[i] {
            ListMember::Records(list) => Ok(list),
            ListMember::Query(_) => Err(Error::Definition(format!(
                "member '{name}' of {} is a query result",
                self.def.name
            ))),
        }
    }

    /// Replace a record list member. The list must hold the member's record
    /// type.
    pub fn set_record_list(&mut self, name: &str, list: RecordList) -> Result<()> {
        let target = self.record_list_mut(name)?;
        if !Arc::ptr_eq(target.def(), list.def()) {
            return Err(Error::WrongRecordType {
                expected: target.def().name().to_string(),
                found: list.def().name().to_string(),
            });
        }
        *target = list;
        Ok(())
    }

    /// Builder-style [`Transaction::set_record_list`].
    pub fn with_record_list(mut self, name: &str, list: RecordList) -> Result<Self> {
        self.set_record_list(name, list)?;
        Ok(self)
    }

    pub fn query_result(&self, name: &str) -> Result<&QueryResult> {
        let i = self.def.list_index(name)?;
        match &self.lists[i] {
            ListMember::Query(result) => Ok(result),
            ListMember::Records(_) => Err(not_a_query(&self.def.name, name)),
        }
    }

    pub fn query_result_mut(&mut self, name: &str) -> Result<&mut QueryResult> {
        let i = self.def.list_index(name)?;
        match &mut self.lists[i] {
            ListMember::Query(result) => Ok(result),
            ListMember::Records(_) => Err(not_a_query(&self.def.name, name)),
        }
    }

    // ========================================================================
    // Context building
    // ========================================================================

    fn collect_context<F>(&mut self, mut resolve: F) -> Result<Context>
    where
        F: FnMut(&Field, &mut Value, &mut Context) -> Result<Value>,
    {
        let def = Arc::clone(&self.def);
        let mut context = Context::for_transaction(def.name(), def.version.clone());
        for (field, slot) in def.context_fields.iter().zip(self.context_values.iter_mut()) {
            let value = resolve(field, slot, &mut context)?;
            if !value.is_null() {
                context.set(field.name(), value);
            }
        }
        Ok(context)
    }

    /// Context from the stored, non-NULL context field values. No database
    /// access.
    pub fn get_context(&mut self) -> Result<Context> {
        self.collect_context(|field, slot, context| field.get_context(slot, context))
    }

    /// Context after re-reading every linked context field. Sequences are
    /// not advanced.
    pub fn get_refreshed_context(
        &mut self,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<Context> {
        self.collect_context(|field, slot, context| {
            field.refresh(slot, context, &mut *cursor, dialect)
        })
    }

    /// Context after updating every context field: linked sequences advance
    /// and timestamps are stamped.
    pub fn get_updated_context(
        &mut self,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<Context> {
        self.collect_context(|field, slot, context| {
            field.update(slot, context, &mut *cursor, dialect)
        })
    }

    /// Merge the context values stored in every member record. Later members
    /// win when two records disagree.
    pub fn context_from_records(&self) -> Context {
        let mut context = Context::new();
        for record in self.records.iter().flatten() {
            context.extend(record.context_values_stored());
        }
        for list in &self.lists {
            for record in list.records() {
                context.extend(record.context_values_stored());
            }
        }
        context
    }

    /// Fill context fields that are still NULL from the values stored in the
    /// member records.
    pub fn backfill_context(&mut self) -> Result<()> {
        let found = self.context_from_records();
        let def = Arc::clone(&self.def);
        for (field, slot) in def.context_fields.iter().zip(self.context_values.iter_mut()) {
            if slot.is_null() {
                if let Some(value) = found.get(field.name()) {
                    *slot = field.convert(value.clone())?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Insert every table member using the stored context values.
    #[tracing::instrument(level = "debug", skip(self, cursor), fields(transaction = %self.def.name))]
    pub fn insert_existing(&mut self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        self.write(WriteOp::InsertExisting, cursor, dialect)
    }

    /// Insert every table member after updating the context, so linked
    /// sequences hand out fresh values.
    #[tracing::instrument(level = "debug", skip(self, cursor), fields(transaction = %self.def.name))]
    pub fn insert_new(&mut self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        self.write(WriteOp::InsertNew, cursor, dialect)
    }

    /// Update every table member by primary key, list members first and in
    /// reverse declaration order.
    #[tracing::instrument(level = "debug", skip(self, cursor), fields(transaction = %self.def.name))]
    pub fn update(&mut self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        self.write(WriteOp::Update, cursor, dialect)
    }

    /// Delete every table member by primary key, in the same order as
    /// [`Transaction::update`].
    #[tracing::instrument(level = "debug", skip(self, cursor), fields(transaction = %self.def.name))]
    pub fn delete(&mut self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        self.write(WriteOp::Delete, cursor, dialect)
    }

    fn write(&mut self, op: WriteOp, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        let hooks = Arc::clone(&self.def.hooks);
        in_transaction(cursor, dialect, self.def.isolation_level, |cursor| {
            let mut context = match op {
                WriteOp::InsertNew => self.get_updated_context(cursor, dialect)?,
                _ => self.get_context()?,
            };

            let verdict = match op {
                WriteOp::InsertExisting | WriteOp::InsertNew => {
                    hooks.pre_insert(self, &context, cursor)?
                }
                WriteOp::Update => hooks.pre_update(self, &context, cursor)?,
                WriteOp::Delete => hooks.pre_delete(self, &context, cursor)?,
            };
            verdict.into_result()?;
            hooks.verify(self).into_result()?;

            match op {
                WriteOp::InsertExisting | WriteOp::InsertNew => {
                    self.insert_members(&mut context, cursor, dialect)
                }
                WriteOp::Update => {
                    self.write_members_reversed(Record::update_sql, &mut context, cursor, dialect)
                }
                WriteOp::Delete => {
                    self.write_members_reversed(Record::delete_sql, &mut context, cursor, dialect)
                }
            }
        })?;
        tracing::info!(transaction = %self.def.name, operation = ?op, "Transaction written");
        Ok(())
    }

    fn insert_members(
        &mut self,
        context: &mut Context,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<()> {
        for record in self.records.iter_mut().flatten() {
            if !record.def().is_table() {
                continue;
            }
            let (sql, params) = record.insert_sql(Some(&mut *context), dialect)?;
            cursor.execute(&sql, &params)?;
        }
        for member in &mut self.lists {
            let ListMember::Records(list) = member else {
                continue;
            };
            if !list.def().is_table() || list.is_empty() {
                continue;
            }
            let sql = list.def().insert_sql_command(dialect)?;
            let rows = list.values_sql_repr(Some(&mut *context), dialect)?;
            tracing::debug!(table = %list.def().name(), rows = rows.len(), "Inserting record list");
            cursor.executemany(&sql, &rows)?;
        }
        Ok(())
    }

    fn write_members_reversed(
        &mut self,
        statement: RecordStatement,
        context: &mut Context,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<()> {
        for member in self.lists.iter_mut().rev() {
            let ListMember::Records(list) = member else {
                continue;
            };
            if !list.def().is_table() {
                continue;
            }
            for record in list.iter_mut() {
                let (sql, params) = statement(record, Some(&mut *context), dialect)?;
                cursor.execute(&sql, &params)?;
            }
        }
        for record in self.records.iter_mut().rev().flatten() {
            if !record.def().is_table() {
                continue;
            }
            let (sql, params) = statement(record, Some(&mut *context), dialect)?;
            cursor.execute(&sql, &params)?;
        }
        Ok(())
    }

    /// Read every member back from the database using the refreshed context.
    ///
    /// Record members are created if absent, then filled from the first
    /// matching row or cleared if nothing matched. List members are replaced
    /// by every matching row. The post-select hook runs afterwards, then
    /// [`crate::TransactionHooks::verify`].
    #[tracing::instrument(level = "debug", skip(self, cursor), fields(transaction = %self.def.name))]
    pub fn context_select(
        &mut self,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
        allow_unlimited: bool,
    ) -> Result<()> {
        let hooks = Arc::clone(&self.def.hooks);
        in_transaction(cursor, dialect, self.def.isolation_level, |cursor| {
            let context = self.get_refreshed_context(cursor, dialect)?;
            self.select_members(&context, cursor, dialect, allow_unlimited)?;
            hooks.post_select(self, &context, cursor)?.into_result()
        })?;
        hooks.verify(self).into_result()?;
        tracing::info!(transaction = %self.def.name, "Transaction selected");
        Ok(())
    }

    fn select_members(
        &mut self,
        context: &Context,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
        allow_unlimited: bool,
    ) -> Result<()> {
        let def = Arc::clone(&self.def);
        for (slot, (_, record_def)) in self.records.iter_mut().zip(&def.records) {
            let record = slot.get_or_insert_with(|| Record::new(record_def));
            if record_def.object_name().is_none() {
                record.clear();
                continue;
            }
            let (sql, params) = record_def.context_select_sql(context, dialect, allow_unlimited)?;
            cursor.execute(&sql, &params)?;
            match cursor.fetchone()? {
                Some(row) => record.set_values(row)?,
                None => record.clear(),
            }
        }

        for member in &mut self.lists {
            member.clear();
            match member {
                ListMember::Records(list) => {
                    if list.def().object_name().is_none() {
                        continue;
                    }
                    let (sql, params) = list.context_select_sql(context, dialect, allow_unlimited)?;
                    cursor.execute(&sql, &params)?;
                    list.set_rows(cursor.fetchall()?)?;
                }
                ListMember::Query(result) => {
                    let (sql, params) = result.context_select_sql(context, dialect)?;
                    cursor.execute(&sql, &params)?;
                    result.load(cursor)?;
                }
            }
        }
        Ok(())
    }
}

fn not_a_query(owner: &str, name: &str) -> Error {
    Error::Definition(format!("member '{name}' of {owner} is not a query result"))
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.def.name)?;
        for (field, value) in self.def.context_fields.iter().zip(&self.context_values) {
            writeln!(f, "* {} = {}", field.name(), value)?;
        }
        for ((name, _), record) in self.def.records.iter().zip(&self.records) {
            match record {
                Some(record) => writeln!(f, "* {name} {record}")?,
                None => writeln!(f, "* {name} (absent)")?,
            }
        }
        for ((name, _), list) in self.def.lists.iter().zip(&self.lists) {
            writeln!(f, "* {name} [{} records]", list.records().len())?;
            for record in list.records() {
                writeln!(f, "  - {record}")?;
            }
        }
        Ok(())
    }
}
