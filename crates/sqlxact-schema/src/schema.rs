//! Schema registries.
//!
//! A [`Schema`] collects the enumerations, sequences, tables, views, indexes
//! and free SQL commands that live in one named schema, and creates them in
//! dependency order.

use std::collections::BTreeMap;
use std::sync::Arc;

use sqlxact_core::{Cursor, Dialect, EnumDef, Error, Result, Value, validate_identifier};

use crate::index::Index;
use crate::record::RecordDef;
use crate::sequence::Sequence;

const VERSION_INFO_TABLE: &str = "version_info";

/// A SQL command run while creating a schema, optionally for one dialect only.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SqlCommand {
    sql: String,
    dialect: Option<Dialect>,
}

/// When a registered SQL command runs relative to the schema objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrder {
    BeforeObjects,
    AfterObjects,
}

/// A named schema and everything registered in it.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    commands_before: Vec<SqlCommand>,
    enums: Vec<EnumDef>,
    sequences: Vec<Arc<Sequence>>,
    tables: Vec<Arc<RecordDef>>,
    views: Vec<Arc<RecordDef>>,
    indexes: Vec<Index>,
    commands_after: Vec<SqlCommand>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self {
            name,
            commands_before: Vec::new(),
            enums: Vec::new(),
            sequences: Vec::new(),
            tables: Vec::new(),
            views: Vec::new(),
            indexes: Vec::new(),
            commands_after: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `schema.name` or `schema_name`, depending on the dialect.
    pub fn qualified_name(&self, name: &str, dialect: Dialect) -> String {
        dialect.qualified_name(Some(&self.name), name)
    }

    fn check_owner(&self, what: &str, schema: Option<&str>) -> Result<()> {
        if schema == Some(self.name.as_str()) {
            Ok(())
        } else {
            Err(Error::Definition(format!(
                "{what} belongs to schema {}, not {}",
                schema.unwrap_or("<none>"),
                self.name
            )))
        }
    }

    fn duplicate(&self, kind: &str, name: &str) -> Error {
        Error::Definition(format!(
            "{kind} {name} is already registered in schema {}",
            self.name
        ))
    }

    /// Register an enumeration. It is placed in this schema.
    pub fn register_enum(&mut self, def: EnumDef) -> Result<EnumDef> {
        if self.enums.iter().any(|e| e.name() == def.name()) {
            return Err(self.duplicate("enum", def.name()));
        }
        let def = def.in_schema(self.name.clone());
        self.enums.push(def.clone());
        Ok(def)
    }

    /// Register a sequence. It is placed in this schema, and the returned
    /// handle can be linked to fields.
    pub fn register_sequence(&mut self, sequence: Sequence) -> Result<Arc<Sequence>> {
        let sequence = sequence.in_schema(self.name.clone());
        sequence.validate()?;
        if self.sequences.iter().any(|s| s.name() == sequence.name()) {
            return Err(self.duplicate("sequence", sequence.name()));
        }
        let sequence = Arc::new(sequence);
        self.sequences.push(Arc::clone(&sequence));
        Ok(sequence)
    }

    /// Register a table or view definition built for this schema.
    pub fn register_record(&mut self, def: Arc<RecordDef>) -> Result<()> {
        self.check_owner(def.name(), def.schema())?;
        if self.record_def(def.name()).is_some() {
            return Err(self.duplicate("record type", def.name()));
        }
        if def.is_table() {
            self.tables.push(def);
        } else if def.is_view() {
            self.views.push(def);
        } else {
            return Err(Error::Definition(format!(
                "{} is neither a table nor a view",
                def.name()
            )));
        }
        Ok(())
    }

    /// Register an index on one of this schema's tables.
    pub fn register_index(&mut self, index: Index) -> Result<()> {
        self.check_owner(index.name(), index.table().schema())?;
        if self.indexes.iter().any(|i| i.name() == index.name()) {
            return Err(self.duplicate("index", index.name()));
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Register a SQL command to run while creating the schema objects. A
    /// command restricted to a dialect is skipped for the others.
    /// `{schema.object}` tokens are rewritten for the dialect in use.
    pub fn register_sql_command(
        &mut self,
        sql: impl Into<String>,
        dialect: Option<Dialect>,
        order: CommandOrder,
    ) {
        let command = SqlCommand {
            sql: sql.into(),
            dialect,
        };
        match order {
            CommandOrder::BeforeObjects => self.commands_before.push(command),
            CommandOrder::AfterObjects => self.commands_after.push(command),
        }
    }

    pub fn enums(&self) -> &[EnumDef] {
        &self.enums
    }

    pub fn sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }

    pub fn sequence(&self, name: &str) -> Option<&Arc<Sequence>> {
        self.sequences.iter().find(|s| s.name() == name)
    }

    pub fn tables(&self) -> &[Arc<RecordDef>] {
        &self.tables
    }

    pub fn views(&self) -> &[Arc<RecordDef>] {
        &self.views
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// A registered table or view, by record type name.
    pub fn record_def(&self, name: &str) -> Option<&Arc<RecordDef>> {
        self.tables
            .iter()
            .chain(self.views.iter())
            .find(|d| d.name() == name)
    }

    /// Create the schema itself. Does nothing where schemas are emulated by
    /// name prefixes.
    pub fn create_schema(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        if dialect.schema_support() {
            tracing::info!(schema = %self.name, "Creating schema");
            cursor.execute(&format!("CREATE SCHEMA IF NOT EXISTS {};", self.name), &[])?;
        }
        Ok(())
    }

    fn run_commands(
        commands: &[SqlCommand],
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<()> {
        for command in commands {
            if command.dialect.is_some_and(|d| d != dialect) {
                continue;
            }
            cursor.execute(&dialect.convert_schema_sep(&command.sql), &[])?;
        }
        Ok(())
    }

    /// Create every registered object. Order: commands registered to run
    /// before, enumerations, sequences, tables, views, indexes, then commands
    /// registered to run after.
    pub fn create_schema_objects(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        tracing::info!(
            schema = %self.name,
            dialect = %dialect,
            tables = self.tables.len(),
            views = self.views.len(),
            "Creating schema objects"
        );
        Self::run_commands(&self.commands_before, cursor, dialect)?;
        for def in &self.enums {
            def.create(cursor, dialect)?;
        }
        for sequence in &self.sequences {
            sequence.create(cursor, dialect)?;
        }
        for def in self.tables.iter().chain(self.views.iter()) {
            def.create(cursor, dialect)?;
        }
        for index in &self.indexes {
            index.create(cursor, dialect)?;
        }
        Self::run_commands(&self.commands_after, cursor, dialect)
    }

    /// Record the declared version of every table and view in the schema's
    /// `version_info` table, creating it if needed.
    pub fn create_version_info(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        let table = self.qualified_name(VERSION_INFO_TABLE, dialect);
        cursor.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (object_name TEXT PRIMARY KEY, \
                 object_type TEXT NOT NULL, version TEXT);"
            ),
            &[],
        )?;
        let delete = format!(
            "DELETE FROM {table} WHERE {};",
            dialect.parameter_values(&["object_name"], 1, " AND ")
        );
        let insert = format!(
            "INSERT INTO {table} (object_name, object_type, version) VALUES ({});",
            dialect.parameter_list(3, 1)
        );
        for (def, object_type) in self
            .tables
            .iter()
            .map(|d| (d, "TABLE"))
            .chain(self.views.iter().map(|d| (d, "VIEW")))
        {
            let name = Value::from(def.name());
            cursor.execute(&delete, std::slice::from_ref(&name))?;
            cursor.execute(
                &insert,
                &[name, Value::from(object_type), Value::from(def.version())],
            )?;
        }
        Ok(())
    }

    /// Read the stored versions, keyed by record type name.
    pub fn read_version_info(
        &self,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<BTreeMap<String, Option<String>>> {
        let table = self.qualified_name(VERSION_INFO_TABLE, dialect);
        cursor.execute(&format!("SELECT object_name, version FROM {table};"), &[])?;
        let mut versions = BTreeMap::new();
        for row in cursor.fetchall()? {
            let mut values = row.into_iter();
            let name = match values.next() {
                Some(Value::Text(name)) => name,
                other => {
                    return Err(Error::Query(format!(
                        "unexpected object name in {table}: {other:?}"
                    )));
                }
            };
            let version = values.next().and_then(|v| v.as_str().map(str::to_string));
            versions.insert(name, version);
        }
        Ok(versions)
    }

    /// Names of the tables and views whose stored version differs from the
    /// declared one, including objects with no stored version.
    pub fn outdated_objects(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<Vec<String>> {
        let stored = self.read_version_info(cursor, dialect)?;
        Ok(self
            .tables
            .iter()
            .chain(self.views.iter())
            .filter(|d| {
                stored
                    .get(d.name())
                    .is_none_or(|v| v.as_deref() != d.version())
            })
            .map(|d| d.name().to_string())
            .collect())
    }
}
