//! Record, table and view definitions, and the records built from them.
//!
//! A [`RecordDef`] is an ordered list of [`Field`]s, optionally bound to a
//! table (with constraints) or to a view (with a defining query). It is
//! built once, shared behind an `Arc`, and every [`Record`] points back to
//! the definition it was created from.

use std::fmt;
use std::sync::Arc;

use sqlxact_core::{
    Context, Cursor, Dialect, Error, Field, FieldKind, Result, Row, Value, validate_identifier,
    validate_unique_names,
};

use crate::constraint::Constraint;
use crate::schema::Schema;

/// What a record definition is bound to in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// A plain record with no database object.
    Record,
    Table {
        table_name: String,
    },
    View {
        view_name: String,
        /// The defining query. May use `{schema.object}` tokens.
        query: String,
    },
}

/// A record definition: the ordered fields of a record type and the
/// database object they map to.
#[derive(Debug)]
pub struct RecordDef {
    name: String,
    kind: RecordKind,
    schema: Option<String>,
    version: Option<String>,
    fields: Vec<Field>,
    constraints: Vec<Constraint>,
    primary_key: Option<usize>,
    pk_fields: Vec<usize>,
}

/// Builder for [`RecordDef`].
#[derive(Debug)]
pub struct RecordDefBuilder {
    name: String,
    kind: RecordKind,
    schema: Option<String>,
    version: Option<String>,
    fields: Vec<Field>,
    constraints: Vec<Constraint>,
}

impl RecordDefBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Place the table or view in a named schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Start from the fields and constraints of an existing definition.
    /// Fields added afterwards follow the inherited ones.
    pub fn extends(mut self, base: &RecordDef) -> Self {
        let mut fields = base.fields.clone();
        fields.append(&mut self.fields);
        self.fields = fields;
        let mut constraints = base.constraints.clone();
        constraints.append(&mut self.constraints);
        self.constraints = constraints;
        if self.schema.is_none() {
            self.schema.clone_from(&base.schema);
        }
        self
    }

    /// Validate the definition.
    pub fn build(self) -> Result<Arc<RecordDef>> {
        validate_identifier(&self.name)?;
        validate_unique_names(&self.name, self.fields.iter().map(Field::name))?;
        validate_unique_names(&self.name, self.fields.iter().map(Field::column_name))?;
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }

        match &self.kind {
            RecordKind::Record => {}
            RecordKind::Table { table_name } => {
                validate_identifier(table_name)?;
                if self.fields.is_empty() {
                    return Err(Error::Definition(format!(
                        "table {} declares no fields",
                        self.name
                    )));
                }
            }
            RecordKind::View { view_name, .. } => validate_identifier(view_name)?,
        }

        if !self.constraints.is_empty() && !matches!(self.kind, RecordKind::Table { .. }) {
            return Err(Error::Definition(format!(
                "{} is not a table and can not have constraints",
                self.name
            )));
        }
        validate_unique_names(&self.name, self.constraints.iter().map(Constraint::name))?;

        let mut constraints = self.constraints;
        let mut primary_key = None;
        for (i, constraint) in constraints.iter_mut().enumerate() {
            constraint.resolve(&self.fields)?;
            if constraint.is_primary_key() {
                if primary_key.is_some() {
                    return Err(Error::Definition(format!(
                        "table {} declares more than one primary key",
                        self.name
                    )));
                }
                primary_key = Some(i);
            }
        }

        let pk_fields = primary_key
            .map(|i| {
                constraints[i]
                    .columns()
                    .iter()
                    .filter_map(|c| self.fields.iter().position(|f| f.name() == c))
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(
            record = %self.name,
            fields = self.fields.len(),
            constraints = constraints.len(),
            "Built record definition"
        );

        Ok(Arc::new(RecordDef {
            name: self.name,
            kind: self.kind,
            schema: self.schema,
            version: self.version,
            fields: self.fields,
            constraints,
            primary_key,
            pk_fields,
        }))
    }

    /// Validate the definition and register it with `schema`. The table or
    /// view is placed in that schema.
    pub fn build_in(mut self, schema: &mut Schema) -> Result<Arc<RecordDef>> {
        self.schema = Some(schema.name().to_string());
        let def = self.build()?;
        schema.register_record(Arc::clone(&def))?;
        Ok(def)
    }
}

impl RecordDef {
    fn builder(name: impl Into<String>, kind: RecordKind) -> RecordDefBuilder {
        RecordDefBuilder {
            name: name.into(),
            kind,
            schema: None,
            version: None,
            fields: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// A plain record type.
    pub fn record(name: impl Into<String>) -> RecordDefBuilder {
        Self::builder(name, RecordKind::Record)
    }

    /// A record type stored in `table_name`.
    pub fn table(name: impl Into<String>, table_name: impl Into<String>) -> RecordDefBuilder {
        Self::builder(
            name,
            RecordKind::Table {
                table_name: table_name.into(),
            },
        )
    }

    /// A record type read from `view_name`, defined by `query`.
    pub fn view(
        name: impl Into<String>,
        view_name: impl Into<String>,
        query: impl Into<String>,
    ) -> RecordDefBuilder {
        Self::builder(
            name,
            RecordKind::View {
                view_name: view_name.into(),
                query: query.into(),
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, RecordKind::Table { .. })
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, RecordKind::View { .. })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Position of the named field.
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| Error::UnknownField {
                owner: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn primary_key(&self) -> Option<&Constraint> {
        self.primary_key.map(|i| &self.constraints[i])
    }

    /// Fields that make up the primary key, in key order.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = &Field> {
        self.pk_fields.iter().map(|&i| &self.fields[i])
    }

    /// Fields that declare a context key.
    pub fn context_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.context_used().is_some())
    }

    /// Name of the table or view without a schema.
    pub fn object_name(&self) -> Option<&str> {
        match &self.kind {
            RecordKind::Record => None,
            RecordKind::Table { table_name } => Some(table_name),
            RecordKind::View { view_name, .. } => Some(view_name),
        }
    }

    /// Schema-qualified name of the table or view.
    pub fn qualified_name(&self, dialect: Dialect) -> Result<String> {
        let object = self.object_name().ok_or_else(|| {
            Error::Definition(format!("{} is not bound to a table or view", self.name))
        })?;
        Ok(dialect.qualified_name(self.schema(), object))
    }

    fn require_table(&self) -> Result<()> {
        if self.is_table() {
            Ok(())
        } else {
            Err(Error::Definition(format!("{} is not a table", self.name)))
        }
    }

    /// Comma separated SQL column names.
    pub fn column_names_sql(&self) -> String {
        self.fields
            .iter()
            .map(Field::column_name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_table_sql(&self, dialect: Dialect) -> Result<String> {
        self.require_table()?;
        let items: Vec<String> = self
            .fields
            .iter()
            .map(|f| f.sql_ddl(dialect))
            .chain(self.constraints.iter().map(|c| c.sql_ddl(dialect)))
            .collect();
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.qualified_name(dialect)?,
            items.join(",\n    ")
        ))
    }

    pub fn create_view_sql(&self, dialect: Dialect) -> Result<String> {
        let RecordKind::View { query, .. } = &self.kind else {
            return Err(Error::Definition(format!("{} is not a view", self.name)));
        };
        let query = dialect.convert_schema_sep(query.trim().trim_end_matches(';'));
        Ok(format!(
            "{} {} ({}) AS\n{};",
            dialect.create_view_prefix(),
            self.qualified_name(dialect)?,
            self.column_names_sql(),
            query
        ))
    }

    /// Create the table or view.
    pub fn create(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        let sql = match &self.kind {
            RecordKind::Table { .. } => self.create_table_sql(dialect)?,
            RecordKind::View { .. } => self.create_view_sql(dialect)?,
            RecordKind::Record => return self.qualified_name(dialect).map(|_| ()),
        };
        tracing::info!(object = %self.qualified_name(dialect)?, "Creating database object");
        cursor.execute(&sql, &[])
    }

    pub fn truncate_table_sql(&self, dialect: Dialect, cascade: bool) -> Result<String> {
        self.require_table()?;
        Ok(dialect.truncate_table_sql(&self.qualified_name(dialect)?, cascade))
    }

    /// Parameterised `INSERT` for one row of every column.
    pub fn insert_sql_command(&self, dialect: Dialect) -> Result<String> {
        self.require_table()?;
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.qualified_name(dialect)?,
            self.column_names_sql(),
            dialect.parameter_list(self.fields.len(), 1)
        ))
    }

    fn select_prefix(&self, dialect: Dialect) -> Result<String> {
        Ok(format!(
            "SELECT {} FROM {}",
            self.column_names_sql(),
            self.qualified_name(dialect)?
        ))
    }

    /// Select rows whose named fields equal the given values. With no
    /// filters every row is selected.
    pub fn simple_select_sql(
        &self,
        filters: &[(&str, Value)],
        dialect: Dialect,
    ) -> Result<(String, Vec<Value>)> {
        let mut columns = Vec::with_capacity(filters.len());
        let mut params = Vec::with_capacity(filters.len());
        for (name, value) in filters {
            let field = &self.fields[self.field_index(name)?];
            let value = field.convert(value.clone())?;
            columns.push(field.column_name());
            params.push(field.sql_repr(&value, dialect));
        }
        let prefix = self.select_prefix(dialect)?;
        if columns.is_empty() {
            return Ok((format!("{prefix};"), params));
        }
        Ok((
            format!(
                "{prefix} WHERE {};",
                dialect.parameter_values(&columns, 1, " AND ")
            ),
            params,
        ))
    }

    /// Select rows whose context fields match the values in `context`.
    ///
    /// Fields whose context key is absent are not constrained. If nothing
    /// constrains the select, [`Error::UnconstrainedWhere`] is returned unless
    /// `allow_unlimited` is set.
    pub fn context_select_sql(
        &self,
        context: &Context,
        dialect: Dialect,
        allow_unlimited: bool,
    ) -> Result<(String, Vec<Value>)> {
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for field in &self.fields {
            if matches!(field.kind(), FieldKind::RowEnum { .. }) {
                continue;
            }
            let Some(value) = field.context_used().and_then(|key| context.get(key)) else {
                continue;
            };
            let value = field.convert(value.clone())?;
            columns.push(field.column_name());
            params.push(field.sql_repr(&value, dialect));
        }
        let prefix = self.select_prefix(dialect)?;
        if columns.is_empty() {
            if !allow_unlimited {
                return Err(Error::UnconstrainedWhere(format!(
                    "no context values constrain the select from {}",
                    self.name
                )));
            }
            return Ok((format!("{prefix};"), params));
        }
        Ok((
            format!(
                "{prefix} WHERE {};",
                dialect.parameter_values(&columns, 1, " AND ")
            ),
            params,
        ))
    }
}

impl fmt::Display for RecordDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RecordKind::Record => write!(f, "record {}", self.name),
            RecordKind::Table { table_name } => write!(f, "table {} ({table_name})", self.name),
            RecordKind::View { view_name, .. } => write!(f, "view {} ({view_name})", self.name),
        }
    }
}

/// A record: one value per field of its definition.
#[derive(Debug, Clone)]
pub struct Record {
    def: Arc<RecordDef>,
    values: Vec<Value>,
}

impl Record {
    /// A record with every field unset (NULL).
    pub fn new(def: &Arc<RecordDef>) -> Self {
        Self {
            def: Arc::clone(def),
            values: vec![Value::Null; def.fields.len()],
        }
    }

    /// A record with one value per field, in field order. Each value is
    /// validated by its field.
    pub fn from_values(
        def: &Arc<RecordDef>,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let values: Vec<Value> = values.into_iter().collect();
        if values.len() != def.fields.len() {
            return Err(Error::ValueCount {
                expected: def.fields.len(),
                supplied: values.len(),
            });
        }
        let values = def
            .fields
            .iter()
            .zip(values)
            .map(|(f, v)| f.convert(v))
            .collect::<Result<_>>()?;
        Ok(Self {
            def: Arc::clone(def),
            values,
        })
    }

    /// A record built from a database row.
    pub fn from_row(def: &Arc<RecordDef>, row: Row) -> Result<Self> {
        let mut record = Self::new(def);
        record.set_values(row)?;
        Ok(record)
    }

    pub fn def(&self) -> &Arc<RecordDef> {
        &self.def
    }

    /// Whether this record was built from `def`.
    pub fn is_instance_of(&self, def: &Arc<RecordDef>) -> bool {
        Arc::ptr_eq(&self.def, def)
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        Ok(&self.values[self.def.field_index(name)?])
    }

    /// Assign a field, validating the value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let i = self.def.field_index(name)?;
        self.values[i] = self.def.fields[i].convert(value.into())?;
        Ok(())
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// The stored values, in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// `(field name, value)` pairs in field order.
    pub fn item_values(&self) -> Vec<(&str, &Value)> {
        self.def
            .fields
            .iter()
            .map(Field::name)
            .zip(self.values.iter())
            .collect()
    }

    /// Resolve every field against `context` (storing the results) and
    /// return the values.
    pub fn values_with_context(&mut self, context: &mut Context) -> Result<Vec<Value>> {
        let Self { def, values } = self;
        def.fields
            .iter()
            .zip(values.iter_mut())
            .map(|(field, slot)| field.get_context(slot, context))
            .collect()
    }

    fn resolved_values(&mut self, context: Option<&mut Context>) -> Result<Vec<Value>> {
        match context {
            Some(ctx) => self.values_with_context(ctx),
            None => Ok(self.values.clone()),
        }
    }

    /// Values as bound parameters, optionally resolved against a context.
    pub fn values_sql_repr(
        &mut self,
        context: Option<&mut Context>,
        dialect: Dialect,
    ) -> Result<Vec<Value>> {
        let values = self.resolved_values(context)?;
        Ok(self.sql_repr(&values, dialect))
    }

    fn sql_repr(&self, values: &[Value], dialect: Dialect) -> Vec<Value> {
        self.def
            .fields
            .iter()
            .zip(values)
            .map(|(f, v)| f.sql_repr(v, dialect))
            .collect()
    }

    /// Replace every value from a database row.
    pub fn set_values(&mut self, row: Row) -> Result<()> {
        if row.len() != self.values.len() {
            return Err(Error::ValueCount {
                expected: self.values.len(),
                supplied: row.len(),
            });
        }
        let values = self
            .def
            .fields
            .iter()
            .zip(row)
            .map(|(f, v)| f.from_sql(v))
            .collect::<Result<_>>()?;
        self.values = values;
        Ok(())
    }

    /// Reset every field to NULL.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = Value::Null);
    }

    /// A context holding the stored value of each field that declares a
    /// context key. Row counters and NULL values are skipped.
    pub fn context_values_stored(&self) -> Context {
        self.def
            .fields
            .iter()
            .zip(&self.values)
            .filter(|(f, v)| !v.is_null() && !matches!(f.kind(), FieldKind::RowEnum { .. }))
            .filter_map(|(f, v)| f.context_used().map(|key| (key.to_string(), v.clone())))
            .collect()
    }

    pub fn insert_sql(
        &mut self,
        context: Option<&mut Context>,
        dialect: Dialect,
    ) -> Result<(String, Vec<Value>)> {
        let sql = self.def.insert_sql_command(dialect)?;
        Ok((sql, self.values_sql_repr(context, dialect)?))
    }

    /// Split resolved values into primary key and other columns. Fails if the
    /// table has no primary key or any key value is NULL.
    fn split_primary_key(&self, values: Vec<Value>) -> Result<(Vec<usize>, Vec<Value>)> {
        let def = &self.def;
        if def.pk_fields.is_empty() {
            return Err(Error::UnconstrainedWhere(format!(
                "{} has no primary key",
                def.name
            )));
        }
        for &i in &def.pk_fields {
            if values[i].is_null() {
                return Err(Error::UnconstrainedWhere(format!(
                    "primary key field '{}' of {} is NULL",
                    def.fields[i].name(),
                    def.name
                )));
            }
        }
        Ok((def.pk_fields.clone(), values))
    }

    fn pk_where(&self, pk: &[usize], values: &[Value], dialect: Dialect, start: usize) -> (String, Vec<Value>) {
        let columns: Vec<&str> = pk.iter().map(|&i| self.def.fields[i].column_name()).collect();
        let params = pk
            .iter()
            .map(|&i| self.def.fields[i].sql_repr(&values[i], dialect))
            .collect();
        (dialect.parameter_values(&columns, start, " AND "), params)
    }

    /// `UPDATE` of every non-key column, located by primary key.
    pub fn update_sql(
        &mut self,
        context: Option<&mut Context>,
        dialect: Dialect,
    ) -> Result<(String, Vec<Value>)> {
        self.def.require_table()?;
        let values = self.resolved_values(context)?;
        let (pk, values) = self.split_primary_key(values)?;
        let def = &self.def;

        let set_fields: Vec<usize> = (0..def.fields.len()).filter(|i| !pk.contains(i)).collect();
        if set_fields.is_empty() {
            return Err(Error::Definition(format!(
                "{} has no columns outside its primary key",
                def.name
            )));
        }
        let set_columns: Vec<&str> = set_fields
            .iter()
            .map(|&i| def.fields[i].column_name())
            .collect();
        let mut params: Vec<Value> = set_fields
            .iter()
            .map(|&i| def.fields[i].sql_repr(&values[i], dialect))
            .collect();
        let (where_sql, pk_params) = self.pk_where(&pk, &values, dialect, set_fields.len() + 1);
        params.extend(pk_params);
        Ok((
            format!(
                "UPDATE {} SET {} WHERE {};",
                def.qualified_name(dialect)?,
                dialect.parameter_values(&set_columns, 1, ", "),
                where_sql
            ),
            params,
        ))
    }

    /// `DELETE` of this record, located by primary key.
    pub fn delete_sql(
        &mut self,
        context: Option<&mut Context>,
        dialect: Dialect,
    ) -> Result<(String, Vec<Value>)> {
        self.def.require_table()?;
        let values = self.resolved_values(context)?;
        let (pk, values) = self.split_primary_key(values)?;
        let (where_sql, params) = self.pk_where(&pk, &values, dialect, 1);
        Ok((
            format!(
                "DELETE FROM {} WHERE {};",
                self.def.qualified_name(dialect)?,
                where_sql
            ),
            params,
        ))
    }

    /// `SELECT` of this record, located by primary key.
    pub fn pk_select_sql(
        &mut self,
        context: Option<&mut Context>,
        dialect: Dialect,
    ) -> Result<(String, Vec<Value>)> {
        let values = self.resolved_values(context)?;
        let (pk, values) = self.split_primary_key(values)?;
        let (where_sql, params) = self.pk_where(&pk, &values, dialect, 1);
        Ok((
            format!("{} WHERE {};", self.def.select_prefix(dialect)?, where_sql),
            params,
        ))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def) && self.values == other.values
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.def.name)?;
        for (i, (name, value)) in self.item_values().into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}
