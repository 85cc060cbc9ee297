//! Parametrised SQL query templates.
//!
//! A query template names its parameters with `{name}` placeholders. Every
//! placeholder must name a field declared on the query. `{schema.object}`
//! tokens are rewritten for the dialect in use.
//!
//! # Example
//!
//! ```ignore
//! let balance = QueryDef::builder(
//!     "AccountBalance",
//!     "SELECT SUM(amount) FROM {accounting.journals} WHERE account = {account};",
//! )
//! .field(Field::text("account"))
//! .build()?;
//!
//! let mut query = Query::new(&balance).with("account", "cash")?;
//! query.execute(&mut cursor, Dialect::Sqlite)?;
//! let total = Query::result_singlevalue(&mut cursor)?;
//! ```

use std::sync::{Arc, OnceLock};

use regex::Regex;
use sqlxact_core::{
    Context, ContextSource, Cursor, Dialect, Error, Field, Result, Value, convert_schema_sep,
    validate_identifier, validate_unique_names,
};
use sqlxact_schema::{Record, RecordDef, RecordList};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^\}\.]+\}").expect("static regex"))
}

/// A query template and its declared parameter fields.
#[derive(Debug)]
pub struct QueryDef {
    name: String,
    template: String,
    fields: Vec<Field>,
    result: Option<Arc<RecordDef>>,
    /// Template text between placeholders, with schema tokens rendered as
    /// `schema.object`.
    segments: Vec<String>,
    /// As `segments`, with schema tokens rendered as `schema_object`.
    segments_noschema: Vec<String>,
    /// Field index of each placeholder, in template order.
    placeholders: Vec<usize>,
}

/// Builder for [`QueryDef`].
#[derive(Debug)]
pub struct QueryDefBuilder {
    name: String,
    template: String,
    fields: Vec<Field>,
    result: Option<Arc<RecordDef>>,
}

impl QueryDefBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// The record type each result row is read into.
    pub fn result(mut self, def: &Arc<RecordDef>) -> Self {
        self.result = Some(Arc::clone(def));
        self
    }

    /// Validate the fields and split the template at its placeholders.
    pub fn build(self) -> Result<Arc<QueryDef>> {
        validate_identifier(&self.name)?;
        validate_unique_names(&self.name, self.fields.iter().map(Field::name))?;

        let mut segments = Vec::new();
        let mut segments_noschema = Vec::new();
        let mut placeholders = Vec::new();
        let mut pos = 0;
        for m in placeholder_regex().find_iter(&self.template) {
            let name = &m.as_str()[1..m.as_str().len() - 1];
            let index = self
                .fields
                .iter()
                .position(|f| f.name() == name)
                .ok_or_else(|| {
                    Error::Definition(format!(
                        "query placeholder {{{name}}} in {} does not match any field",
                        self.name
                    ))
                })?;
            placeholders.push(index);
            let segment = &self.template[pos..m.start()];
            segments.push(convert_schema_sep(segment, "."));
            segments_noschema.push(convert_schema_sep(segment, "_"));
            pos = m.end();
        }
        let segment = &self.template[pos..];
        segments.push(convert_schema_sep(segment, "."));
        segments_noschema.push(convert_schema_sep(segment, "_"));

        tracing::debug!(
            query = %self.name,
            placeholders = placeholders.len(),
            "Built query definition"
        );

        Ok(Arc::new(QueryDef {
            name: self.name,
            template: self.template,
            fields: self.fields,
            result: self.result,
            segments,
            segments_noschema,
            placeholders,
        }))
    }
}

impl QueryDef {
    pub fn builder(name: impl Into<String>, template: impl Into<String>) -> QueryDefBuilder {
        QueryDefBuilder {
            name: name.into(),
            template: template.into(),
            fields: Vec::new(),
            result: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The template as declared.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| Error::UnknownField {
                owner: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn result_def(&self) -> Option<&Arc<RecordDef>> {
        self.result.as_ref()
    }

    fn require_result(&self) -> Result<&Arc<RecordDef>> {
        self.result.as_ref().ok_or_else(|| {
            Error::Query(format!("query {} has no result record type", self.name))
        })
    }

    /// Names of the fields bound to each placeholder, in template order. A
    /// field used twice appears twice.
    pub fn query_fields(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(|&i| self.fields[i].name())
    }

    fn apply_context(&self, values: &mut [Value], context: &Context) -> Result<()> {
        for (field, slot) in self.fields.iter().zip(values.iter_mut()) {
            let key = field.context_used().unwrap_or_else(|| field.name());
            if let Some(value) = context.get(key) {
                *slot = field.convert(value.clone())?;
            }
        }
        Ok(())
    }

    fn bound_values(&self, values: &[Value], dialect: Dialect) -> Vec<Value> {
        self.placeholders
            .iter()
            .map(|&i| self.fields[i].sql_repr(&values[i], dialect))
            .collect()
    }

    fn execute_with(&self, values: &[Value], cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        let sql = self.query_sql(dialect);
        tracing::debug!(query = %self.name, sql = %sql, "Executing query");
        cursor.execute(&sql, &self.bound_values(values, dialect))
    }

    /// The SQL text with dialect placeholders.
    pub fn query_sql(&self, dialect: Dialect) -> String {
        let segments = if dialect.schema_support() {
            &self.segments
        } else {
            &self.segments_noschema
        };
        let mut sql = String::with_capacity(self.template.len());
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                sql.push_str(&dialect.placeholder(i));
            }
            sql.push_str(segment);
        }
        sql
    }
}

/// A query template with values for its fields.
#[derive(Debug, Clone)]
pub struct Query {
    def: Arc<QueryDef>,
    values: Vec<Value>,
}

impl Query {
    pub fn new(def: &Arc<QueryDef>) -> Self {
        Self {
            def: Arc::clone(def),
            values: vec![Value::Null; def.fields.len()],
        }
    }

    /// A query with one value per field, in field order.
    pub fn from_values(def: &Arc<QueryDef>, values: impl IntoIterator<Item = Value>) -> Result<Self> {
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

    pub fn def(&self) -> &Arc<QueryDef> {
        &self.def
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        Ok(&self.values[self.def.field_index(name)?])
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let i = self.def.field_index(name)?;
        self.values[i] = self.def.fields[i].convert(value.into())?;
        Ok(())
    }

    /// Builder-style [`Query::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Take field values from `context`. A field reads the context key it
    /// declares, or its own name if it declares none. Fields whose key is
    /// absent keep their value.
    pub fn set_context(&mut self, context: &Context) -> Result<()> {
        self.def.apply_context(&mut self.values, context)
    }

    /// The non-null field values, keyed by field name.
    pub fn get_context(&self) -> Context {
        self.def
            .fields
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| !v.is_null())
            .map(|(f, v)| (f.name().to_string(), v.clone()))
            .collect()
    }

    /// Values bound to the placeholders, in template order.
    pub fn query_values(&self) -> Vec<Value> {
        self.def
            .placeholders
            .iter()
            .map(|&i| self.values[i].clone())
            .collect()
    }

    pub fn query_values_sql_repr(&self, dialect: Dialect) -> Vec<Value> {
        self.def.bound_values(&self.values, dialect)
    }

    pub fn query_sql(&self, dialect: Dialect) -> String {
        self.def.query_sql(dialect)
    }

    pub fn execute(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        self.def.execute_with(&self.values, cursor, dialect)
    }

    /// Read the single value returned by an executed query. Fails unless the
    /// next row exists and has exactly one column.
    pub fn result_singlevalue(cursor: &mut dyn Cursor) -> Result<Value> {
        let row = cursor
            .fetchone()?
            .ok_or_else(|| Error::Query("no result returned from query".to_string()))?;
        if row.len() != 1 {
            return Err(Error::Query(format!(
                "the query returned {} values instead of one",
                row.len()
            )));
        }
        Ok(row.into_iter().next().unwrap_or_default())
    }

    /// Read the next row of an executed query into a result record, or
    /// `None` when there are no more rows.
    pub fn result_record(&self, cursor: &mut dyn Cursor) -> Result<Option<Record>> {
        let def = self.def.require_result()?;
        cursor
            .fetchone()?
            .map(|row| Record::from_row(def, row))
            .transpose()
    }

    /// A single-pass iterator over the remaining rows of an executed query.
    pub fn result_records<'c>(&self, cursor: &'c mut dyn Cursor) -> Result<ResultRecords<'c>> {
        Ok(ResultRecords {
            def: Arc::clone(self.def.require_result()?),
            cursor,
            done: false,
        })
    }

    /// Read every remaining row of an executed query into a record list.
    pub fn result_recordlist(&self, cursor: &mut dyn Cursor) -> Result<RecordList> {
        let def = self.def.require_result()?;
        let mut list = RecordList::new(def);
        list.set_rows(cursor.fetchall()?)?;
        Ok(list)
    }
}

/// Records read lazily from a cursor. Stops after the first error.
pub struct ResultRecords<'c> {
    def: Arc<RecordDef>,
    cursor: &'c mut dyn Cursor,
    done: bool,
}

impl Iterator for ResultRecords<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.cursor.fetchone() {
            Ok(Some(row)) => Record::from_row(&self.def, row),
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

/// A field linked to a query takes its value from the query's single result,
/// with parameters read from the context. Queries do not change server state,
/// so `refresh` and `update` behave the same.
impl ContextSource for QueryDef {
    fn describe(&self) -> String {
        format!("query {}", self.name)
    }

    fn refresh(
        &self,
        context: &Context,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<Option<Value>> {
        self.update(context, cursor, dialect).map(Some)
    }

    fn update(&self, context: &Context, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<Value> {
        let mut values = vec![Value::Null; self.fields.len()];
        self.apply_context(&mut values, context)?;
        self.execute_with(&values, cursor, dialect)?;
        Query::result_singlevalue(cursor)
    }
}
