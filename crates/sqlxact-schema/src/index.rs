//! Indexes over table columns or expressions.

use std::sync::Arc;

use sqlxact_core::{Cursor, Dialect, Error, Result, validate_identifier};

use crate::record::RecordDef;
use crate::schema::Schema;

/// Sort direction of an index item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One indexed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexItem {
    /// A field of the table, by field name.
    Column {
        field: String,
        collation: Option<String>,
        direction: Option<SortDirection>,
    },
    /// A SQL expression, used as is.
    Expr(String),
}

/// An index on a table.
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    sql_name: String,
    table: Arc<RecordDef>,
    items: Vec<IndexItem>,
    unique: bool,
    where_clause: Option<String>,
}

/// Builder for [`Index`].
#[derive(Debug)]
pub struct IndexBuilder {
    index: Index,
}

impl IndexBuilder {
    pub fn column(mut self, field: impl Into<String>) -> Self {
        self.index.items.push(IndexItem::Column {
            field: field.into(),
            collation: None,
            direction: None,
        });
        self
    }

    /// An indexed column with an optional collation and sort direction.
    pub fn column_with(
        mut self,
        field: impl Into<String>,
        collation: Option<&str>,
        direction: Option<SortDirection>,
    ) -> Self {
        self.index.items.push(IndexItem::Column {
            field: field.into(),
            collation: collation.map(str::to_string),
            direction,
        });
        self
    }

    pub fn expr(mut self, expr: impl Into<String>) -> Self {
        self.index.items.push(IndexItem::Expr(expr.into()));
        self
    }

    pub fn unique(mut self) -> Self {
        self.index.unique = true;
        self
    }

    /// Make this a partial index.
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.index.where_clause = Some(predicate.into());
        self
    }

    pub fn sql_name(mut self, sql_name: impl Into<String>) -> Self {
        self.index.sql_name = sql_name.into();
        self
    }

    pub fn build(self) -> Result<Index> {
        let index = self.index;
        validate_identifier(&index.name)?;
        validate_identifier(&index.sql_name)?;
        if !index.table.is_table() {
            return Err(Error::Definition(format!(
                "index {} must be on a table, not {}",
                index.name, index.table
            )));
        }
        if index.items.is_empty() {
            return Err(Error::Definition(format!(
                "index {} has no columns or expressions",
                index.name
            )));
        }
        for item in &index.items {
            if let IndexItem::Column { field, .. } = item {
                index.table.field_index(field)?;
            }
        }
        Ok(index)
    }

    /// Build the index and register it with `schema`.
    pub fn build_in(self, schema: &mut Schema) -> Result<()> {
        schema.register_index(self.build()?)
    }
}

impl Index {
    pub fn builder(name: impl Into<String>, table: &Arc<RecordDef>) -> IndexBuilder {
        let name = name.into();
        IndexBuilder {
            index: Index {
                sql_name: name.clone(),
                name,
                table: Arc::clone(table),
                items: Vec::new(),
                unique: false,
                where_clause: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Arc<RecordDef> {
        &self.table
    }

    pub fn items(&self) -> &[IndexItem] {
        &self.items
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Name of the index in SQL. Engines that emulate schemas by prefixing
    /// get the prefixed name. PostgreSQL places the index in the table's
    /// schema, so the name stays bare.
    pub fn qualified_name(&self, dialect: Dialect) -> String {
        if dialect.index_specifies_schema() {
            dialect.qualified_name(self.table.schema(), &self.sql_name)
        } else {
            self.sql_name.clone()
        }
    }

    fn item_sql(&self, item: &IndexItem) -> String {
        match item {
            IndexItem::Expr(expr) => expr.clone(),
            IndexItem::Column {
                field,
                collation,
                direction,
            } => {
                let mut sql = self
                    .table
                    .field(field)
                    .map_or_else(|| field.clone(), |f| f.column_name().to_string());
                if let Some(collation) = collation {
                    sql.push_str(" COLLATE ");
                    sql.push_str(collation);
                }
                if let Some(direction) = direction {
                    sql.push(' ');
                    sql.push_str(direction.as_sql());
                }
                sql
            }
        }
    }

    pub fn create_index_sql(&self, dialect: Dialect) -> Result<String> {
        let items: Vec<String> = self.items.iter().map(|i| self.item_sql(i)).collect();
        let mut sql = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.qualified_name(dialect),
            self.table.qualified_name(dialect)?,
            items.join(", ")
        );
        if let Some(predicate) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&dialect.convert_schema_sep(predicate));
        }
        sql.push(';');
        Ok(sql)
    }

    pub fn create(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        tracing::info!(index = %self.qualified_name(dialect), "Creating index");
        cursor.execute(&self.create_index_sql(dialect)?, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlxact_core::Field;

    fn accounts() -> Arc<RecordDef> {
        RecordDef::table("Accounts", "accounts")
            .schema("accounting")
            .field(Field::int("id").not_null())
            .field(Field::text("account_name").sql_name("name"))
            .field(Field::boolean("open"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_index_sql() {
        let index = Index::builder("accounts_name_idx", &accounts())
            .column_with("account_name", Some("NOCASE"), Some(SortDirection::Desc))
            .expr("id % 10")
            .unique()
            .where_clause("open")
            .build()
            .unwrap();
        assert_eq!(
            index.create_index_sql(Dialect::Sqlite).unwrap(),
            "CREATE UNIQUE INDEX IF NOT EXISTS accounting_accounts_name_idx ON accounting_accounts \
             (name COLLATE NOCASE DESC, id % 10) WHERE open;"
        );
        assert_eq!(
            index.create_index_sql(Dialect::Postgres).unwrap(),
            "CREATE UNIQUE INDEX IF NOT EXISTS accounts_name_idx ON accounting.accounts \
             (name COLLATE NOCASE DESC, id % 10) WHERE open;"
        );
    }

    #[test]
    fn test_invalid_indexes() {
        assert!(Index::builder("empty", &accounts()).build().is_err());
        assert!(
            Index::builder("bad", &accounts())
                .column("missing")
                .build()
                .is_err()
        );
        let record = RecordDef::record("R").field(Field::int("a")).build().unwrap();
        assert!(Index::builder("rec", &record).column("a").build().is_err());
    }
}
