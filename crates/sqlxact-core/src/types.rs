//! Isolation levels and enumerated SQL types.

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::identifiers::validate_identifier;

/// Transaction isolation level.
///
/// `ManualTransactions` disables automatic transaction management: no begin,
/// commit or rollback statements are issued. The other levels request at
/// least the guarantees of the matching SQL standard level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ManualTransactions,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL spelling of this level.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ManualTransactions => "",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// An enumerated SQL type: an ordered list of `(label, value)` pairs.
///
/// On engines with native enumerations the label is stored. Elsewhere the
/// integer value is stored in a `SMALLINT` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    name: String,
    schema: Option<String>,
    variants: Vec<(String, i64)>,
}

impl EnumDef {
    /// Create an enumeration. Labels must be valid identifiers, and both
    /// labels and values must be unique.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        variants: impl IntoIterator<Item = (S, i64)>,
    ) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        let variants: Vec<(String, i64)> =
            variants.into_iter().map(|(l, v)| (l.into(), v)).collect();
        if variants.is_empty() {
            return Err(Error::Definition(format!("enum '{name}' has no variants")));
        }
        for (i, (label, value)) in variants.iter().enumerate() {
            validate_identifier(label)?;
            if variants[..i].iter().any(|(l, v)| l == label || v == value) {
                return Err(Error::Definition(format!(
                    "enum '{name}' repeats label '{label}' or value {value}"
                )));
            }
        }
        Ok(Self {
            name,
            schema: None,
            variants,
        })
    }

    /// Place the type in a schema.
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

    pub fn variants(&self) -> &[(String, i64)] {
        &self.variants
    }

    /// Find the integer value of a label.
    pub fn value_of(&self, label: &str) -> Option<i64> {
        self.variants.iter().find(|(l, _)| l == label).map(|(_, v)| *v)
    }

    /// Find the label of an integer value.
    pub fn label_of(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(l, _)| l.as_str())
    }

    /// The SQL column type for this enumeration.
    pub fn sql_type(&self, dialect: Dialect) -> String {
        if dialect.enum_support() {
            dialect.qualified_name(self.schema(), &self.name)
        } else {
            "SMALLINT".to_string()
        }
    }

    /// The statement creating the type, if the dialect has native enums.
    pub fn create_enum_sql(&self, dialect: Dialect) -> Option<String> {
        let labels: Vec<&str> = self.variants.iter().map(|(l, _)| l.as_str()).collect();
        dialect.create_enum_sql(&dialect.qualified_name(self.schema(), &self.name), &labels)
    }

    /// Create the type in the database. Does nothing on engines without
    /// native enumerations.
    pub fn create(&self, cursor: &mut dyn Cursor, dialect: Dialect) -> Result<()> {
        if let Some(sql) = self.create_enum_sql(dialect) {
            tracing::debug!(sql = %sql, "Creating enum type");
            cursor.execute(&sql, &[])?;
        }
        Ok(())
    }
}
