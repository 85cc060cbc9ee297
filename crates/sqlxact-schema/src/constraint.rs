//! Table constraints.
//!
//! Constraints name their columns by field name. The SQL column names are
//! resolved when the owning table definition is built.

use sqlxact_core::{Dialect, Error, Field, Result};

/// What a foreign key does to referencing rows when the referenced key is
/// updated or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// How referencing columns are matched against the referenced key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkMatch {
    Simple,
    Partial,
    Full,
}

impl FkMatch {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            FkMatch::Simple => "MATCH SIMPLE",
            FkMatch::Partial => "MATCH PARTIAL",
            FkMatch::Full => "MATCH FULL",
        }
    }
}

/// When a constraint is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferrable {
    NotDeferrable,
    InitiallyDeferred,
    InitiallyImmediate,
}

impl Deferrable {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Deferrable::NotDeferrable => "NOT DEFERRABLE",
            Deferrable::InitiallyDeferred => "DEFERRABLE INITIALLY DEFERRED",
            Deferrable::InitiallyImmediate => "DEFERRABLE INITIALLY IMMEDIATE",
        }
    }
}

/// Settings of a foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub foreign_table: String,
    pub foreign_schema: Option<String>,
    /// SQL names of the referenced columns. Defaults to the local SQL column
    /// names.
    pub reference_columns: Option<Vec<String>>,
    pub match_type: Option<FkMatch>,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
    pub deferrable: Option<Deferrable>,
}

/// The kind of a constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    /// Arbitrary SQL after `CONSTRAINT name`.
    Custom(String),
    /// A `CHECK` expression.
    Check(String),
    Unique,
    PrimaryKey,
    ForeignKey(ForeignKey),
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    name: String,
    sql_name: String,
    kind: ConstraintKind,
    columns: Vec<String>,
    sql_columns: Vec<String>,
    options: String,
    superkey: bool,
}

impl Constraint {
    fn new(name: impl Into<String>, kind: ConstraintKind, columns: Vec<String>) -> Self {
        let name = name.into();
        Self {
            sql_name: name.clone(),
            name,
            kind,
            columns,
            sql_columns: Vec::new(),
            options: String::new(),
            superkey: false,
        }
    }

    pub fn custom(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, ConstraintKind::Custom(sql.into()), Vec::new())
    }

    pub fn check(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, ConstraintKind::Check(sql.into()), Vec::new())
    }

    pub fn unique<S: Into<String>>(name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            name,
            ConstraintKind::Unique,
            columns.into_iter().map(Into::into).collect(),
        )
    }

    pub fn primary_key<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            ConstraintKind::PrimaryKey,
            columns.into_iter().map(Into::into).collect(),
        )
    }

    /// A foreign key on `columns` referencing `foreign_table`.
    pub fn foreign_key<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        foreign_table: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            ConstraintKind::ForeignKey(ForeignKey {
                foreign_table: foreign_table.into(),
                foreign_schema: None,
                reference_columns: None,
                match_type: None,
                on_update: None,
                on_delete: None,
                deferrable: None,
            }),
            columns.into_iter().map(Into::into).collect(),
        )
    }

    pub fn sql_name(mut self, sql_name: impl Into<String>) -> Self {
        self.sql_name = sql_name.into();
        self
    }

    /// Extra SQL appended to the constraint definition.
    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    fn with_fk(mut self, f: impl FnOnce(&mut ForeignKey)) -> Self {
        if let ConstraintKind::ForeignKey(fk) = &mut self.kind {
            f(fk);
        }
        self
    }

    /// SQL names of the referenced columns (foreign keys only).
    pub fn references<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.with_fk(|fk| fk.reference_columns = Some(columns))
    }

    /// Schema of the referenced table (foreign keys only).
    pub fn foreign_schema(self, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        self.with_fk(|fk| fk.foreign_schema = Some(schema))
    }

    pub fn match_type(self, match_type: FkMatch) -> Self {
        self.with_fk(|fk| fk.match_type = Some(match_type))
    }

    pub fn on_update(self, action: ReferentialAction) -> Self {
        self.with_fk(|fk| fk.on_update = Some(action))
    }

    pub fn on_delete(self, action: ReferentialAction) -> Self {
        self.with_fk(|fk| fk.on_delete = Some(action))
    }

    pub fn deferrable(self, deferrable: Deferrable) -> Self {
        self.with_fk(|fk| fk.deferrable = Some(deferrable))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Field names of the constrained columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// SQL names of the constrained columns, available once resolved.
    pub fn sql_columns(&self) -> &[String] {
        &self.sql_columns
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self.kind, ConstraintKind::PrimaryKey)
    }

    /// Whether this is a unique or primary key constraint over non-nullable
    /// columns only.
    pub fn is_superkey(&self) -> bool {
        self.superkey
    }

    /// Resolve field names against the owning table's fields.
    pub(crate) fn resolve(&mut self, fields: &[Field]) -> Result<()> {
        let mut sql_columns = Vec::with_capacity(self.columns.len());
        let mut all_not_null = true;
        for column in &self.columns {
            let field = fields
                .iter()
                .find(|f| f.name() == column)
                .ok_or_else(|| {
                    Error::Definition(format!(
                        "constraint '{}' references non-existent column '{column}'",
                        self.name
                    ))
                })?;
            all_not_null &= !field.is_nullable();
            sql_columns.push(field.column_name().to_string());
        }
        if matches!(
            self.kind,
            ConstraintKind::ForeignKey(_) | ConstraintKind::Unique | ConstraintKind::PrimaryKey
        ) && sql_columns.is_empty()
        {
            return Err(Error::Definition(format!(
                "constraint '{}' needs at least one column",
                self.name
            )));
        }
        if let ConstraintKind::ForeignKey(fk) = &mut self.kind {
            if fk.reference_columns.is_none() {
                fk.reference_columns = Some(sql_columns.clone());
            }
        }
        self.superkey = all_not_null
            && matches!(self.kind, ConstraintKind::Unique | ConstraintKind::PrimaryKey);
        self.sql_columns = sql_columns;
        Ok(())
    }

    /// The constraint clause used in `CREATE TABLE`.
    pub fn sql_ddl(&self, dialect: Dialect) -> String {
        let mut ddl = format!("CONSTRAINT {} ", self.sql_name);
        let columns = self.sql_columns.join(", ");
        match &self.kind {
            ConstraintKind::Custom(sql) => ddl.push_str(sql),
            ConstraintKind::Check(sql) => ddl.push_str(&format!("CHECK ({sql})")),
            ConstraintKind::Unique => ddl.push_str(&format!("UNIQUE ({columns})")),
            ConstraintKind::PrimaryKey => ddl.push_str(&format!("PRIMARY KEY ({columns})")),
            ConstraintKind::ForeignKey(fk) => {
                let table = dialect.qualified_name(fk.foreign_schema.as_deref(), &fk.foreign_table);
                let references = fk
                    .reference_columns
                    .as_ref()
                    .unwrap_or(&self.sql_columns)
                    .join(", ");
                ddl.push_str(&format!(
                    "FOREIGN KEY ({columns}) REFERENCES {table} ({references})"
                ));
                if let Some(m) = fk.match_type {
                    ddl.push(' ');
                    ddl.push_str(m.as_sql());
                }
                if let Some(a) = fk.on_update {
                    ddl.push_str(" ON UPDATE ");
                    ddl.push_str(a.as_sql());
                }
                if let Some(a) = fk.on_delete {
                    ddl.push_str(" ON DELETE ");
                    ddl.push_str(a.as_sql());
                }
                if let Some(d) = fk.deferrable {
                    ddl.push(' ');
                    ddl.push_str(d.as_sql());
                }
            }
        }
        if !self.options.is_empty() {
            ddl.push(' ');
            ddl.push_str(&self.options);
        }
        ddl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<Field> {
        vec![
            Field::int("tid").not_null(),
            Field::int("row_id").sql_name("row_number").not_null(),
            Field::text("note"),
        ]
    }

    #[test]
    fn test_primary_key_ddl_and_superkey() {
        let mut pk = Constraint::primary_key("journal_pk", ["tid", "row_id"]);
        pk.resolve(&fields()).unwrap();
        assert_eq!(
            pk.sql_ddl(Dialect::Sqlite),
            "CONSTRAINT journal_pk PRIMARY KEY (tid, row_number)"
        );
        assert!(pk.is_superkey());

        let mut uk = Constraint::unique("note_uk", ["tid", "note"]);
        uk.resolve(&fields()).unwrap();
        assert!(!uk.is_superkey());
    }

    #[test]
    fn test_foreign_key_defaults_to_natural_join() {
        let mut fk = Constraint::foreign_key("journal_fk", ["tid"], "transactions")
            .foreign_schema("accounting")
            .on_delete(ReferentialAction::Cascade)
            .deferrable(Deferrable::InitiallyDeferred);
        fk.resolve(&fields()).unwrap();
        assert_eq!(
            fk.sql_ddl(Dialect::Postgres),
            "CONSTRAINT journal_fk FOREIGN KEY (tid) REFERENCES accounting.transactions (tid) \
             ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED"
        );
        assert_eq!(
            fk.sql_ddl(Dialect::Sqlite),
            "CONSTRAINT journal_fk FOREIGN KEY (tid) REFERENCES accounting_transactions (tid) \
             ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED"
        );
    }

    #[test]
    fn test_unknown_column() {
        let mut pk = Constraint::primary_key("pk", ["missing"]);
        let err = pk.resolve(&fields()).unwrap_err();
        assert!(err.to_string().contains("non-existent column 'missing'"));
    }

    #[test]
    fn test_check_and_custom() {
        let check = Constraint::check("positive", "amount > 0");
        assert_eq!(check.sql_ddl(Dialect::Sqlite), "CONSTRAINT positive CHECK (amount > 0)");
        let custom = Constraint::custom("c", "UNIQUE (a)").options("ON CONFLICT IGNORE");
        assert_eq!(
            custom.sql_ddl(Dialect::Sqlite),
            "CONSTRAINT c UNIQUE (a) ON CONFLICT IGNORE"
        );
    }
}
