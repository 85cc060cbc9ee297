//! SQL dialects.
//!
//! A [`Dialect`] is a stateless strategy value describing how one database
//! engine spells the SQL that sqlxact generates: parameter placeholders,
//! value coercion for engines without native types, schema qualification,
//! transaction commands, sequences, views and enumerated types.
//!
//! There is no process-wide default dialect. Every SQL-producing call takes a
//! `Dialect` argument; `Dialect::default()` is SQLite.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::IsolationLevel;
use crate::value::Value;

/// Text format used for dates on engines without native temporal types.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Text format used for times of day.
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
/// Text format used for timestamps without a time zone.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
/// Text format used for UTC timestamps.
pub const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// SQLite: no schemas, no native decimals, booleans or enums.
    #[default]
    Sqlite,
    /// PostgreSQL: schemas, native sequences and enumerated types.
    Postgres,
}

impl Dialect {
    /// Get the dialect name.
    pub const fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    // ========================================================================
    // Placeholders
    // ========================================================================

    /// Get the placeholder for the parameter at 1-based position `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// A comma separated list of `count` placeholders, numbered from `start`.
    pub fn parameter_list(&self, count: usize, start: usize) -> String {
        (start..start + count)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A `name=placeholder` list joined by `separator` (for example `" AND "`
    /// or `", "`), with placeholders numbered from `start`.
    pub fn parameter_values<S: AsRef<str>>(
        &self,
        names: &[S],
        start: usize,
        separator: &str,
    ) -> String {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{}={}", name.as_ref(), self.placeholder(start + i)))
            .collect::<Vec<_>>()
            .join(separator)
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Whether the engine has real SQL schemas (namespaces).
    pub const fn schema_support(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether the engine has native enumerated types.
    pub const fn enum_support(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether decimals can be bound without converting them to text.
    pub const fn native_decimals(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether booleans can be bound without converting them to 0/1.
    pub const fn native_booleans(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether dates, times and timestamps can be bound natively.
    pub const fn native_timestamps(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether `CREATE INDEX` takes a schema-qualified index name.
    pub const fn index_specifies_schema(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    /// Coerce a value into the form the engine's driver expects.
    pub fn sql_repr(&self, value: &Value) -> Value {
        match (self, value) {
            (Dialect::Postgres, v) => v.clone(),
            (Dialect::Sqlite, Value::Decimal(d)) => Value::Text(d.to_string()),
            (Dialect::Sqlite, Value::Bool(b)) => Value::Int(i32::from(*b)),
            (Dialect::Sqlite, Value::Date(d)) => Value::Text(d.format(DATE_FORMAT).to_string()),
            (Dialect::Sqlite, Value::Time(t)) => Value::Text(t.format(TIME_FORMAT).to_string()),
            (Dialect::Sqlite, Value::Timestamp(ts)) => {
                Value::Text(ts.format(TIMESTAMP_FORMAT).to_string())
            }
            (Dialect::Sqlite, Value::TimestampTz(ts)) => {
                Value::Text(ts.format(TIMESTAMPTZ_FORMAT).to_string())
            }
            (Dialect::Sqlite, v) => v.clone(),
        }
    }

    // ========================================================================
    // Schema qualification
    // ========================================================================

    /// Separator between a schema name and an object name.
    pub const fn schema_separator(&self) -> &'static str {
        if self.schema_support() { "." } else { "_" }
    }

    /// Qualify `name` with an optional schema: `schema.name` where schemas are
    /// supported, `schema_name` where they are not.
    pub fn qualified_name(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) => format!("{schema}{}{name}", self.schema_separator()),
            None => name.to_string(),
        }
    }

    /// Rewrite every `{schema.object}` token in `sql` using this dialect's
    /// schema separator.
    pub fn convert_schema_sep(&self, sql: &str) -> String {
        convert_schema_sep(sql, self.schema_separator())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// The statement that begins a transaction, or `None` under manual
    /// transaction control.
    pub fn begin_transaction_sql(&self, level: Option<IsolationLevel>) -> Option<String> {
        match (self, level) {
            (_, Some(IsolationLevel::ManualTransactions)) => None,
            (Dialect::Postgres, Some(level)) => Some(format!(
                "BEGIN TRANSACTION ISOLATION LEVEL {};",
                level.as_sql()
            )),
            _ => Some("BEGIN TRANSACTION;".to_string()),
        }
    }

    /// The statement that commits a transaction, or `None` under manual
    /// transaction control.
    pub fn commit_transaction_sql(&self, level: Option<IsolationLevel>) -> Option<&'static str> {
        match level {
            Some(IsolationLevel::ManualTransactions) => None,
            _ => Some("COMMIT;"),
        }
    }

    /// The statement that rolls a transaction back, or `None` under manual
    /// transaction control.
    pub fn rollback_transaction_sql(&self, level: Option<IsolationLevel>) -> Option<&'static str> {
        match level {
            Some(IsolationLevel::ManualTransactions) => None,
            _ => Some("ROLLBACK;"),
        }
    }

    // ========================================================================
    // DDL templates
    // ========================================================================

    /// Remove every row of a table.
    pub fn truncate_table_sql(&self, table: &str, cascade: bool) -> String {
        match self {
            Dialect::Sqlite => format!("DELETE FROM {table};"),
            Dialect::Postgres if cascade => format!("TRUNCATE TABLE {table} CASCADE;"),
            Dialect::Postgres => format!("TRUNCATE TABLE {table} RESTRICT;"),
        }
    }

    /// The leading keywords of a view definition.
    pub const fn create_view_prefix(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "CREATE VIEW IF NOT EXISTS",
            Dialect::Postgres => "CREATE OR REPLACE VIEW",
        }
    }

    /// Statements creating a sequence. SQLite has no sequences, so a one-row
    /// table holding the counter state stands in for one.
    pub fn create_sequence_sql(
        &self,
        name: &str,
        start: i64,
        interval: i64,
        index_type: &str,
        options: &str,
    ) -> Vec<String> {
        let options = if options.is_empty() {
            String::new()
        } else {
            format!(" {options}")
        };
        match self {
            Dialect::Sqlite => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {name} (start {index_type}, interval {index_type}, \
                     lastval {index_type}, nextval {index_type}{options});"
                ),
                format!(
                    "INSERT INTO {name} SELECT {start}, {interval}, {start}, {start} \
                     WHERE NOT EXISTS (SELECT * FROM {name});"
                ),
            ],
            Dialect::Postgres => vec![format!(
                "CREATE SEQUENCE IF NOT EXISTS {name} AS {index_type} START {start} \
                 INCREMENT {interval}{options};"
            )],
        }
    }

    /// Statements advancing a sequence. The last statement returns the new
    /// value as a single-column row.
    pub fn nextval_sequence_sql(&self, name: &str) -> Vec<String> {
        match self {
            Dialect::Sqlite => vec![
                format!("UPDATE {name} SET lastval=nextval, nextval=nextval+interval;"),
                format!("SELECT lastval FROM {name};"),
            ],
            Dialect::Postgres => vec![format!("SELECT nextval('{name}');")],
        }
    }

    /// Statements restoring a sequence to its start value.
    pub fn reset_sequence_sql(&self, name: &str) -> Vec<String> {
        match self {
            Dialect::Sqlite => vec![format!("UPDATE {name} SET lastval=start, nextval=start;")],
            Dialect::Postgres => vec![format!("ALTER SEQUENCE {name} RESTART;")],
        }
    }

    /// Statement creating a native enumerated type, or `None` where the engine
    /// stores enumerations as plain integers.
    pub fn create_enum_sql<S: AsRef<str>>(&self, qualified_name: &str, labels: &[S]) -> Option<String> {
        match self {
            Dialect::Sqlite => None,
            Dialect::Postgres => {
                let labels = labels
                    .iter()
                    .map(|l| format!("'{}'", l.as_ref()))
                    .collect::<Vec<_>>()
                    .join(", ");
                // IF NOT EXISTS is not available for CREATE TYPE.
                Some(format!(
                    "DO $$ BEGIN\n    CREATE TYPE {qualified_name} AS ENUM ({labels});\n\
                     EXCEPTION\n    WHEN duplicate_object THEN null;\nEND $$;"
                ))
            }
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn schema_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^\}\.]+)\.([^\}\.]+)\}").expect("static regex"))
}

/// Rewrite `{schema.object}` tokens to `schema<sep>object`. Tokens without a
/// dot, or with an empty side, are left untouched.
pub fn convert_schema_sep(sql: &str, sep: &str) -> String {
    schema_token_regex()
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            format!("{}{sep}{}", &caps[1], &caps[2])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_convert_schema_sep() {
        assert_eq!(convert_schema_sep("{alpha.beta}", "."), "alpha.beta");
        assert_eq!(convert_schema_sep("{alpha.beta}", "_"), "alpha_beta");
        assert_eq!(
            convert_schema_sep("Prefix {alpha.beta} middle {gamma.epsilon} suffix", "."),
            "Prefix alpha.beta middle gamma.epsilon suffix"
        );
        assert_eq!(
            convert_schema_sep("{alpha.beta}{gamma.epsilon}", "."),
            "alpha.betagamma.epsilon"
        );
        assert_eq!(convert_schema_sep("{alpha_beta}", "."), "{alpha_beta}");
        assert_eq!(convert_schema_sep("{.}", "."), "{.}");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Sqlite.parameter_list(3, 1), "?, ?, ?");
        assert_eq!(Dialect::Postgres.parameter_list(3, 2), "$2, $3, $4");
        assert_eq!(
            Dialect::Sqlite.parameter_values(&["a", "b"], 1, " AND "),
            "a=? AND b=?"
        );
        assert_eq!(
            Dialect::Postgres.parameter_values(&["a", "b"], 3, ", "),
            "a=$3, b=$4"
        );
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(Dialect::Sqlite.qualified_name(Some("acc"), "journals"), "acc_journals");
        assert_eq!(Dialect::Postgres.qualified_name(Some("acc"), "journals"), "acc.journals");
        assert_eq!(Dialect::Postgres.qualified_name(None, "journals"), "journals");
    }

    #[test]
    fn test_sqlite_sql_repr() {
        let d = Decimal::from_str("12.50").unwrap();
        assert_eq!(Dialect::Sqlite.sql_repr(&Value::Decimal(d)), Value::Text("12.50".into()));
        assert_eq!(Dialect::Sqlite.sql_repr(&Value::Bool(true)), Value::Int(1));
        assert_eq!(Dialect::Postgres.sql_repr(&Value::Bool(true)), Value::Bool(true));
        let date = chrono::NaiveDate::from_ymd_opt(2018, 4, 1).unwrap();
        assert_eq!(
            Dialect::Sqlite.sql_repr(&Value::Date(date)),
            Value::Text("2018-04-01".into())
        );
    }

    #[test]
    fn test_transaction_commands() {
        assert_eq!(
            Dialect::Sqlite.begin_transaction_sql(None).as_deref(),
            Some("BEGIN TRANSACTION;")
        );
        assert_eq!(
            Dialect::Postgres
                .begin_transaction_sql(Some(IsolationLevel::Serializable))
                .as_deref(),
            Some("BEGIN TRANSACTION ISOLATION LEVEL SERIALIZABLE;")
        );
        assert_eq!(
            Dialect::Postgres.begin_transaction_sql(Some(IsolationLevel::ManualTransactions)),
            None
        );
        assert_eq!(
            Dialect::Sqlite.commit_transaction_sql(Some(IsolationLevel::ManualTransactions)),
            None
        );
        assert_eq!(Dialect::Sqlite.rollback_transaction_sql(None), Some("ROLLBACK;"));
    }

    #[test]
    fn test_sequence_templates() {
        let create = Dialect::Postgres.create_sequence_sql("s", 2, 3, "BIGINT", "");
        assert_eq!(
            create,
            vec!["CREATE SEQUENCE IF NOT EXISTS s AS BIGINT START 2 INCREMENT 3;".to_string()]
        );
        assert_eq!(Dialect::Sqlite.nextval_sequence_sql("s").len(), 2);
        assert_eq!(
            Dialect::Postgres.reset_sequence_sql("s"),
            vec!["ALTER SEQUENCE s RESTART;".to_string()]
        );
    }

    #[test]
    fn test_enum_creation() {
        assert!(Dialect::Sqlite.create_enum_sql("colour", &["RED"]).is_none());
        let sql = Dialect::Postgres
            .create_enum_sql("paint.colour", &["RED", "GREEN"])
            .unwrap();
        assert!(sql.contains("CREATE TYPE paint.colour AS ENUM ('RED', 'GREEN');"));
        assert!(sql.contains("duplicate_object"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(Dialect::Sqlite.truncate_table_sql("t", true), "DELETE FROM t;");
        assert_eq!(Dialect::Postgres.truncate_table_sql("t", false), "TRUNCATE TABLE t RESTRICT;");
    }
}
