//! Field descriptors.
//!
//! A [`Field`] describes one column of a record, or one parameter of a query
//! or transaction. It knows how to validate values assigned to it, how to
//! read values back from the database, how to render its SQL type, and how
//! to resolve its value from a [`Context`].
//!
//! Values live outside the field, in slots owned by the record, query or
//! transaction instance. The resolution methods take the slot by mutable
//! reference so that a value adopted from a context is written back.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::context::Context;
use crate::cursor::Cursor;
use crate::dialect::{DATE_FORMAT, Dialect, TIME_FORMAT, TIMESTAMP_FORMAT, TIMESTAMPTZ_FORMAT};
use crate::error::{Error, Result};
use crate::types::EnumDef;
use crate::value::Value;

/// Something outside a record that can produce the value of a field: a
/// server-side sequence, or a query whose parameters come from the context.
pub trait ContextSource: fmt::Debug + Send + Sync {
    /// A short description used in logs.
    fn describe(&self) -> String;

    /// Produce a value without changing server state. Returns `None` if the
    /// source can only produce values by advancing state, in which case the
    /// stored value is kept.
    fn refresh(
        &self,
        context: &Context,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<Option<Value>>;

    /// Produce a fresh value. May change server state (advance a sequence).
    fn update(&self, context: &Context, cursor: &mut dyn Cursor, dialect: Dialect)
    -> Result<Value>;
}

/// The semantic type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    SmallInt,
    Int,
    BigInt,
    /// An integer identifier whose value can always be taken from the context
    /// key the field declares. Resolving it without that key is an error.
    ContextInt,
    /// A per-row counter: every resolution advances the context counter.
    RowEnum { starting_number: i64 },
    /// Exact decimal with a fixed scale.
    Numeric {
        precision: u32,
        scale: u32,
        allow_floats: bool,
        inexact_quantize: bool,
    },
    Real,
    Boolean,
    Text,
    VarChar {
        max_length: usize,
        silent_truncate: bool,
    },
    Char {
        max_length: usize,
        silent_truncate: bool,
    },
    Date,
    Time,
    Timestamp { tz: bool },
    /// A timestamp stamped with the current UTC time whenever it is updated.
    UtcNowTimestamp { tz: bool },
    Enum(EnumDef),
}

impl FieldKind {
    /// Short description of accepted values, used in error messages.
    pub const fn expected(&self) -> &'static str {
        match self {
            FieldKind::SmallInt
            | FieldKind::Int
            | FieldKind::BigInt
            | FieldKind::ContextInt
            | FieldKind::RowEnum { .. } => "an integer",
            FieldKind::Numeric { .. } => "a decimal",
            FieldKind::Real => "a number",
            FieldKind::Boolean => "a boolean",
            FieldKind::Text | FieldKind::VarChar { .. } | FieldKind::Char { .. } => "a string",
            FieldKind::Date => "a date",
            FieldKind::Time => "a time",
            FieldKind::Timestamp { .. } | FieldKind::UtcNowTimestamp { .. } => "a timestamp",
            FieldKind::Enum(_) => "an enumeration label or value",
        }
    }
}

/// A typed, validated column or parameter descriptor.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    sql_name: String,
    nullable: bool,
    kind: FieldKind,
    context_used: Option<String>,
    source: Option<Arc<dyn ContextSource>>,
}

// ============================================================================
// Construction
// ============================================================================

impl Field {
    /// Create a nullable field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            sql_name: name.clone(),
            name,
            nullable: true,
            kind,
            context_used: None,
            source: None,
        }
    }

    pub fn smallint(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::SmallInt)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub fn bigint(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::BigInt)
    }

    /// An identifier that must come from context key `context_used`.
    pub fn context_int(name: impl Into<String>, context_used: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ContextInt).context(context_used)
    }

    /// A non-nullable per-row counter kept under context key `context_used`.
    pub fn row_enum(
        name: impl Into<String>,
        context_used: impl Into<String>,
        starting_number: i64,
    ) -> Self {
        Self::new(name, FieldKind::RowEnum { starting_number })
            .context(context_used)
            .not_null()
    }

    /// An exact decimal. Floats are rejected unless [`Field::allow_floats`] is
    /// set, and values that do not fit the scale exactly are rejected unless
    /// [`Field::inexact_quantize`] is set.
    pub fn numeric(name: impl Into<String>, precision: u32, scale: u32) -> Self {
        Self::new(
            name,
            FieldKind::Numeric {
                precision,
                scale,
                allow_floats: false,
                inexact_quantize: false,
            },
        )
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Real)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn varchar(name: impl Into<String>, max_length: usize) -> Self {
        Self::new(
            name,
            FieldKind::VarChar {
                max_length,
                silent_truncate: false,
            },
        )
    }

    pub fn char(name: impl Into<String>, max_length: usize) -> Self {
        Self::new(
            name,
            FieldKind::Char {
                max_length,
                silent_truncate: false,
            },
        )
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Time)
    }

    pub fn timestamp(name: impl Into<String>, tz: bool) -> Self {
        Self::new(name, FieldKind::Timestamp { tz })
    }

    /// A timestamp set to the current UTC time on every update.
    pub fn utc_now_timestamp(name: impl Into<String>, tz: bool) -> Self {
        Self::new(name, FieldKind::UtcNowTimestamp { tz })
    }

    pub fn enumeration(name: impl Into<String>, def: EnumDef) -> Self {
        Self::new(name, FieldKind::Enum(def))
    }

    /// Set the column name used in SQL.
    pub fn sql_name(mut self, sql_name: impl Into<String>) -> Self {
        self.sql_name = sql_name.into();
        self
    }

    /// Forbid NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Declare the context key this field reads.
    pub fn context(mut self, key: impl Into<String>) -> Self {
        self.context_used = Some(key.into());
        self
    }

    /// Link the field to a sequence or query.
    pub fn linked(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Accept floats on a numeric field. No effect on other kinds.
    pub fn allow_floats(mut self) -> Self {
        if let FieldKind::Numeric { allow_floats, .. } = &mut self.kind {
            *allow_floats = true;
        }
        self
    }

    /// Silently round values to the scale of a numeric field. No effect on
    /// other kinds.
    pub fn inexact_quantize(mut self) -> Self {
        if let FieldKind::Numeric {
            inexact_quantize, ..
        } = &mut self.kind
        {
            *inexact_quantize = true;
        }
        self
    }

    /// Truncate over-long strings instead of rejecting them. No effect on
    /// other kinds.
    pub fn silent_truncate(mut self) -> Self {
        if let FieldKind::VarChar {
            silent_truncate, ..
        }
        | FieldKind::Char {
            silent_truncate, ..
        } = &mut self.kind
        {
            *silent_truncate = true;
        }
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.sql_name
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// The context key this field reads, if any.
    pub fn context_used(&self) -> Option<&str> {
        self.context_used.as_deref()
    }

    pub fn source(&self) -> Option<&Arc<dyn ContextSource>> {
        self.source.as_ref()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.sql_name, self.sql_type(Dialect::default()))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl Field {
    fn invalid_type(&self, value: &Value) -> Error {
        Error::InvalidType {
            field: self.name.clone(),
            expected: self.kind.expected(),
            found: value.type_name(),
        }
    }

    fn invalid_value(&self, message: impl Into<String>) -> Error {
        Error::InvalidValue {
            field: self.name.clone(),
            message: message.into(),
        }
    }

    /// Validate and convert a value assigned to this field.
    pub fn convert(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            if self.nullable {
                return Ok(Value::Null);
            }
            return Err(Error::NullValue {
                field: self.name.clone(),
            });
        }

        match &self.kind {
            FieldKind::SmallInt => {
                let v = self.integer(&value)?;
                i16::try_from(v)
                    .map(Value::SmallInt)
                    .map_err(|_| self.invalid_value(format!("{v} is out of range for SMALLINT")))
            }
            FieldKind::Int | FieldKind::ContextInt | FieldKind::RowEnum { .. } => {
                let v = self.integer(&value)?;
                i32::try_from(v)
                    .map(Value::Int)
                    .map_err(|_| self.invalid_value(format!("{v} is out of range for INTEGER")))
            }
            FieldKind::BigInt => self.integer(&value).map(Value::BigInt),
            FieldKind::Numeric {
                allow_floats,
                inexact_quantize,
                ..
            } => {
                let d = match &value {
                    Value::Double(f) if *allow_floats => self.decimal_from_float(*f)?,
                    Value::Text(s) => Decimal::from_str(s.trim())
                        .map_err(|e| self.invalid_value(format!("'{s}': {e}")))?,
                    other => other.as_decimal().ok_or_else(|| self.invalid_type(other))?,
                };
                self.quantize(d, *inexact_quantize).map(Value::Decimal)
            }
            FieldKind::Real => match &value {
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Double)
                    .map_err(|e| self.invalid_value(format!("'{s}': {e}"))),
                other => other
                    .as_f64()
                    .map(Value::Double)
                    .ok_or_else(|| self.invalid_type(other)),
            },
            FieldKind::Boolean => match &value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => match other.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    Some(v) => Err(self.invalid_value(format!("{v} is not a boolean"))),
                    None => Err(self.invalid_type(other)),
                },
            },
            FieldKind::Text => match value {
                Value::Text(s) => Ok(Value::Text(s)),
                other => Err(self.invalid_type(&other)),
            },
            FieldKind::VarChar {
                max_length,
                silent_truncate,
            }
            | FieldKind::Char {
                max_length,
                silent_truncate,
            } => match value {
                Value::Text(s) => {
                    let length = s.chars().count();
                    if length <= *max_length {
                        Ok(Value::Text(s))
                    } else if *silent_truncate {
                        Ok(Value::Text(s.chars().take(*max_length).collect()))
                    } else {
                        Err(Error::TooLong {
                            field: self.name.clone(),
                            max_length: *max_length,
                            length,
                        })
                    }
                }
                other => Err(self.invalid_type(&other)),
            },
            FieldKind::Date => match &value {
                Value::Date(d) => Ok(Value::Date(*d)),
                Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
                Value::Text(s) => parse_date(s)
                    .map(Value::Date)
                    .ok_or_else(|| self.invalid_value(format!("'{s}' is not a date"))),
                other => Err(self.invalid_type(other)),
            },
            FieldKind::Time => match &value {
                Value::Time(t) => Ok(Value::Time(*t)),
                Value::Text(s) => parse_time(s)
                    .map(Value::Time)
                    .ok_or_else(|| self.invalid_value(format!("'{s}' is not a time"))),
                other => Err(self.invalid_type(other)),
            },
            FieldKind::Timestamp { tz } | FieldKind::UtcNowTimestamp { tz } => {
                self.timestamp_value(&value, *tz)
            }
            FieldKind::Enum(def) => match &value {
                Value::Text(label) if def.value_of(label).is_some() => Ok(Value::Text(label.clone())),
                Value::Text(label) => Err(self.invalid_value(format!(
                    "'{label}' is not a label of {}",
                    def.name()
                ))),
                other => {
                    let v = other.as_i64().ok_or_else(|| self.invalid_type(other))?;
                    def.label_of(v)
                        .map(|l| Value::Text(l.to_string()))
                        .ok_or_else(|| {
                            self.invalid_value(format!("{v} is not a value of {}", def.name()))
                        })
                }
            },
        }
    }

    /// Convert a value read back from the database. More lenient than
    /// [`Field::convert`]: engines without native decimals, booleans,
    /// temporals or enumerations return them as floats, integers or text, and
    /// NULL is accepted from outer joins and views.
    pub fn from_sql(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (&self.kind, &value) {
            (FieldKind::Numeric { scale, .. }, Value::Double(f)) => {
                let d = self.decimal_from_float(*f)?;
                Ok(Value::Decimal(rescale(d, *scale)))
            }
            (FieldKind::Numeric { scale, .. }, Value::Text(s)) => {
                let d = Decimal::from_str(s.trim())
                    .map_err(|e| self.invalid_value(format!("'{s}': {e}")))?;
                Ok(Value::Decimal(rescale(d, *scale)))
            }
            (FieldKind::Numeric { scale, .. }, Value::Decimal(d)) => {
                Ok(Value::Decimal(rescale(*d, *scale)))
            }
            _ => self.convert(value),
        }
    }

    fn integer(&self, value: &Value) -> Result<i64> {
        match value {
            Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                value.as_i64().ok_or_else(|| self.invalid_type(value))
            }
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| self.invalid_value(format!("'{s}' is not an integer"))),
            other => Err(self.invalid_type(other)),
        }
    }

    fn decimal_from_float(&self, f: f64) -> Result<Decimal> {
        Decimal::from_f64(f).ok_or_else(|| self.invalid_value(format!("{f} is not a finite decimal")))
    }

    fn quantize(&self, d: Decimal, inexact_quantize: bool) -> Result<Decimal> {
        let FieldKind::Numeric {
            precision, scale, ..
        } = self.kind
        else {
            return Ok(d);
        };
        let rounded = d.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven);
        if rounded != d && !inexact_quantize {
            return Err(Error::Inexact {
                field: self.name.clone(),
                value: d.to_string(),
                scale,
            });
        }
        let q = rescale(rounded, scale);
        let limit = 10_i128.checked_pow(precision);
        if limit.is_some_and(|limit| q.mantissa().abs() >= limit) || q.scale() != scale {
            return Err(Error::Precision {
                field: self.name.clone(),
                value: d.to_string(),
                precision,
            });
        }
        Ok(q)
    }

    fn timestamp_value(&self, value: &Value, tz: bool) -> Result<Value> {
        match (value, tz) {
            (Value::Timestamp(ts), false) => Ok(Value::Timestamp(*ts)),
            (Value::TimestampTz(ts), true) => Ok(Value::TimestampTz(*ts)),
            // Naive timestamps given to a zoned field are taken to be UTC.
            (Value::Timestamp(ts), true) => Ok(Value::TimestampTz(ts.and_utc())),
            (Value::TimestampTz(ts), false) => Ok(Value::Timestamp(ts.naive_utc())),
            (Value::Text(s), false) => parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| self.invalid_value(format!("'{s}' is not a timestamp"))),
            (Value::Text(s), true) => parse_timestamptz(s)
                .map(Value::TimestampTz)
                .ok_or_else(|| self.invalid_value(format!("'{s}' is not a timestamp"))),
            (other, _) => Err(self.invalid_type(other)),
        }
    }
}

fn rescale(d: Decimal, scale: u32) -> Decimal {
    let mut d = d.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven);
    d.rescale(scale);
    d
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).ok()
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_str(s, TIMESTAMPTZ_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.and_utc()))
}

// ============================================================================
// Context resolution
// ============================================================================

impl Field {
    /// Resolve the field value against a context.
    ///
    /// * Row counters advance the context counter and store the result.
    /// * Context identifiers adopt the context value, or fail with
    ///   [`Error::ContextRequired`] if it is missing.
    /// * Other fields adopt the context value if they declare a key that is
    ///   present, and otherwise return the stored value.
    pub fn get_context(&self, slot: &mut Value, context: &mut Context) -> Result<Value> {
        match (&self.kind, self.context_used.as_deref()) {
            (FieldKind::RowEnum { starting_number }, Some(key)) => {
                let n = context.next_counter(key, *starting_number)?;
                *slot = self.convert(Value::BigInt(n))?;
            }
            (FieldKind::ContextInt, Some(key)) => match context.get(key) {
                Some(v) => *slot = self.convert(v.clone())?,
                None => {
                    return Err(Error::ContextRequired {
                        field: self.name.clone(),
                        key: key.to_string(),
                    });
                }
            },
            (FieldKind::ContextInt | FieldKind::RowEnum { .. }, None) => {
                return Err(Error::Definition(format!(
                    "field '{}' needs a context key",
                    self.name
                )));
            }
            (_, Some(key)) => {
                if let Some(v) = context.get(key) {
                    *slot = self.convert(v.clone())?;
                }
            }
            (_, None) => {}
        }
        Ok(slot.clone())
    }

    /// Re-read the value from a linked query, without changing server state,
    /// then resolve it against the context.
    pub fn refresh(
        &self,
        slot: &mut Value,
        context: &mut Context,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<Value> {
        if let Some(source) = &self.source {
            if let Some(v) = source.refresh(context, cursor, dialect)? {
                tracing::debug!(field = %self.name, source = %source.describe(), "Refreshed field");
                *slot = self.from_sql(v)?;
            }
        }
        self.get_context(slot, context)
    }

    /// Compute a fresh value (advance a linked sequence, stamp the current
    /// time), store it, then resolve it against the context.
    pub fn update(
        &self,
        slot: &mut Value,
        context: &mut Context,
        cursor: &mut dyn Cursor,
        dialect: Dialect,
    ) -> Result<Value> {
        if let Some(source) = &self.source {
            let v = source.update(context, cursor, dialect)?;
            tracing::debug!(field = %self.name, source = %source.describe(), "Updated field");
            *slot = self.from_sql(v)?;
        } else if let FieldKind::UtcNowTimestamp { .. } = self.kind {
            *slot = self.convert(Value::TimestampTz(Utc::now()))?;
        }
        self.get_context(slot, context)
    }
}

// ============================================================================
// SQL rendering
// ============================================================================

impl Field {
    /// The SQL type of the column, without nullability.
    pub fn sql_type(&self, dialect: Dialect) -> String {
        match &self.kind {
            FieldKind::SmallInt => "SMALLINT".to_string(),
            FieldKind::Int | FieldKind::ContextInt | FieldKind::RowEnum { .. } => {
                "INTEGER".to_string()
            }
            FieldKind::BigInt => "BIGINT".to_string(),
            // Without native decimals the text form is stored under TEXT
            // affinity, so SQLite never turns it into a lossy REAL.
            FieldKind::Numeric { .. } if !dialect.native_decimals() => "TEXT".to_string(),
            FieldKind::Numeric {
                precision, scale, ..
            } => format!("NUMERIC({precision},{scale})"),
            FieldKind::Real => "REAL".to_string(),
            FieldKind::Boolean => "BOOLEAN".to_string(),
            FieldKind::Text => "TEXT".to_string(),
            FieldKind::VarChar { max_length, .. } => format!("VARCHAR({max_length})"),
            FieldKind::Char { max_length, .. } => format!("CHARACTER({max_length})"),
            FieldKind::Date => "DATE".to_string(),
            FieldKind::Time => "TIME".to_string(),
            FieldKind::Timestamp { tz } | FieldKind::UtcNowTimestamp { tz } => {
                if *tz {
                    "TIMESTAMP WITH TIME ZONE".to_string()
                } else {
                    "TIMESTAMP".to_string()
                }
            }
            FieldKind::Enum(def) => def.sql_type(dialect),
        }
    }

    /// The column definition used in `CREATE TABLE`.
    pub fn sql_ddl(&self, dialect: Dialect) -> String {
        let mut ddl = format!("{} {}", self.sql_name, self.sql_type(dialect));
        if !self.nullable {
            ddl.push_str(" NOT NULL");
        }
        ddl
    }

    /// Coerce a stored value into the form bound as a statement parameter.
    pub fn sql_repr(&self, value: &Value, dialect: Dialect) -> Value {
        match (&self.kind, value) {
            (FieldKind::Enum(def), Value::Text(label)) if !dialect.enum_support() => def
                .value_of(label)
                .map_or_else(|| value.clone(), Value::BigInt),
            _ => dialect.sql_repr(value),
        }
    }
}
