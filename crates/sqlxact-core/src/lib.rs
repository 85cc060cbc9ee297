//! Core types for sqlxact.
//!
//! `sqlxact-core` is the foundation layer of the workspace. It defines the
//! data types and the driver boundary that every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Data model**: [`Value`] is the dynamic SQL value stored in record slots,
//!   bound as parameters and read back from tuples.
//! - **Field protocol**: [`Field`] validates assignments, renders SQL types and
//!   resolves values from a [`Context`] at three strengths (`get_context`,
//!   `refresh`, `update`).
//! - **Driver boundary**: the [`Cursor`] trait is the only way sqlxact talks to a
//!   database. [`MockCursor`] records statements for tests.
//! - **Dialects**: [`Dialect`] captures the SQL differences between SQLite and
//!   PostgreSQL. It is always passed explicitly.
//! - **Scopes**: [`in_transaction`] wraps a unit of work in begin/commit with
//!   rollback on error.
//!
//! # Who Uses This Crate
//!
//! - `sqlxact-schema` builds record, table and view definitions from fields.
//! - `sqlxact-query` binds query placeholders to fields.
//! - `sqlxact-transaction` threads a `Context` through its members.
//! - `sqlxact-sqlite` implements `Cursor` on top of `rusqlite`.

pub mod context;
pub mod cursor;
pub mod dialect;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod scope;
pub mod types;
pub mod value;

pub use context::Context;
pub use cursor::{Cursor, MockCall, MockCursor, MockFailure, Row};
pub use dialect::{Dialect, convert_schema_sep};
pub use error::{DriverError, Error, Result};
pub use field::{ContextSource, Field, FieldKind};
pub use identifiers::{validate_identifier, validate_unique_names};
pub use scope::in_transaction;
pub use types::{EnumDef, IsolationLevel};
pub use value::Value;
