//! sqlxact: declarative SQL records, queries and multi-record transactions.
//!
//! This crate re-exports the workspace crates behind one dependency and adds
//! the JSON layer and a logging cursor.
//!
//! # Crates
//!
//! - [`sqlxact_core`]: values, fields, contexts, dialects and the [`Cursor`]
//!   driver boundary.
//! - [`sqlxact_schema`]: records, tables, views, sequences, indexes and schemas.
//! - [`sqlxact_query`]: query templates with `{name}` parameters.
//! - [`sqlxact_transaction`]: transactions that keep their members consistent
//!   through a shared context.
//! - `sqlxact_sqlite` (feature `sqlite`, on by default): a `rusqlite` cursor.
//!
//! # Example
//!
//! ```ignore
//! use sqlxact::prelude::*;
//!
//! let mut schema = Schema::new("accounting")?;
//! let trans_id = schema.register_sequence(Sequence::new("trans_id"))?;
//! let journal = RecordDef::table("Journal", "journals")
//!     .field(Field::context_int("trans_id", "trans_id"))
//!     .field(Field::text("narrative"))
//!     .constraint(Constraint::primary_key("journals_pk", ["trans_id"]))
//!     .build_in(&mut schema)?;
//! let posting = TransactionDef::builder("Posting")
//!     .context_field(Field::bigint("trans_id").linked(trans_id))
//!     .record("journal", &journal)
//!     .build()?;
//!
//! let mut cursor = SqliteCursor::open_in_memory()?;
//! schema.create_schema_objects(&mut cursor, Dialect::Sqlite)?;
//! let mut txn = Transaction::new(&posting)
//!     .with_record("journal", Record::new(&journal).with("narrative", "opening")?)?;
//! txn.insert_new(&mut cursor, Dialect::Sqlite)?;
//! ```

pub mod json;
pub mod logging;

pub use sqlxact_core::{
    Context, ContextSource, Cursor, Dialect, EnumDef, Error, Field, FieldKind, IsolationLevel,
    MockCursor, Result, Row, Value, in_transaction,
};
pub use sqlxact_query::{Query, QueryDef, QueryResult};
pub use sqlxact_schema::{
    CommandOrder, Constraint, Index, Record, RecordDef, RecordList, Schema, Sequence,
};
pub use sqlxact_transaction::{Transaction, TransactionDef, TransactionHooks, Verdict};

pub use json::{Decoded, JsonDecoder, record_list_to_json, record_to_json, transaction_to_json};
pub use logging::LoggingCursor;

#[cfg(feature = "sqlite")]
pub use sqlxact_sqlite::{SqliteConfig, SqliteCursor};

/// Everything needed to declare and use records and transactions.
pub mod prelude {
    pub use crate::{
        Constraint, Context, Cursor, Dialect, EnumDef, Error, Field, Index, IsolationLevel, Query,
        QueryDef, QueryResult, Record, RecordDef, RecordList, Result, Schema, Sequence,
        Transaction, TransactionDef, TransactionHooks, Value, Verdict,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteCursor;
}
