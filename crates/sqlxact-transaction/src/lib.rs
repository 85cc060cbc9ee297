//! Multi-record transactions for sqlxact.
//!
//! A [`TransactionDef`] groups context fields, record members and list
//! members that are written and read together. A [`Transaction`] instance
//! runs each operation inside one database transaction:
//!
//! - `insert_existing` / `insert_new` write records in declaration order,
//!   then list members in one batch each.
//! - `update` / `delete` walk the members in reverse.
//! - `context_select` reads every member back using the context fields.
//!
//! Context values (a transaction id, a timestamp, a line counter) are pushed
//! into every member through the [`sqlxact_core::Context`] built from the
//! context fields. Domain checks live in a [`TransactionHooks`]
//! implementation.
//!
//! # Example
//!
//! ```ignore
//! let posting = TransactionDef::builder("Posting")
//!     .context_field(Field::bigint("trans_id").linked(trans_seq))
//!     .record("header", &header_def)
//!     .record_list("lines", &line_def)
//!     .hooks(Balanced)
//!     .build()?;
//!
//! let mut txn = Transaction::new(&posting).with_record("header", header)?;
//! txn.insert_new(&mut cursor, Dialect::Sqlite)?;
//! ```

pub mod definition;
pub mod hooks;
pub mod transaction;

pub use definition::{ListMember, TransactionDef, TransactionDefBuilder};
pub use hooks::{DefaultHooks, TransactionHooks, Verdict};
pub use transaction::Transaction;
