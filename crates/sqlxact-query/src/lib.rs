//! Query templates for sqlxact.
//!
//! - [`QueryDef`] holds a template with `{name}` parameters and the fields
//!   that convert them. A query def can back a linked context field.
//! - [`Query`] carries parameter values and reads results back as a single
//!   value, records, or a [`sqlxact_schema::RecordList`].
//! - [`QueryResult`] is a record list kept in sync with a query.

pub mod query;
pub mod query_result;

pub use query::{Query, QueryDef, QueryDefBuilder, ResultRecords};
pub use query_result::QueryResult;
