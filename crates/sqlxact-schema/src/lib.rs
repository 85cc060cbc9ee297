//! Records, tables, views and schema objects for sqlxact.
//!
//! # Role In The Architecture
//!
//! - **Definitions**: [`RecordDef`] describes a record type, optionally bound
//!   to a table (with [`Constraint`]s) or a view. Definitions are immutable
//!   once built and shared behind an `Arc`.
//! - **Instances**: [`Record`] and [`RecordList`] hold values for a
//!   definition and render the INSERT/UPDATE/DELETE/SELECT statements for
//!   them, resolving context fields on the way.
//! - **Schema objects**: [`Sequence`] and [`Index`] complete the DDL surface,
//!   and [`Schema`] creates everything registered with it in order.

pub mod constraint;
pub mod index;
pub mod record;
pub mod record_list;
pub mod schema;
pub mod sequence;

pub use constraint::{Constraint, ConstraintKind, Deferrable, FkMatch, ForeignKey, ReferentialAction};
pub use index::{Index, IndexBuilder, IndexItem, SortDirection};
pub use record::{Record, RecordDef, RecordDefBuilder, RecordKind};
pub use record_list::RecordList;
pub use schema::{CommandOrder, Schema};
pub use sequence::Sequence;
