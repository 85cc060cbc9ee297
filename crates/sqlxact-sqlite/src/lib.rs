//! SQLite driver for sqlxact.
//!
//! [`SqliteCursor`] implements the `sqlxact_core::Cursor` interface on top of
//! `rusqlite`, with SQLite bundled into the build. Use it together with
//! `Dialect::Sqlite`.
//!
//! ```no_run
//! use sqlxact_core::Cursor;
//! use sqlxact_sqlite::{SqliteConfig, SqliteCursor};
//!
//! let mut cursor = SqliteCursor::open(&SqliteConfig::file("ledger.db"))?;
//! cursor.execute("SELECT 1;", &[])?;
//! # Ok::<(), sqlxact_core::Error>(())
//! ```

pub mod config;
pub mod cursor;

pub use config::SqliteConfig;
pub use cursor::SqliteCursor;
