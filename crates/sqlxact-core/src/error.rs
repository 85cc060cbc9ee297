//! Error types shared by every sqlxact crate.
//!
//! The taxonomy is flat. Domain failures (`Verification`,
//! `UnconstrainedWhere`, `ContextRequired`) sit next to the field assignment
//! errors, and errors raised by a database driver pass through untouched in
//! [`Error::Driver`].

use thiserror::Error;

/// Boxed error produced by a database driver.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors raised by sqlxact.
#[derive(Error, Debug)]
pub enum Error {
    /// A transaction failed an internal consistency check (a hook or `verify`).
    #[error("verification failed{}", .0.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Verification(Option<String>),

    /// A WHERE clause would not constrain the affected rows.
    #[error("unconstrained WHERE clause: {0}")]
    UnconstrainedWhere(String),

    /// A field can only be resolved from a context key that is missing.
    #[error("field '{field}' requires context value '{key}'")]
    ContextRequired { field: String, key: String },

    /// Null assigned to a non-nullable field.
    #[error("field '{field}' can not be null")]
    NullValue { field: String },

    /// A value of an incompatible type was assigned to a field.
    #[error("field '{field}' expects {expected}, got {found}")]
    InvalidType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A value of the right type that the field still rejects.
    #[error("invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A string longer than the declared maximum length.
    #[error("field '{field}' is limited to {max_length} characters, got {length}")]
    TooLong {
        field: String,
        max_length: usize,
        length: usize,
    },

    /// A decimal that cannot be quantized to the field scale without loss.
    #[error("field '{field}' can not store {value} exactly with scale {scale}")]
    Inexact { field: String, value: String, scale: u32 },

    /// A decimal that does not fit the declared precision.
    #[error("field '{field}' can not store {value} within precision {precision}")]
    Precision {
        field: String,
        value: String,
        precision: u32,
    },

    /// An invalid definition of a record, query, transaction or schema object.
    #[error("definition error: {0}")]
    Definition(String),

    /// A name that is not a field of the record/query/transaction.
    #[error("'{name}' is not a valid field of {owner}")]
    UnknownField { owner: String, name: String },

    /// A record of the wrong definition was supplied.
    #[error("value must be an instance of {expected}, got {found}")]
    WrongRecordType { expected: String, found: String },

    /// Positional construction with the wrong number of values.
    #[error("{expected} values required, {supplied} supplied")]
    ValueCount { expected: usize, supplied: usize },

    /// A position outside a record list.
    #[error("index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A query result did not have the requested shape.
    #[error("query error: {0}")]
    Query(String),

    /// JSON input could not be decoded into registered types.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error raised by the underlying database driver.
    #[error("database error: {0}")]
    Driver(DriverError),
}

impl Error {
    /// Wrap any driver error without translating it.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Driver(Box::new(err))
    }

    /// Whether this error is a domain verification failure.
    pub fn is_verification(&self) -> bool {
        matches!(self, Error::Verification(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_message() {
        assert_eq!(Error::Verification(None).to_string(), "verification failed");
        assert_eq!(
            Error::Verification(Some("unbalanced".into())).to_string(),
            "verification failed: unbalanced"
        );
    }

    #[test]
    fn test_context_required_message() {
        let err = Error::ContextRequired {
            field: "trans_id".into(),
            key: "tid".into(),
        };
        assert_eq!(
            err.to_string(),
            "field 'trans_id' requires context value 'tid'"
        );
    }

    #[test]
    fn test_driver_passthrough() {
        let io = std::io::Error::other("disk on fire");
        let err = Error::driver(io);
        assert!(matches!(err, Error::Driver(_)));
        assert!(err.to_string().contains("disk on fire"));
    }
}
