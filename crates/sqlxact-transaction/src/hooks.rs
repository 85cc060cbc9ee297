//! Hook points run around transaction operations.

use sqlxact_core::{Context, Cursor, Error, Result};

use crate::transaction::Transaction;

/// Outcome of a hook or of [`TransactionHooks::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Verdict {
    #[default]
    Accept,
    Reject,
    /// Reject with a message for the resulting [`Error::Verification`].
    RejectWith(String),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    /// Turn a rejection into [`Error::Verification`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Verdict::Accept => Ok(()),
            Verdict::Reject => Err(Error::Verification(None)),
            Verdict::RejectWith(message) => Err(Error::Verification(Some(message))),
        }
    }
}

impl From<bool> for Verdict {
    fn from(accepted: bool) -> Self {
        if accepted { Verdict::Accept } else { Verdict::Reject }
    }
}

impl From<String> for Verdict {
    fn from(message: String) -> Self {
        Verdict::RejectWith(message)
    }
}

impl From<&str> for Verdict {
    fn from(message: &str) -> Self {
        Verdict::RejectWith(message.to_string())
    }
}

/// Domain logic attached to a transaction definition.
///
/// The `pre_*` hooks run after the context has been built and before any
/// member SQL is issued. They may initialise absent record members (see
/// [`Transaction::ensure_record`]) and change values on existing members.
/// `post_select` runs once every member has been read back. `verify` is the
/// final check and must not touch the database.
///
/// Every method has a default, so an implementation only overrides what it
/// needs.
pub trait TransactionHooks: Send + Sync + std::fmt::Debug {
    fn pre_insert(
        &self,
        _txn: &mut Transaction,
        _context: &Context,
        _cursor: &mut dyn Cursor,
    ) -> Result<Verdict> {
        Ok(Verdict::Accept)
    }

    fn pre_update(
        &self,
        _txn: &mut Transaction,
        _context: &Context,
        _cursor: &mut dyn Cursor,
    ) -> Result<Verdict> {
        Ok(Verdict::Accept)
    }

    fn pre_delete(
        &self,
        _txn: &mut Transaction,
        _context: &Context,
        _cursor: &mut dyn Cursor,
    ) -> Result<Verdict> {
        Ok(Verdict::Accept)
    }

    /// Default: fill the context fields from the values read back into the
    /// members.
    fn post_select(
        &self,
        txn: &mut Transaction,
        _context: &Context,
        _cursor: &mut dyn Cursor,
    ) -> Result<Verdict> {
        txn.backfill_context()?;
        Ok(Verdict::Accept)
    }

    fn verify(&self, _txn: &Transaction) -> Verdict {
        Verdict::Accept
    }
}

/// Hooks that accept everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl TransactionHooks for DefaultHooks {}
