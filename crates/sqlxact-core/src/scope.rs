//! Database transaction scopes.

use crate::cursor::Cursor;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::types::IsolationLevel;

/// Run `f` between a `BEGIN` and a `COMMIT`.
///
/// If `f` or the commit fails, the transaction is rolled back and the
/// original error is returned. A failing rollback is logged and otherwise
/// ignored. With [`IsolationLevel::ManualTransactions`] no transaction
/// statements are issued at all.
pub fn in_transaction<T, F>(
    cursor: &mut dyn Cursor,
    dialect: Dialect,
    isolation_level: Option<IsolationLevel>,
    f: F,
) -> Result<T>
where
    F: FnOnce(&mut dyn Cursor) -> Result<T>,
{
    if let Some(sql) = dialect.begin_transaction_sql(isolation_level) {
        tracing::debug!(sql = %sql, "Beginning transaction");
        cursor.execute(&sql, &[])?;
    }

    let result = f(&mut *cursor).and_then(|value| {
        if let Some(sql) = dialect.commit_transaction_sql(isolation_level) {
            cursor.execute(sql, &[])?;
        }
        Ok(value)
    });

    if let Err(err) = &result {
        if let Some(sql) = dialect.rollback_transaction_sql(isolation_level) {
            tracing::debug!(error = %err, "Rolling back transaction");
            if let Err(rollback_err) = cursor.execute(sql, &[]) {
                tracing::warn!(
                    error = %err,
                    rollback_error = %rollback_err,
                    "Rollback failed"
                );
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MockCursor;
    use crate::error::Error;
    use crate::value::Value;

    #[test]
    fn test_commit_on_success() {
        let mut cursor = MockCursor::new();
        let n = in_transaction(&mut cursor, Dialect::Sqlite, None, |c| {
            c.execute("INSERT INTO t VALUES (?);", &[Value::Int(1)])?;
            Ok(7)
        })
        .unwrap();
        assert_eq!(n, 7);
        assert_eq!(
            cursor.statements(),
            vec!["BEGIN TRANSACTION;", "INSERT INTO t VALUES (?);", "COMMIT;"]
        );
    }

    #[test]
    fn test_rollback_on_error() {
        let mut cursor = MockCursor::new();
        let err = in_transaction(&mut cursor, Dialect::Sqlite, None, |_| -> Result<()> {
            Err(Error::Verification(None))
        })
        .unwrap_err();
        assert!(err.is_verification());
        assert_eq!(cursor.statements(), vec!["BEGIN TRANSACTION;", "ROLLBACK;"]);
    }

    #[test]
    fn test_rollback_when_commit_fails() {
        let mut cursor = MockCursor::new();
        cursor.fail_at(1);
        let err = in_transaction(&mut cursor, Dialect::Sqlite, None, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
        assert_eq!(
            cursor.statements(),
            vec!["BEGIN TRANSACTION;", "COMMIT;", "ROLLBACK;"]
        );
    }

    #[test]
    fn test_manual_transactions_issue_nothing() {
        let mut cursor = MockCursor::new();
        in_transaction(
            &mut cursor,
            Dialect::Postgres,
            Some(IsolationLevel::ManualTransactions),
            |_| Ok(()),
        )
        .unwrap();
        assert!(cursor.calls().is_empty());
    }
}
