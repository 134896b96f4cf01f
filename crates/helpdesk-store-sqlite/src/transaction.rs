use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::warn;

use crate::StoreError;

/// Runs `work` inside one IMMEDIATE transaction.
///
/// Commits when `work` succeeds. Otherwise rolls back and hands the original
/// error back untouched; a failed rollback is logged and does not replace it.
/// Nothing here retries.
///
/// # Errors
/// Returns whatever `work` returned, or the begin/commit failure.
pub fn in_transaction<T, F>(conn: &mut Connection, work: F) -> Result<T, StoreError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match work(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, original = %err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

/// Runs read-only `work` inside one DEFERRED transaction so several queries
/// observe the same snapshot.
///
/// # Errors
/// Returns whatever `work` returned, or the begin/commit failure.
pub fn read_snapshot<T, F>(conn: &mut Connection, work: F) -> Result<T, StoreError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let value = work(&tx)?;
    tx.commit()?;
    Ok(value)
}
