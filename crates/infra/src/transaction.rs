use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::store::StockTransaction;

/// Commit on success, roll back on failure.
///
/// A failed rollback is logged and the original error is returned.
pub(crate) async fn settle<T>(
    tx: Box<dyn StockTransaction>,
    result: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            debug!(error = %err, "rolling back");
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
