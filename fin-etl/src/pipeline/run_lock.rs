use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

static LOCKS: Lazy<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Exclusive access to a staging table for the duration of a stage. The
/// truncate-then-load step and the merge step must never run concurrently
/// against the same staging table; a per-table lock is all that takes, since
/// staging is always fully replaced.
pub async fn acquire(table: &str) -> OwnedMutexGuard<()> {
    let lock = {
        let mut locks = LOCKS.lock().unwrap();
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    };
    lock.lock_owned().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_table_is_exclusive() {
        let guard = acquire("fact_banks_staging_test").await;
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            acquire("fact_banks_staging_test"),
        )
        .await;
        assert!(second.is_err(), "second acquire should block while held");
        drop(guard);
        // Released: the lock can be taken again.
        let _guard = acquire("fact_banks_staging_test").await;
    }

    #[tokio::test]
    async fn different_tables_do_not_contend() {
        let _bank = acquire("dim_banks_staging_test").await;
        let cu = tokio::time::timeout(
            Duration::from_millis(50),
            acquire("dim_credit_unions_staging_test"),
        )
        .await;
        assert!(cu.is_ok());
    }
}
