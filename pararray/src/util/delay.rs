//! Timer helpers.

use std::time::Duration;

/// Suspend for `ms` milliseconds.
pub async fn delay(ms: u64) {
    delay_for(Duration::from_millis(ms)).await;
}

pub async fn delay_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}
