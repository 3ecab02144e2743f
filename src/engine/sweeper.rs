// src/engine/sweeper.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::status::StatusStore;

/// Periodically purge expired status records.
///
/// Reads already treat expired records as absent; this only reclaims space.
pub fn spawn_sweeper(store: Arc<dyn StatusStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(removed) => debug!(removed, "status sweep finished"),
                Err(e) => warn!(error = %e, "status sweep failed"),
            }
        }
    })
}
