use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::time::primitive_now_utc;
use crate::services::store::ExamStore;
use crate::tasks::expiry;

pub(crate) async fn run(
    store: Arc<dyn ExamStore>,
    sweep_interval_seconds: u64,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let handle = tokio::spawn(close_expired_loop(store, sweep_interval_seconds, shutdown));

    if let Err(err) = handle.await {
        tracing::error!(error = %err, "Background task join failed");
    }

    Ok(())
}

async fn close_expired_loop(
    store: Arc<dyn ExamStore>,
    sweep_interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(Duration::from_secs(sweep_interval_seconds));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) =
                    expiry::close_expired_attempts(store.as_ref(), primitive_now_utc()).await
                {
                    tracing::error!(error = %err, "close_expired_attempts failed");
                }
            }
        }
    }

    tracing::info!("Expiry sweep stopped");
}
