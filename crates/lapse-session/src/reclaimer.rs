//! Background task that periodically sweeps expired sessions.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::store::{Payload, Shared};

/// Handle to the running sweep loop.
///
/// Dropping the handle cancels the loop.
pub(crate) struct Reclaimer {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Reclaimer {
    /// Spawn the sweep loop on the current tokio runtime.
    pub(crate) fn spawn<T: Payload>(shared: Arc<Shared<T>>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("reclaimer needs a tokio runtime: {}", e)))?;

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run(shared, cancel.clone()));

        Ok(Self {
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Cancel the loop and wait for it to exit.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
            && e.is_panic()
        {
            warn!(error = %e, "Session reclaimer panicked");
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<T: Payload>(shared: Arc<Shared<T>>, cancel: CancellationToken) {
    let config = shared.config();
    let mut ticker = interval(config.sweep_interval);
    // Overdue buckets are caught up by the next sweep, no need to burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        ttl = ?config.ttl,
        sweep_interval = ?config.sweep_interval,
        "Session reclaimer started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                shared.sweep().await;
            }
        }
    }

    info!("Session reclaimer stopped");
}
