use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use leaseflake::TimeSource;

use crate::{LeaseCoordinator, LeaseStore, Result};

/// Handle to the background refresh loop started by
/// [`LeaseCoordinator::spawn`].
///
/// Dropping the handle cancels the loop; [`shutdown`](Self::shutdown) also
/// waits for it to finish. Stopping refreshes does not release the row. It
/// simply expires, and the local deadline still bounds how long IDs can be
/// issued for it.
#[derive(Debug)]
pub struct RefreshTask {
    shutdown_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    /// Cancels the loop and waits for it. A cycle in flight is abandoned at
    /// its next await point.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Task`](crate::LeaseError::Task) if the loop
    /// panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        tracing::info!("lease refresh task shut down");
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

impl<S, T> LeaseCoordinator<S, T>
where
    S: LeaseStore,
    T: TimeSource<u64> + Send + Sync + 'static,
{
    /// Starts refreshing on the current Tokio runtime: one cycle right away,
    /// then one every [`refresh_interval`](crate::LeaseConfig::refresh_interval).
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(&self) -> RefreshTask {
        let shutdown_token = CancellationToken::new();
        let coordinator = self.clone();
        let handle = tokio::spawn(coordinator.refresh_loop(shutdown_token.clone()));
        RefreshTask {
            shutdown_token,
            handle: Some(handle),
        }
    }

    async fn refresh_loop(self, shutdown_token: CancellationToken) {
        let mut ticker = interval(self.config().refresh_interval);
        // a slow cycle pushes the next one back instead of bunching them up
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(owner = %self.owner_token(), "lease refresh task started");
        loop {
            tokio::select! {
                biased;
                () = shutdown_token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                () = shutdown_token.cancelled() => break,
                // failures are logged by the cycle itself
                _ = self.refresh() => {}
            }
        }
        tracing::debug!(owner = %self.owner_token(), "lease refresh task stopped");
    }
}
