use anyhow::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::observability::provider_metrics;
use crate::signer::SignerCoordinator;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Graceful shutdown for running approval flows
#[derive(Default)]
pub struct ShutdownCoordinator {
    flows: Vec<SignerCoordinator>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a flow whose tasks must be cancelled on shutdown
    pub fn register(&mut self, flow: SignerCoordinator) {
        self.flows.push(flow);
    }

    pub fn tracked_flows(&self) -> usize {
        self.flows.len()
    }

    /// Resolve when the process receives Ctrl-C
    pub async fn wait_for_signal() -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        Ok(())
    }

    /// Wait for Ctrl-C, then shut everything down
    pub async fn wait_for_shutdown(self) -> Result<()> {
        Self::wait_for_signal().await?;
        self.shutdown_all().await
    }

    /// Cancel every tracked flow's poll task and supervisor
    pub async fn shutdown_all(&self) -> Result<()> {
        info!(flows = self.flows.len(), "Initiating graceful shutdown");

        for flow in &self.flows {
            if timeout(SHUTDOWN_TIMEOUT, flow.shutdown()).await.is_err() {
                warn!("Timed out waiting for signer flow to stop");
            }
        }

        // Log final API usage statistics
        provider_metrics().log_stats();

        info!("Graceful shutdown completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::mocks::ScriptedProvider;
    use crate::signer::{CoordinatorConfig, MemorySignerStore};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_polling() {
        let provider = Arc::new(ScriptedProvider::new());
        let flow = SignerCoordinator::new(
            provider,
            Arc::new(MemorySignerStore::new()),
            CoordinatorConfig::default(),
        );
        assert!(flow.start_polling("signer-1").await);

        let mut shutdown = ShutdownCoordinator::new();
        shutdown.register(flow.clone());
        assert_eq!(shutdown.tracked_flows(), 1);
        shutdown.shutdown_all().await.unwrap();

        assert!(!flow.is_polling().await);
    }
}
