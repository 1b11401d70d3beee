use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Leave balance ledger owned by the surrounding HR system.
#[async_trait]
pub trait LeaveBalanceClient: Send + Sync {
    /// Gives back the days consumed by an approved request that is being
    /// deleted.
    async fn restore_leave_balance(&self, request_id: Uuid) -> anyhow::Result<()>;
}

/// Default client for deployments without a ledger integration: the
/// restoration is only recorded in the service log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBalanceClient;

#[async_trait]
impl LeaveBalanceClient for LoggingBalanceClient {
    async fn restore_leave_balance(&self, request_id: Uuid) -> anyhow::Result<()> {
        info!(%request_id, "leave balance restoration recorded");
        Ok(())
    }
}
