use async_trait::async_trait;
use bureau_core::AppResult;

/// Lease held by one worker for one coordination scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerLease {
    /// Coordination scope, e.g. `scheduler_tick`.
    pub scope_key: String,
    /// Worker that holds the lease.
    pub holder_id: String,
    /// Random token proving ownership on release and renew.
    pub token: String,
}

/// Distributed coordination port for scheduler leadership.
#[async_trait]
pub trait SchedulerLeaseCoordinator: Send + Sync {
    /// Attempts to acquire one lease for the given scope.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<SchedulerLease>>;

    /// Renews one lease and returns false when token ownership changed.
    async fn renew_lease(&self, lease: &SchedulerLease, lease_seconds: u32) -> AppResult<bool>;

    /// Releases one lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &SchedulerLease) -> AppResult<()>;
}
