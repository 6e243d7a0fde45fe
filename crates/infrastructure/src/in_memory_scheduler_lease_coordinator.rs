use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bureau_application::{SchedulerLease, SchedulerLeaseCoordinator};
use bureau_core::{AppError, AppResult};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct HeldLease {
    token: String,
    expires_at: Instant,
}

/// Process-local lease coordinator for single-worker deployments.
#[derive(Debug, Default)]
pub struct InMemorySchedulerLeaseCoordinator {
    leases: Mutex<HashMap<String, HeldLease>>,
}

impl InMemorySchedulerLeaseCoordinator {
    /// Creates a coordinator without held leases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_request(scope_key: &str, holder_id: &str, lease_seconds: u32) -> AppResult<()> {
    if scope_key.trim().is_empty() {
        return Err(AppError::Validation(
            "scheduler lease scope_key must not be empty".to_owned(),
        ));
    }

    if holder_id.trim().is_empty() {
        return Err(AppError::Validation(
            "scheduler lease holder_id must not be empty".to_owned(),
        ));
    }

    if lease_seconds == 0 {
        return Err(AppError::Validation(
            "scheduler lease_seconds must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

#[async_trait]
impl SchedulerLeaseCoordinator for InMemorySchedulerLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<SchedulerLease>> {
        validate_request(scope_key, holder_id, lease_seconds)?;

        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        if leases
            .get(scope_key)
            .is_some_and(|held| held.expires_at > now)
        {
            return Ok(None);
        }

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        leases.insert(
            scope_key.to_owned(),
            HeldLease {
                token: token.clone(),
                expires_at: now + Duration::from_secs(u64::from(lease_seconds)),
            },
        );

        Ok(Some(SchedulerLease {
            scope_key: scope_key.to_owned(),
            holder_id: holder_id.to_owned(),
            token,
        }))
    }

    async fn renew_lease(&self, lease: &SchedulerLease, lease_seconds: u32) -> AppResult<bool> {
        validate_request(&lease.scope_key, &lease.holder_id, lease_seconds)?;

        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        match leases.get_mut(lease.scope_key.as_str()) {
            Some(held) if held.token == lease.token && held.expires_at > now => {
                held.expires_at = now + Duration::from_secs(u64::from(lease_seconds));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, lease: &SchedulerLease) -> AppResult<()> {
        let mut leases = self.leases.lock().await;
        if leases
            .get(lease.scope_key.as_str())
            .is_some_and(|held| held.token == lease.token)
        {
            leases.remove(lease.scope_key.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bureau_application::SchedulerLeaseCoordinator;
    use bureau_core::AppError;

    use super::InMemorySchedulerLeaseCoordinator;

    #[tokio::test(start_paused = true)]
    async fn only_one_holder_until_expiry() {
        let coordinator = InMemorySchedulerLeaseCoordinator::new();

        let first = coordinator.try_acquire_lease("scheduler_tick", "worker-a", 30).await;
        let Ok(Some(first)) = first else {
            panic!("first worker should acquire the lease");
        };
        let second = coordinator.try_acquire_lease("scheduler_tick", "worker-b", 30).await;
        assert!(matches!(second, Ok(None)));

        tokio::time::advance(Duration::from_secs(31)).await;

        let renewed = coordinator.renew_lease(&first, 30).await;
        assert!(matches!(renewed, Ok(false)));
        let taken_over = coordinator.try_acquire_lease("scheduler_tick", "worker-b", 30).await;
        assert!(matches!(taken_over, Ok(Some(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn release_requires_the_owning_token() {
        let coordinator = InMemorySchedulerLeaseCoordinator::new();
        let Ok(Some(mut lease)) = coordinator
            .try_acquire_lease("scheduler_tick", "worker-a", 30)
            .await
        else {
            panic!("lease should be acquired");
        };

        let genuine = lease.clone();
        lease.token = "worker-b:forged".to_owned();
        assert!(coordinator.release_lease(&lease).await.is_ok());
        assert!(matches!(
            coordinator.try_acquire_lease("scheduler_tick", "worker-b", 30).await,
            Ok(None)
        ));

        assert!(coordinator.release_lease(&genuine).await.is_ok());
        assert!(matches!(
            coordinator.try_acquire_lease("scheduler_tick", "worker-b", 30).await,
            Ok(Some(_))
        ));
    }

    #[tokio::test]
    async fn zero_lease_seconds_is_rejected() {
        let coordinator = InMemorySchedulerLeaseCoordinator::new();
        let result = coordinator.try_acquire_lease("scheduler_tick", "worker-a", 0).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
