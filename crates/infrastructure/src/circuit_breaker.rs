//! Circuit breaker decorators for outbound provider ports.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bureau_application::{AiSummarizer, Notification, NotificationSender, SummaryRequest};
use bureau_core::{AppError, AppResult};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { successes: u32 },
}

/// Stops calling a provider after consecutive unavailability.
///
/// Once `failure_threshold` calls in a row fail with `Unavailable`, calls fail
/// fast for `cool_off`. Afterwards trial calls pass; two successes close the
/// breaker and one failure opens it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    cool_off: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(
        service: impl Into<String>,
        failure_threshold: u32,
        cool_off: Duration,
    ) -> AppResult<Self> {
        if failure_threshold == 0 {
            return Err(AppError::Validation(
                "circuit breaker failure threshold must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            service: service.into(),
            failure_threshold,
            cool_off,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        })
    }

    /// Returns whether calls currently fail fast.
    pub async fn is_open(&self) -> bool {
        let state = *self.state.lock().await;
        matches!(state, BreakerState::Open { until } if Instant::now() < until)
    }

    /// Runs the call unless the breaker is open.
    pub async fn call<T, F>(&self, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send,
    {
        self.admit().await?;
        let result = call.await;
        match &result {
            Ok(_) => self.record_success().await,
            Err(AppError::Unavailable(_)) => self.record_failure().await,
            Err(_) => {}
        }
        result
    }

    async fn admit(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let BreakerState::Open { until } = *state {
            if Instant::now() < until {
                return Err(AppError::Unavailable(format!(
                    "{} circuit is open, retry in {}s",
                    self.service,
                    until.saturating_duration_since(Instant::now()).as_secs()
                )));
            }
            info!(service = self.service.as_str(), "circuit half-open, probing provider");
            *state = BreakerState::HalfOpen { successes: 0 };
        }
        Ok(())
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        match *state {
            BreakerState::HalfOpen { successes } => {
                if successes + 1 >= HALF_OPEN_SUCCESS_THRESHOLD {
                    info!(service = self.service.as_str(), "circuit closed");
                    *state = BreakerState::Closed { failures: 0 };
                } else {
                    *state = BreakerState::HalfOpen {
                        successes: successes + 1,
                    };
                }
            }
            BreakerState::Closed { .. } => *state = BreakerState::Closed { failures: 0 },
            BreakerState::Open { .. } => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        let failures = match *state {
            BreakerState::Closed { failures } => failures + 1,
            BreakerState::HalfOpen { .. } => self.failure_threshold,
            BreakerState::Open { .. } => return,
        };

        if failures >= self.failure_threshold {
            warn!(
                service = self.service.as_str(),
                failures,
                cool_off_secs = self.cool_off.as_secs(),
                "circuit opened"
            );
            *state = BreakerState::Open {
                until: Instant::now() + self.cool_off,
            };
        } else {
            *state = BreakerState::Closed { failures };
        }
    }
}

/// Notification sender guarded by a circuit breaker.
pub struct CircuitBreakingNotificationSender {
    inner: Arc<dyn NotificationSender>,
    breaker: CircuitBreaker,
}

impl CircuitBreakingNotificationSender {
    /// Wraps a sender.
    #[must_use]
    pub fn new(inner: Arc<dyn NotificationSender>, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl NotificationSender for CircuitBreakingNotificationSender {
    async fn send(&self, notification: Notification) -> AppResult<String> {
        self.breaker.call(self.inner.send(notification)).await
    }
}

/// AI summarizer guarded by a circuit breaker.
pub struct CircuitBreakingAiSummarizer {
    inner: Arc<dyn AiSummarizer>,
    breaker: CircuitBreaker,
}

impl CircuitBreakingAiSummarizer {
    /// Wraps a summarizer.
    #[must_use]
    pub fn new(inner: Arc<dyn AiSummarizer>, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl AiSummarizer for CircuitBreakingAiSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> AppResult<String> {
        self.breaker.call(self.inner.summarize(request)).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bureau_application::{AiSummarizer, SummaryRequest};
    use bureau_core::{AppError, AppResult, TenantId};
    use tokio::sync::Mutex;

    use super::{CircuitBreaker, CircuitBreakingAiSummarizer};

    struct ScriptedSummarizer {
        replies: Mutex<VecDeque<AppResult<String>>>,
        calls: AtomicU32,
    }

    impl ScriptedSummarizer {
        fn new(replies: Vec<AppResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiSummarizer for ScriptedSummarizer {
        async fn summarize(&self, _request: SummaryRequest) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok("summary".to_owned()))
        }
    }

    fn down() -> AppResult<String> {
        Err(AppError::Unavailable("provider timed out".to_owned()))
    }

    fn request() -> SummaryRequest {
        SummaryRequest {
            tenant_id: TenantId::new(),
            text: "Quarterly report".to_owned(),
            instructions: None,
        }
    }

    fn guarded(inner: Arc<ScriptedSummarizer>) -> CircuitBreakingAiSummarizer {
        let Ok(breaker) = CircuitBreaker::new("ai", 3, Duration::from_secs(60)) else {
            panic!("breaker should be valid");
        };
        CircuitBreakingAiSummarizer::new(inner, breaker)
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_consecutive_unavailability_and_fails_fast() {
        let inner = ScriptedSummarizer::new(vec![down(), down(), down()]);
        let summarizer = guarded(inner.clone());

        for _ in 0..3 {
            assert!(matches!(
                summarizer.summarize(request()).await,
                Err(AppError::Unavailable(_))
            ));
        }
        assert!(summarizer.breaker.is_open().await);

        let blocked = summarizer.summarize(request()).await;
        assert!(matches!(
            blocked,
            Err(AppError::Unavailable(ref message)) if message.contains("circuit is open")
        ));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cool_off_lets_trial_calls_through_and_successes_close() {
        let inner = ScriptedSummarizer::new(vec![down(), down(), down()]);
        let summarizer = guarded(inner.clone());
        for _ in 0..3 {
            let _ = summarizer.summarize(request()).await;
        }

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(summarizer.summarize(request()).await.is_err());
        assert_eq!(inner.calls(), 3);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(summarizer.summarize(request()).await.is_ok());
        assert!(summarizer.summarize(request()).await.is_ok());
        assert!(!summarizer.breaker.is_open().await);
        assert_eq!(inner.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_immediately() {
        let inner = ScriptedSummarizer::new(vec![down(), down(), down(), down()]);
        let summarizer = guarded(inner.clone());
        for _ in 0..3 {
            let _ = summarizer.summarize(request()).await;
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(summarizer.summarize(request()).await.is_err());
        assert!(summarizer.breaker.is_open().await);
        assert!(summarizer.summarize(request()).await.is_err());
        assert_eq!(inner.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn success_and_non_transient_errors_do_not_trip() {
        let inner = ScriptedSummarizer::new(vec![
            down(),
            down(),
            Ok("recovered".to_owned()),
            down(),
            down(),
            Err(AppError::Validation("text too long".to_owned())),
            Err(AppError::Validation("text too long".to_owned())),
        ]);
        let summarizer = guarded(inner.clone());

        for _ in 0..7 {
            let _ = summarizer.summarize(request()).await;
        }

        assert!(!summarizer.breaker.is_open().await);
        assert!(summarizer.summarize(request()).await.is_ok());
        assert_eq!(inner.calls(), 8);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        assert!(CircuitBreaker::new("ai", 0, Duration::from_secs(1)).is_err());
    }
}
