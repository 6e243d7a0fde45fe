use bureau_core::CorrelationId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::*;

/// Domain event waiting for automation dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    /// Tenant the event belongs to.
    pub tenant_id: TenantId,
    /// Correlation id of the request that published the event.
    pub correlation_id: CorrelationId,
    /// The event.
    pub event: DomainEvent,
}

/// Bounded publisher side of the automation event queue.
#[derive(Clone)]
pub struct AutomationEventQueue {
    sender: mpsc::Sender<QueuedEvent>,
}

/// Consumer side of the automation event queue.
pub struct AutomationEventReceiver {
    receiver: mpsc::Receiver<QueuedEvent>,
}

impl AutomationEventQueue {
    /// Creates a queue holding at most `capacity` undelivered events.
    pub fn bounded(capacity: usize) -> AppResult<(Self, AutomationEventReceiver)> {
        if capacity == 0 {
            return Err(AppError::Validation(
                "event queue capacity must be at least 1".to_owned(),
            ));
        }

        let (sender, receiver) = mpsc::channel(capacity);
        Ok((Self { sender }, AutomationEventReceiver { receiver }))
    }

    /// Publishes an event, waiting while the queue is full.
    pub async fn publish(&self, context: &RequestContext, event: DomainEvent) -> AppResult<()> {
        self.sender
            .send(queued(context, event))
            .await
            .map_err(|_| AppError::Unavailable("automation event queue is closed".to_owned()))
    }

    /// Publishes an event without waiting.
    pub fn try_publish(&self, context: &RequestContext, event: DomainEvent) -> AppResult<()> {
        self.sender
            .try_send(queued(context, event))
            .map_err(|error| match error {
                TrySendError::Full(_) => {
                    AppError::Unavailable("automation event queue is full".to_owned())
                }
                TrySendError::Closed(_) => {
                    AppError::Unavailable("automation event queue is closed".to_owned())
                }
            })
    }
}

impl AutomationEventReceiver {
    /// Receives the next event, or `None` once every publisher is dropped.
    pub async fn recv(&mut self) -> Option<QueuedEvent> {
        self.receiver.recv().await
    }
}

fn queued(context: &RequestContext, event: DomainEvent) -> QueuedEvent {
    QueuedEvent {
        tenant_id: context.tenant_id(),
        correlation_id: context.correlation_id(),
        event,
    }
}

impl AutomationService {
    /// Dispatches queued events until every publisher is dropped.
    ///
    /// Returns the number of events consumed.
    pub async fn run_event_consumer(&self, mut receiver: AutomationEventReceiver) -> usize {
        let mut consumed = 0;

        while let Some(queued) = receiver.recv().await {
            consumed += 1;
            let context = RequestContext::for_service(queued.tenant_id)
                .with_correlation_id(queued.correlation_id);
            let event_type = queued.event.event_type.clone();

            if let Err(error) = self.dispatch_event(&context, queued.event).await {
                error!(
                    tenant_id = %queued.tenant_id,
                    correlation_id = %queued.correlation_id,
                    event_type = event_type.as_str(),
                    error = %error,
                    "queued event dispatch failed"
                );
            }
        }

        info!(consumed, "automation event consumer stopped");
        consumed
    }
}
