use chrono::{DurationRound, TimeDelta};
use tokio::task::JoinSet;

use super::*;

/// Summary of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Minute slot the tick evaluated.
    pub slot: Option<DateTime<Utc>>,
    /// Tenants with active scheduled templates.
    pub tenants: usize,
    /// Executions started by the tick, per tenant in priority order.
    pub executions: Vec<WorkflowExecutionId>,
    /// Tenants whose evaluation failed.
    pub failed_tenants: usize,
}

impl AutomationService {
    /// Evaluates scheduled templates of every tenant for the minute of `now`.
    ///
    /// Tenants run concurrently. Inside a tenant, matching templates run one
    /// after another by descending priority.
    pub async fn run_scheduled_tick(&self, now: DateTime<Utc>) -> AppResult<TickReport> {
        let slot = now
            .duration_trunc(TimeDelta::minutes(1))
            .map_err(|error| AppError::Internal(format!("invalid tick time: {error}")))?;
        let tenants = self.workflows.list_tenants_with_active_schedules().await?;

        let mut report = TickReport {
            slot: Some(slot),
            tenants: tenants.len(),
            ..TickReport::default()
        };

        let mut tasks = JoinSet::new();
        for tenant_id in tenants {
            let service = self.clone();
            tasks.spawn(async move {
                let result = service.run_tenant_schedule(tenant_id, slot).await;
                (tenant_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(executions))) => report.executions.extend(executions),
                Ok((tenant_id, Err(error))) => {
                    report.failed_tenants += 1;
                    error!(
                        tenant_id = %tenant_id,
                        slot = %slot,
                        error = %error,
                        "scheduled evaluation failed for tenant"
                    );
                }
                Err(error) => {
                    report.failed_tenants += 1;
                    error!(slot = %slot, error = %error, "scheduled evaluation task aborted");
                }
            }
        }

        info!(
            slot = %slot,
            tenants = report.tenants,
            executions = report.executions.len(),
            failed_tenants = report.failed_tenants,
            "scheduler tick finished"
        );

        Ok(report)
    }

    async fn run_tenant_schedule(
        &self,
        tenant_id: TenantId,
        slot: DateTime<Utc>,
    ) -> AppResult<Vec<WorkflowExecutionId>> {
        let mut due = self
            .workflows
            .list_active_templates_for_trigger(tenant_id, TriggerType::Scheduled)
            .await?
            .into_iter()
            .filter(|template| {
                template
                    .trigger()
                    .schedule()
                    .is_some_and(|schedule| schedule.matches(slot))
            })
            .collect::<Vec<_>>();
        due.sort_by(|left, right| {
            right
                .priority()
                .cmp(&left.priority())
                .then_with(|| left.name().as_str().cmp(right.name().as_str()))
        });

        let mut executions = Vec::new();
        for template in due {
            if !self
                .workflows
                .claim_schedule_slot(tenant_id, template.id(), slot)
                .await?
            {
                debug!(
                    tenant_id = %tenant_id,
                    template_id = %template.id(),
                    slot = %slot,
                    "schedule slot already claimed"
                );
                continue;
            }

            let trigger_context = json!({
                "scheduled_for": slot.to_rfc3339(),
                "template_id": template.id(),
            });
            let outcome = self
                .fire_template(
                    tenant_id,
                    template.id(),
                    TriggerType::Scheduled,
                    trigger_context,
                )
                .await;

            match outcome {
                Ok(FiringOutcome::Executed(execution)) => executions.push(execution.id),
                Ok(skipped) => debug!(
                    tenant_id = %tenant_id,
                    template_id = %template.id(),
                    outcome = skipped.label(),
                    "scheduled template did not fire"
                ),
                Err(error) => error!(
                    tenant_id = %tenant_id,
                    template_id = %template.id(),
                    error = %error,
                    "scheduled template failed"
                ),
            }
        }

        Ok(executions)
    }
}
