use super::*;

use bureau_domain::ExecutionStatus;

/// Reason a pipeline stops before its next action.
enum Interruption {
    Cancelled(String),
    FinishedElsewhere(Box<WorkflowExecution>),
}

impl AutomationService {
    /// Evaluates one template against a trigger and runs it when eligible.
    ///
    /// The template is read fresh under its definition lock.
    pub(super) async fn fire_template(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
        trigger_type: TriggerType,
        trigger_context: Value,
    ) -> AppResult<FiringOutcome> {
        let source = ExecutionSource::Template(template_id);
        let _guard = self.locks.acquire(source).await;

        let Some(template) = self.workflows.find_template(tenant_id, template_id).await? else {
            return Ok(FiringOutcome::Missing);
        };
        if !template.is_active() {
            return Ok(FiringOutcome::Inactive);
        }
        if !template.conditions().matches(&trigger_context) {
            return Ok(FiringOutcome::ConditionsNotMet);
        }

        let execution = self
            .execute_pipeline(
                tenant_id,
                source,
                trigger_type,
                trigger_context,
                template.actions(),
            )
            .await?;
        Ok(FiringOutcome::Executed(Box::new(execution)))
    }

    /// Evaluates one rule against an event and runs it unless cooling down.
    pub(super) async fn fire_rule(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
        trigger_context: Value,
    ) -> AppResult<FiringOutcome> {
        let source = ExecutionSource::Rule(rule_id);
        let _guard = self.locks.acquire(source).await;

        let Some(rule) = self.rules.find_rule(tenant_id, rule_id).await? else {
            return Ok(FiringOutcome::Missing);
        };
        if !rule.is_active() {
            return Ok(FiringOutcome::Inactive);
        }
        if !rule.conditions().matches(&trigger_context) {
            return Ok(FiringOutcome::ConditionsNotMet);
        }

        let now = Utc::now();
        if !self.rules.claim_rule_firing(tenant_id, rule_id, now).await? {
            warn!(
                tenant_id = %tenant_id,
                rule_id = %rule_id,
                next_eligible_at = ?rule.next_eligible_at(),
                "automation rule suppressed by cooldown"
            );
            return Ok(FiringOutcome::CoolingDown);
        }

        let execution = self
            .execute_pipeline(
                tenant_id,
                source,
                TriggerType::Event,
                trigger_context,
                rule.actions(),
            )
            .await?;
        Ok(FiringOutcome::Executed(Box::new(execution)))
    }

    async fn execute_pipeline(
        &self,
        tenant_id: TenantId,
        source: ExecutionSource,
        trigger_type: TriggerType,
        trigger_context: Value,
        actions: &[WorkflowAction],
    ) -> AppResult<WorkflowExecution> {
        let context = RequestContext::for_service(tenant_id);
        let mut execution = WorkflowExecution::pending(
            tenant_id,
            source,
            trigger_type,
            trigger_context,
            context.correlation_id(),
            Utc::now(),
        );
        self.workflows.create_execution(&execution).await?;

        self.cancellations.track(execution.id).await;
        let result = self.drive(&context, &mut execution, actions).await;
        self.cancellations.untrack(execution.id).await;
        if let Err(error) = result {
            self.abort_execution(&context, &mut execution, actions.len(), &error).await;
            return Err(error);
        }

        self.authorization_service
            .audit()
            .record(&context, execution_event(&execution, actions.len()))
            .await?;

        if execution.error_message.is_some() {
            warn!(
                tenant_id = %tenant_id,
                execution_id = %execution.id,
                source = %source,
                error = execution.error_message.as_deref().unwrap_or_default(),
                "workflow execution failed"
            );
        } else {
            info!(
                tenant_id = %tenant_id,
                execution_id = %execution.id,
                source = %source,
                actions = execution.output.len(),
                "workflow execution completed"
            );
        }

        Ok(execution)
    }

    /// Moves an execution whose pipeline errored out to a terminal state.
    ///
    /// Persisting and auditing are attempted once; their failures are logged
    /// so the original error reaches the caller.
    async fn abort_execution(
        &self,
        context: &RequestContext,
        execution: &mut WorkflowExecution,
        actions_total: usize,
        cause: &AppError,
    ) {
        if !execution.status.is_terminal()
            && let Err(error) = execution.fail(Utc::now(), format!("aborted: {cause}"))
        {
            debug!(execution_id = %execution.id, error = %error, "execution already settled");
        }

        if let Err(error) = self.workflows.update_execution(execution).await {
            error!(
                tenant_id = %execution.tenant_id,
                execution_id = %execution.id,
                error = %error,
                "failed to persist aborted workflow execution"
            );
        }

        if let Err(error) = self
            .authorization_service
            .audit()
            .record(context, execution_event(execution, actions_total))
            .await
        {
            error!(
                tenant_id = %execution.tenant_id,
                execution_id = %execution.id,
                error = %error,
                "failed to audit aborted workflow execution"
            );
        }

        warn!(
            tenant_id = %execution.tenant_id,
            execution_id = %execution.id,
            source = %execution.source,
            error = %cause,
            "workflow execution aborted"
        );
    }

    async fn drive(
        &self,
        context: &RequestContext,
        execution: &mut WorkflowExecution,
        actions: &[WorkflowAction],
    ) -> AppResult<()> {
        execution.start()?;
        self.workflows.update_execution(execution).await?;

        for (index, action) in actions.iter().enumerate() {
            match self.interruption(execution).await? {
                Some(Interruption::Cancelled(reason)) => {
                    execution.fail(Utc::now(), format!("cancelled: {reason}"))?;
                    return self.workflows.update_execution(execution).await;
                }
                Some(Interruption::FinishedElsewhere(stored)) => {
                    *execution = *stored;
                    return Ok(());
                }
                None => {}
            }

            let Some(executor) = self.executors.get(&action.action_type) else {
                execution.fail(
                    Utc::now(),
                    format!(
                        "action {index} ({}) has no registered executor",
                        action.action_type
                    ),
                )?;
                return self.workflows.update_execution(execution).await;
            };

            let invocation = ActionInvocation {
                context,
                params: &action.params,
                trigger_context: &execution.trigger_context,
                previous_outputs: &execution.output,
            };
            let result = self.run_with_retry(executor.as_ref(), invocation).await;

            match result {
                Ok((output, attempts)) => {
                    execution.record_outcome(ActionOutcome {
                        index,
                        action_type: action.action_type.clone(),
                        attempts,
                        output,
                    })?;
                    self.workflows.update_execution(execution).await?;
                }
                Err((failure, attempts)) => {
                    execution.fail(
                        Utc::now(),
                        format!(
                            "action {index} ({}) failed after {attempts} attempt(s): {failure}",
                            action.action_type
                        ),
                    )?;
                    return self.workflows.update_execution(execution).await;
                }
            }
        }

        execution.complete(Utc::now())?;
        self.workflows.update_execution(execution).await
    }

    async fn run_with_retry(
        &self,
        executor: &dyn ActionExecutor,
        invocation: ActionInvocation<'_>,
    ) -> Result<(Value, u32), (ExecutorError, u32)> {
        let max_attempts = self.retry_policy.max_attempts();
        let mut attempt = 1;

        loop {
            match executor.execute(invocation).await {
                Ok(output) => return Ok((output, attempt)),
                Err(failure) if failure.is_transient() && attempt < max_attempts => {
                    let delay = self.retry_policy.backoff(attempt);
                    warn!(
                        tenant_id = %invocation.context.tenant_id(),
                        action_type = executor.action_type(),
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %failure,
                        "transient action failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err((failure, attempt)),
            }
        }
    }

    async fn interruption(&self, execution: &WorkflowExecution) -> AppResult<Option<Interruption>> {
        if let Some(reason) = self.cancellations.requested(execution.id).await {
            return Ok(Some(Interruption::Cancelled(reason)));
        }

        if let Some(stored) = self
            .workflows
            .find_execution(execution.tenant_id, execution.id)
            .await?
            && stored.status.is_terminal()
        {
            return Ok(Some(Interruption::FinishedElsewhere(Box::new(stored))));
        }

        let active = match execution.source {
            ExecutionSource::Template(template_id) => self
                .workflows
                .find_template(execution.tenant_id, template_id)
                .await?
                .is_some_and(|template| template.is_active()),
            ExecutionSource::Rule(rule_id) => self
                .rules
                .find_rule(execution.tenant_id, rule_id)
                .await?
                .is_some_and(|rule| rule.is_active()),
        };

        if active {
            Ok(None)
        } else {
            debug!(
                tenant_id = %execution.tenant_id,
                execution_id = %execution.id,
                source = %execution.source,
                "definition deactivated during execution"
            );
            Ok(Some(Interruption::Cancelled(format!(
                "{} {} was deactivated",
                execution.source.kind(),
                execution.source.id()
            ))))
        }
    }
}

fn execution_event(execution: &WorkflowExecution, actions_total: usize) -> AuditEvent {
    let action = match execution.status {
        ExecutionStatus::Completed => AuditAction::WorkflowExecutionCompleted,
        _ => AuditAction::WorkflowExecutionFailed,
    };
    let mut event = AuditEvent::new(action, "workflow_execution")
        .with_resource_id(execution.id)
        .with_new_values(json!({
            "source": execution.source,
            "trigger_type": execution.trigger_type.as_str(),
            "status": execution.status.as_str(),
            "actions_completed": execution.output.len(),
            "actions_total": actions_total,
        }));
    if let Some(message) = execution.error_message.as_deref() {
        event = event.with_error(message);
    }
    event
}
