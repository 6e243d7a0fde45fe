use super::*;

impl AutomationService {
    /// Fires event templates and automation rules matching the event type.
    ///
    /// A failing definition is logged and does not stop the others.
    pub async fn dispatch_event(
        &self,
        context: &RequestContext,
        event: DomainEvent,
    ) -> AppResult<Vec<WorkflowExecution>> {
        let tenant_id = context.tenant_id();
        let templates = self
            .workflows
            .list_active_templates_for_trigger(tenant_id, TriggerType::Event)
            .await?
            .into_iter()
            .filter(|template| template.trigger().event_type() == Some(event.event_type.as_str()))
            .collect::<Vec<_>>();
        let rules = self
            .rules
            .list_active_rules_for_event(tenant_id, event.event_type.as_str())
            .await?;

        let mut executions = Vec::new();
        for template in templates {
            let outcome = self
                .fire_template(
                    tenant_id,
                    template.id(),
                    TriggerType::Event,
                    event.payload.clone(),
                )
                .await;
            collect_outcome(
                &mut executions,
                tenant_id,
                ExecutionSource::Template(template.id()),
                outcome,
            );
        }

        for rule in rules {
            let outcome = self
                .fire_rule(tenant_id, rule.id(), event.payload.clone())
                .await;
            collect_outcome(
                &mut executions,
                tenant_id,
                ExecutionSource::Rule(rule.id()),
                outcome,
            );
        }

        info!(
            tenant_id = %tenant_id,
            correlation_id = %context.correlation_id(),
            event_type = event.event_type.as_str(),
            executions = executions.len(),
            "domain event dispatched"
        );

        Ok(executions)
    }

    /// Fires active webhook templates registered under the hook key.
    pub async fn fire_webhook(
        &self,
        tenant_id: TenantId,
        hook_key: &str,
        payload: Value,
    ) -> AppResult<Vec<WorkflowExecution>> {
        let templates = self
            .workflows
            .list_active_templates_for_trigger(tenant_id, TriggerType::Webhook)
            .await?
            .into_iter()
            .filter(|template| template.trigger().hook_key() == Some(hook_key))
            .collect::<Vec<_>>();

        if templates.is_empty() {
            return Err(AppError::NotFound(format!(
                "no active webhook is registered under '{hook_key}'"
            )));
        }

        let mut executions = Vec::new();
        for template in templates {
            let outcome = self
                .fire_template(
                    tenant_id,
                    template.id(),
                    TriggerType::Webhook,
                    payload.clone(),
                )
                .await;
            collect_outcome(
                &mut executions,
                tenant_id,
                ExecutionSource::Template(template.id()),
                outcome,
            );
        }

        Ok(executions)
    }

    /// Runs one template on request.
    ///
    /// Only templates with a manual trigger qualify. Other trigger types,
    /// inactive templates and unmet conditions are reported as conflicts.
    pub async fn fire_manual(
        &self,
        context: &RequestContext,
        template_id: WorkflowTemplateId,
        payload: Value,
    ) -> AppResult<WorkflowExecution> {
        self.authorization_service
            .require_permission(context, Permission::WorkflowExecute)
            .await?;

        if let Some(template) = self
            .workflows
            .find_template(context.tenant_id(), template_id)
            .await?
        {
            let trigger_type = template.trigger().trigger_type();
            if trigger_type != TriggerType::Manual {
                return Err(AppError::Conflict(format!(
                    "workflow template '{template_id}' is triggered by {}, not manually",
                    trigger_type.as_str()
                )));
            }
        }

        let outcome = self
            .fire_template(context.tenant_id(), template_id, TriggerType::Manual, payload)
            .await?;

        match outcome {
            FiringOutcome::Executed(execution) => {
                info!(
                    tenant_id = %context.tenant_id(),
                    template_id = %template_id,
                    execution_id = %execution.id,
                    subject = %context.principal().subject(),
                    "workflow fired manually"
                );
                Ok(*execution)
            }
            FiringOutcome::Missing => Err(AppError::NotFound(format!(
                "workflow template '{template_id}' does not exist"
            ))),
            FiringOutcome::Inactive => Err(AppError::Conflict(format!(
                "workflow template '{template_id}' is not active"
            ))),
            FiringOutcome::ConditionsNotMet | FiringOutcome::CoolingDown => {
                Err(AppError::Conflict(format!(
                    "workflow template '{template_id}' conditions do not match the payload"
                )))
            }
        }
    }
}

fn collect_outcome(
    executions: &mut Vec<WorkflowExecution>,
    tenant_id: TenantId,
    source: ExecutionSource,
    outcome: AppResult<FiringOutcome>,
) {
    match outcome {
        Ok(FiringOutcome::Executed(execution)) => executions.push(*execution),
        Ok(skipped) => debug!(
            tenant_id = %tenant_id,
            source = %source,
            outcome = skipped.label(),
            "definition did not fire"
        ),
        Err(error) => error!(
            tenant_id = %tenant_id,
            source = %source,
            error = %error,
            "definition evaluation failed"
        ),
    }
}
