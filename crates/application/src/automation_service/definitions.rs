use super::*;

impl AutomationService {
    /// Creates a workflow template after validating its actions.
    pub async fn create_template(
        &self,
        context: &RequestContext,
        input: WorkflowTemplateInput,
    ) -> AppResult<WorkflowTemplate> {
        self.require_workflow_manage(context).await?;
        self.executors.validate_actions(&input.actions)?;

        let template = WorkflowTemplate::new(
            WorkflowTemplateId::new(),
            context.tenant_id(),
            context.user_id(),
            Utc::now(),
            input,
        )?;
        self.workflows.save_template(template.clone()).await?;

        self.authorization_service
            .audit()
            .record(
                context,
                AuditEvent::new(AuditAction::WorkflowTemplateCreated, "workflow_template")
                    .with_resource_id(template.id())
                    .with_new_values(template_summary(&template)),
            )
            .await?;

        info!(
            tenant_id = %context.tenant_id(),
            template_id = %template.id(),
            trigger_type = template.trigger().trigger_type().as_str(),
            actions = template.actions().len(),
            "workflow template created"
        );

        Ok(template)
    }

    /// Activates a workflow template.
    pub async fn activate_template(
        &self,
        context: &RequestContext,
        template_id: WorkflowTemplateId,
    ) -> AppResult<WorkflowTemplate> {
        self.set_template_active(context, template_id, true).await
    }

    /// Deactivates a workflow template. Later actions of running executions
    /// are skipped.
    pub async fn deactivate_template(
        &self,
        context: &RequestContext,
        template_id: WorkflowTemplateId,
    ) -> AppResult<WorkflowTemplate> {
        self.set_template_active(context, template_id, false).await
    }

    /// Lists workflow templates of the context tenant.
    pub async fn list_templates(&self, context: &RequestContext) -> AppResult<Vec<WorkflowTemplate>> {
        self.require_workflow_manage(context).await?;
        self.workflows.list_templates(context.tenant_id()).await
    }

    /// Creates an automation rule after validating its actions.
    pub async fn create_rule(
        &self,
        context: &RequestContext,
        input: AutomationRuleInput,
    ) -> AppResult<AutomationRule> {
        self.require_workflow_manage(context).await?;
        self.executors.validate_actions(&input.actions)?;

        let rule = AutomationRule::new(
            AutomationRuleId::new(),
            context.tenant_id(),
            context.user_id(),
            Utc::now(),
            input,
        )?;
        self.rules.save_rule(rule.clone()).await?;

        self.authorization_service
            .audit()
            .record(
                context,
                AuditEvent::new(AuditAction::AutomationRuleCreated, "automation_rule")
                    .with_resource_id(rule.id())
                    .with_new_values(rule_summary(&rule)),
            )
            .await?;

        info!(
            tenant_id = %context.tenant_id(),
            rule_id = %rule.id(),
            event_type = rule.event_type(),
            cooldown_minutes = rule.cooldown_minutes(),
            "automation rule created"
        );

        Ok(rule)
    }

    /// Activates an automation rule.
    pub async fn activate_rule(
        &self,
        context: &RequestContext,
        rule_id: AutomationRuleId,
    ) -> AppResult<AutomationRule> {
        self.set_rule_active(context, rule_id, true).await
    }

    /// Deactivates an automation rule.
    pub async fn deactivate_rule(
        &self,
        context: &RequestContext,
        rule_id: AutomationRuleId,
    ) -> AppResult<AutomationRule> {
        self.set_rule_active(context, rule_id, false).await
    }

    /// Lists automation rules of the context tenant.
    pub async fn list_rules(&self, context: &RequestContext) -> AppResult<Vec<AutomationRule>> {
        self.require_workflow_manage(context).await?;
        self.rules.list_rules(context.tenant_id()).await
    }

    /// Lists executions of the context tenant, newest first.
    pub async fn list_executions(
        &self,
        context: &RequestContext,
        query: ExecutionListQuery,
    ) -> AppResult<Vec<WorkflowExecution>> {
        self.require_workflow_manage(context).await?;
        self.workflows
            .list_executions(context.tenant_id(), &query)
            .await
    }

    /// Finds one execution of the context tenant.
    pub async fn find_execution(
        &self,
        context: &RequestContext,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<WorkflowExecution> {
        self.require_workflow_manage(context).await?;
        self.load_execution(context.tenant_id(), execution_id).await
    }

    /// Requests cancellation of a pending or running execution.
    ///
    /// An execution running in this process stops before its next action.
    /// One that is not running here is marked failed immediately.
    pub async fn cancel_execution(
        &self,
        context: &RequestContext,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<WorkflowExecution> {
        self.require_workflow_manage(context).await?;
        let mut execution = self
            .load_execution(context.tenant_id(), execution_id)
            .await?;

        if execution.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "execution '{execution_id}' already finished as {}",
                execution.status.as_str()
            )));
        }

        let reason = format!("requested by {}", context.principal().subject());
        let in_flight = self
            .cancellations
            .request(execution_id, reason.clone())
            .await;
        if !in_flight {
            execution.fail(Utc::now(), format!("cancelled: {reason}"))?;
            self.workflows.update_execution(&execution).await?;
        }

        self.authorization_service
            .audit()
            .record(
                context,
                AuditEvent::new(
                    AuditAction::WorkflowExecutionCancelRequested,
                    "workflow_execution",
                )
                .with_resource_id(execution_id)
                .with_new_values(json!({
                    "source": execution.source,
                    "in_flight": in_flight,
                })),
            )
            .await?;

        info!(
            tenant_id = %context.tenant_id(),
            execution_id = %execution_id,
            in_flight,
            "workflow execution cancellation requested"
        );

        Ok(execution)
    }

    async fn set_template_active(
        &self,
        context: &RequestContext,
        template_id: WorkflowTemplateId,
        is_active: bool,
    ) -> AppResult<WorkflowTemplate> {
        self.require_workflow_manage(context).await?;
        let mut template = self
            .workflows
            .find_template(context.tenant_id(), template_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("workflow template '{template_id}' does not exist"))
            })?;

        let was_active = template.is_active();
        template.set_active(is_active);
        self.workflows.save_template(template.clone()).await?;

        let action = if is_active {
            AuditAction::WorkflowTemplateActivated
        } else {
            AuditAction::WorkflowTemplateDeactivated
        };
        self.authorization_service
            .audit()
            .record(
                context,
                AuditEvent::new(action, "workflow_template")
                    .with_resource_id(template_id)
                    .with_old_values(json!({ "is_active": was_active }))
                    .with_new_values(json!({ "is_active": is_active })),
            )
            .await?;

        info!(
            tenant_id = %context.tenant_id(),
            template_id = %template_id,
            is_active,
            "workflow template activation changed"
        );

        Ok(template)
    }

    async fn set_rule_active(
        &self,
        context: &RequestContext,
        rule_id: AutomationRuleId,
        is_active: bool,
    ) -> AppResult<AutomationRule> {
        self.require_workflow_manage(context).await?;
        let mut rule = self
            .rules
            .find_rule(context.tenant_id(), rule_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("automation rule '{rule_id}' does not exist"))
            })?;

        let was_active = rule.is_active();
        rule.set_active(is_active);
        self.rules.save_rule(rule.clone()).await?;

        let action = if is_active {
            AuditAction::AutomationRuleActivated
        } else {
            AuditAction::AutomationRuleDeactivated
        };
        self.authorization_service
            .audit()
            .record(
                context,
                AuditEvent::new(action, "automation_rule")
                    .with_resource_id(rule_id)
                    .with_old_values(json!({ "is_active": was_active }))
                    .with_new_values(json!({ "is_active": is_active })),
            )
            .await?;

        Ok(rule)
    }

    async fn load_execution(
        &self,
        tenant_id: TenantId,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<WorkflowExecution> {
        self.workflows
            .find_execution(tenant_id, execution_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("workflow execution '{execution_id}' does not exist"))
            })
    }

    pub(super) async fn require_workflow_manage(&self, context: &RequestContext) -> AppResult<()> {
        self.authorization_service
            .require_admin_permission(context, Permission::WorkflowManage)
            .await
    }
}

fn template_summary(template: &WorkflowTemplate) -> Value {
    json!({
        "name": template.name().as_str(),
        "trigger": template.trigger(),
        "priority": template.priority(),
        "is_active": template.is_active(),
        "action_types": template
            .actions()
            .iter()
            .map(|action| action.action_type.as_str())
            .collect::<Vec<_>>(),
    })
}

fn rule_summary(rule: &AutomationRule) -> Value {
    json!({
        "name": rule.name().as_str(),
        "event_type": rule.event_type(),
        "cooldown_minutes": rule.cooldown_minutes(),
        "is_active": rule.is_active(),
        "action_types": rule
            .actions()
            .iter()
            .map(|action| action.action_type.as_str())
            .collect::<Vec<_>>(),
    })
}
