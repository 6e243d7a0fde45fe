//! Fake ports shared by service tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bureau_core::{
    AppError, AppResult, AutomationRuleId, DepartmentId, Principal, RecordId, Role, TenantId,
    UserId, WorkflowExecutionId, WorkflowTemplateId,
};
use bureau_domain::{
    AuditRecord, AuditRecordDraft, AutomationRule, ChainLink, OwnedRecord, Permission,
    PermissionGrant, ResourceType, ScopePredicate, TriggerType, WorkflowExecution,
    WorkflowTemplate,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    AiSummarizer, AuditQuery, AuditRecorder, AuditRepository, AuditWritePolicy,
    AuthorizationService, AutomationRuleRepository, ExecutionListQuery, NewTask, Notification,
    NotificationSender, OfficeRecord, OfficeRecordStore, PermissionGrantRepository, RecordFilter,
    RequestContext, SummaryRequest, WorkflowRepository,
};

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    records: Mutex<Vec<AuditRecord>>,
}

impl FakeAuditRepository {
    pub(crate) async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    pub(crate) async fn tamper(&self, index: usize, resource_id: &str) {
        if let Some(record) = self.records.lock().await.get_mut(index) {
            record.resource_id = Some(resource_id.to_owned());
        }
    }
}

#[async_trait]
impl AuditRepository for FakeAuditRepository {
    async fn append(&self, draft: AuditRecordDraft) -> AppResult<AuditRecord> {
        let mut records = self.records.lock().await;
        let link = records
            .iter()
            .rev()
            .find(|record| record.tenant_id == draft.tenant_id)
            .map_or_else(ChainLink::genesis, ChainLink::after);
        let record = AuditRecord::seal(draft, link);
        records.push(record.clone());
        Ok(record)
    }

    async fn list_records(
        &self,
        tenant_id: TenantId,
        query: &AuditQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .rev()
            .filter(|record| record.tenant_id == tenant_id && query.matches(record))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn list_chain(&self, tenant_id: TenantId) -> AppResult<Vec<AuditRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| record.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeGrantRepository {
    grants: Mutex<Vec<PermissionGrant>>,
    unavailable: AtomicBool,
}

impl FakeGrantRepository {
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) async fn insert(&self, grant: PermissionGrant) {
        self.grants.lock().await.push(grant);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("grant store offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionGrantRepository for FakeGrantRepository {
    async fn list_grants_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Vec<PermissionGrant>> {
        self.check_available()?;
        Ok(self
            .grants
            .lock()
            .await
            .iter()
            .filter(|grant| grant.tenant_id() == tenant_id && grant.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn list_grants(&self, tenant_id: TenantId) -> AppResult<Vec<PermissionGrant>> {
        self.check_available()?;
        Ok(self
            .grants
            .lock()
            .await
            .iter()
            .filter(|grant| grant.tenant_id() == tenant_id)
            .cloned()
            .collect())
    }

    async fn find_grant(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        permission: Permission,
    ) -> AppResult<Option<PermissionGrant>> {
        self.check_available()?;
        Ok(self
            .grants
            .lock()
            .await
            .iter()
            .find(|grant| {
                grant.tenant_id() == tenant_id
                    && grant.user_id() == user_id
                    && grant.permission() == permission
            })
            .cloned())
    }

    async fn save_grant(&self, grant: PermissionGrant) -> AppResult<()> {
        self.check_available()?;
        let mut grants = self.grants.lock().await;
        grants.retain(|stored| {
            !(stored.tenant_id() == grant.tenant_id()
                && stored.user_id() == grant.user_id()
                && stored.permission() == grant.permission())
        });
        grants.push(grant);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeWorkflowRepository {
    templates: Mutex<HashMap<WorkflowTemplateId, WorkflowTemplate>>,
    executions: Mutex<Vec<WorkflowExecution>>,
    slots: Mutex<HashSet<(WorkflowTemplateId, DateTime<Utc>)>>,
    update_calls: AtomicUsize,
    failing_update: AtomicUsize,
}

impl FakeWorkflowRepository {
    pub(crate) async fn executions(&self) -> Vec<WorkflowExecution> {
        self.executions.lock().await.clone()
    }

    /// Makes the n-th `update_execution` call (1-based) fail once.
    pub(crate) fn fail_update(&self, call: usize) {
        self.failing_update.store(call, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkflowRepository for FakeWorkflowRepository {
    async fn save_template(&self, template: WorkflowTemplate) -> AppResult<()> {
        let mut templates = self.templates.lock().await;
        if templates.values().any(|stored| {
            stored.tenant_id() == template.tenant_id()
                && stored.id() != template.id()
                && stored.name() == template.name()
        }) {
            return Err(AppError::Conflict(format!(
                "workflow template '{}' already exists",
                template.name().as_str()
            )));
        }

        templates.insert(template.id(), template);
        Ok(())
    }

    async fn find_template(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
    ) -> AppResult<Option<WorkflowTemplate>> {
        Ok(self
            .templates
            .lock()
            .await
            .get(&template_id)
            .filter(|template| template.tenant_id() == tenant_id)
            .cloned())
    }

    async fn list_templates(&self, tenant_id: TenantId) -> AppResult<Vec<WorkflowTemplate>> {
        Ok(self
            .templates
            .lock()
            .await
            .values()
            .filter(|template| template.tenant_id() == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_active_templates_for_trigger(
        &self,
        tenant_id: TenantId,
        trigger_type: TriggerType,
    ) -> AppResult<Vec<WorkflowTemplate>> {
        Ok(self
            .templates
            .lock()
            .await
            .values()
            .filter(|template| {
                template.tenant_id() == tenant_id
                    && template.is_active()
                    && template.trigger().trigger_type() == trigger_type
            })
            .cloned()
            .collect())
    }

    async fn list_tenants_with_active_schedules(&self) -> AppResult<Vec<TenantId>> {
        let mut tenants = self
            .templates
            .lock()
            .await
            .values()
            .filter(|template| {
                template.is_active()
                    && template.trigger().trigger_type() == TriggerType::Scheduled
            })
            .map(WorkflowTemplate::tenant_id)
            .collect::<Vec<_>>();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }

    async fn claim_schedule_slot(
        &self,
        _tenant_id: TenantId,
        template_id: WorkflowTemplateId,
        slot: DateTime<Utc>,
    ) -> AppResult<bool> {
        Ok(self.slots.lock().await.insert((template_id, slot)))
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        self.executions.lock().await.push(execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.failing_update.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("execution store blip".to_owned()));
        }

        let mut executions = self.executions.lock().await;
        let stored = executions
            .iter_mut()
            .find(|stored| stored.id == execution.id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{}' not found", execution.id)))?;
        *stored = execution.clone();
        Ok(())
    }

    async fn find_execution(
        &self,
        tenant_id: TenantId,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<Option<WorkflowExecution>> {
        Ok(self
            .executions
            .lock()
            .await
            .iter()
            .find(|execution| execution.id == execution_id && execution.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_executions(
        &self,
        tenant_id: TenantId,
        query: &ExecutionListQuery,
    ) -> AppResult<Vec<WorkflowExecution>> {
        Ok(self
            .executions
            .lock()
            .await
            .iter()
            .rev()
            .filter(|execution| {
                execution.tenant_id == tenant_id
                    && query.source.is_none_or(|source| source == execution.source)
                    && query.status.is_none_or(|status| status == execution.status)
            })
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeRuleRepository {
    rules: Mutex<HashMap<AutomationRuleId, AutomationRule>>,
}

#[async_trait]
impl AutomationRuleRepository for FakeRuleRepository {
    async fn save_rule(&self, rule: AutomationRule) -> AppResult<()> {
        self.rules.lock().await.insert(rule.id(), rule);
        Ok(())
    }

    async fn find_rule(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
    ) -> AppResult<Option<AutomationRule>> {
        Ok(self
            .rules
            .lock()
            .await
            .get(&rule_id)
            .filter(|rule| rule.tenant_id() == tenant_id)
            .cloned())
    }

    async fn list_rules(&self, tenant_id: TenantId) -> AppResult<Vec<AutomationRule>> {
        Ok(self
            .rules
            .lock()
            .await
            .values()
            .filter(|rule| rule.tenant_id() == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_active_rules_for_event(
        &self,
        tenant_id: TenantId,
        event_type: &str,
    ) -> AppResult<Vec<AutomationRule>> {
        Ok(self
            .rules
            .lock()
            .await
            .values()
            .filter(|rule| {
                rule.tenant_id() == tenant_id && rule.is_active() && rule.event_type() == event_type
            })
            .cloned()
            .collect())
    }

    async fn claim_rule_firing(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut rules = self.rules.lock().await;
        let rule = rules
            .get_mut(&rule_id)
            .filter(|rule| rule.tenant_id() == tenant_id)
            .ok_or_else(|| AppError::NotFound(format!("automation rule '{rule_id}' not found")))?;
        Ok(rule.claim_firing(now).is_ok())
    }
}

#[derive(Default)]
pub(crate) struct FakeNotificationSender {
    sent: Mutex<Vec<Notification>>,
    transient_failures: AtomicUsize,
}

impl FakeNotificationSender {
    pub(crate) fn fail_next(&self, failures: usize) {
        self.transient_failures.store(failures, Ordering::SeqCst);
    }

    pub(crate) async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSender for FakeNotificationSender {
    async fn send(&self, notification: Notification) -> AppResult<String> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Unavailable("notification provider timeout".to_owned()));
        }

        let mut sent = self.sent.lock().await;
        sent.push(notification);
        Ok(format!("msg-{}", sent.len()))
    }
}

pub(crate) struct FakeAiSummarizer;

#[async_trait]
impl AiSummarizer for FakeAiSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> AppResult<String> {
        let words = request.text.split_whitespace().take(5).collect::<Vec<_>>();
        Ok(format!("summary: {}", words.join(" ")))
    }
}

#[derive(Default)]
pub(crate) struct FakeOfficeRecordStore {
    records: Mutex<Vec<OfficeRecord>>,
}

impl FakeOfficeRecordStore {
    pub(crate) async fn insert(&self, record: OfficeRecord) {
        self.records.lock().await.push(record);
    }

    pub(crate) async fn records(&self) -> Vec<OfficeRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl OfficeRecordStore for FakeOfficeRecordStore {
    async fn list_records(
        &self,
        resource_type: ResourceType,
        predicate: &ScopePredicate,
        filter: &RecordFilter,
    ) -> AppResult<Vec<OfficeRecord>> {
        let records = self.records.lock().await;
        let matching = records
            .iter()
            .filter(|record| {
                record.resource_type == resource_type
                    && predicate.matches(&record.ownership())
                    && filter
                        .status
                        .as_deref()
                        .is_none_or(|status| record.attributes["status"] == status)
            })
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn find_record(
        &self,
        tenant_id: TenantId,
        resource_type: ResourceType,
        record_id: RecordId,
    ) -> AppResult<Option<OfficeRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|record| {
                record.id == record_id
                    && record.resource_type == resource_type
                    && record.ownership.tenant_id == tenant_id
            })
            .cloned())
    }

    async fn create_task(&self, tenant_id: TenantId, task: NewTask) -> AppResult<OfficeRecord> {
        let record = OfficeRecord {
            id: RecordId::new(),
            resource_type: ResourceType::Task,
            ownership: bureau_domain::RecordOwnership {
                tenant_id,
                owner_id: task.owner_id,
                assignee_id: task.assignee_id,
                department_id: None,
            },
            attributes: serde_json::json!({
                "title": task.title,
                "description": task.description,
                "status": "open",
            }),
        };
        self.records.lock().await.push(record.clone());
        Ok(record)
    }
}

/// Authorization stack wired to fakes.
pub(crate) struct AuthorizationFixture {
    pub(crate) audit_repository: Arc<FakeAuditRepository>,
    pub(crate) grant_repository: Arc<FakeGrantRepository>,
    pub(crate) authorization: AuthorizationService,
}

impl AuthorizationFixture {
    pub(crate) fn new() -> Self {
        let audit_repository = Arc::new(FakeAuditRepository::default());
        let grant_repository = Arc::new(FakeGrantRepository::default());
        let audit = AuditRecorder::new(audit_repository.clone(), AuditWritePolicy::BestEffort);
        let authorization = AuthorizationService::new(grant_repository.clone(), audit);

        Self {
            audit_repository,
            grant_repository,
            authorization,
        }
    }
}

pub(crate) fn context(tenant_id: TenantId, role: Role) -> RequestContext {
    RequestContext::for_job(Principal::new(tenant_id, UserId::new(), role, None))
}

pub(crate) fn department_context(
    tenant_id: TenantId,
    role: Role,
    department_id: DepartmentId,
) -> RequestContext {
    RequestContext::for_job(Principal::new(
        tenant_id,
        UserId::new(),
        role,
        Some(department_id),
    ))
}

pub(crate) fn office_record(
    resource_type: ResourceType,
    ownership: bureau_domain::RecordOwnership,
    attributes: Value,
) -> OfficeRecord {
    OfficeRecord {
        id: RecordId::new(),
        resource_type,
        ownership,
        attributes,
    }
}
