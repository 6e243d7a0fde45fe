use std::sync::Arc;

use bureau_application::{
    AccessFilter, AuditRecorder, AuditRepository, AuditWritePolicy, AuthorizationService,
    AutomationRuleRepository, AutomationService, ExecutionListQuery, ExecutorRegistry,
    RequestContext, WorkflowRepository,
};
use bureau_core::{
    AppError, AutomationRuleId, CorrelationId, Principal, Role, TenantId, UserId,
    WorkflowTemplateId,
};
use bureau_domain::{
    AutomationRule, AutomationRuleInput, ConditionSet, CronSchedule, DomainEvent,
    ExecutionSource, ExecutionStatus, TriggerType, WorkflowAction, WorkflowExecution,
    WorkflowTemplate, WorkflowTemplateInput, WorkflowTrigger, verify_chain,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use super::InMemoryWorkflowRepository;
use crate::{
    ConsoleNotificationSender, HttpAiSummarizer, InMemoryAuditRepository,
    InMemoryAutomationRuleRepository, InMemoryOfficeRecordStore,
    InMemoryPermissionGrantRepository,
};

fn reminder_action() -> WorkflowAction {
    WorkflowAction::new(
        "send_reminder",
        json!({
            "recipient_field": "customer.owner_id",
            "channel": "email",
            "message": "Say hello to {{customer.name}}"
        }),
    )
}

fn template(
    tenant_id: TenantId,
    name: &str,
    trigger: WorkflowTrigger,
    priority: i32,
) -> WorkflowTemplate {
    let Ok(template) = WorkflowTemplate::new(
        WorkflowTemplateId::new(),
        tenant_id,
        UserId::new(),
        Utc::now(),
        WorkflowTemplateInput {
            name: name.to_owned(),
            description: None,
            trigger,
            conditions: ConditionSet::default(),
            actions: vec![reminder_action()],
            priority,
            is_active: true,
        },
    ) else {
        panic!("template should be valid");
    };
    template
}

fn scheduled(expression: &str) -> WorkflowTrigger {
    let Ok(cron) = CronSchedule::parse(expression) else {
        panic!("cron should parse");
    };
    WorkflowTrigger::Scheduled { cron }
}

fn rule(tenant_id: TenantId, cooldown_minutes: u32) -> AutomationRule {
    let Ok(rule) = AutomationRule::new(
        AutomationRuleId::new(),
        tenant_id,
        UserId::new(),
        Utc::now(),
        AutomationRuleInput {
            name: "Welcome".to_owned(),
            description: None,
            event_type: "customer.created".to_owned(),
            conditions: ConditionSet::default(),
            actions: vec![reminder_action()],
            cooldown_minutes,
            is_active: true,
        },
    ) else {
        panic!("rule should be valid");
    };
    rule
}

#[tokio::test]
async fn template_names_are_unique_per_tenant_only() {
    let repository = InMemoryWorkflowRepository::new();
    let tenant_id = TenantId::new();
    let morning = template(tenant_id, "Morning", WorkflowTrigger::Manual, 0);
    assert!(repository.save_template(morning.clone()).await.is_ok());

    let duplicate = repository
        .save_template(template(tenant_id, "Morning", WorkflowTrigger::Manual, 5))
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let elsewhere = repository
        .save_template(template(TenantId::new(), "Morning", WorkflowTrigger::Manual, 5))
        .await;
    assert!(elsewhere.is_ok());

    let mut deactivated = morning.clone();
    deactivated.set_active(false);
    assert!(repository.save_template(deactivated).await.is_ok());

    let cross_tenant = repository.find_template(TenantId::new(), morning.id()).await;
    assert!(matches!(cross_tenant, Ok(None)));
}

#[tokio::test]
async fn active_templates_are_ordered_by_priority_then_name() {
    let repository = InMemoryWorkflowRepository::new();
    let tenant_id = TenantId::new();
    for (name, priority) in [("Beta", 10), ("Alpha", 10), ("Urgent", 50)] {
        let saved = repository
            .save_template(template(tenant_id, name, scheduled("0 8 * * *"), priority))
            .await;
        assert!(saved.is_ok());
    }
    let mut parked = template(tenant_id, "Parked", scheduled("0 9 * * *"), 99);
    parked.set_active(false);
    assert!(repository.save_template(parked).await.is_ok());

    let Ok(active) = repository
        .list_active_templates_for_trigger(tenant_id, TriggerType::Scheduled)
        .await
    else {
        panic!("templates should list");
    };
    let names = active
        .iter()
        .map(|template| template.name().as_str().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Urgent", "Alpha", "Beta"]);

    let Ok(tenants) = repository.list_tenants_with_active_schedules().await else {
        panic!("tenants should list");
    };
    assert_eq!(tenants, vec![tenant_id]);
}

#[tokio::test]
async fn schedule_slots_are_claimed_once() {
    let repository = InMemoryWorkflowRepository::new();
    let tenant_id = TenantId::new();
    let template_id = WorkflowTemplateId::new();
    let slot = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).single();
    let Some(slot) = slot else {
        panic!("slot should be valid");
    };

    let first = repository.claim_schedule_slot(tenant_id, template_id, slot).await;
    let second = repository.claim_schedule_slot(tenant_id, template_id, slot).await;
    let next_minute = repository
        .claim_schedule_slot(tenant_id, template_id, slot + Duration::minutes(1))
        .await;

    assert!(matches!(first, Ok(true)));
    assert!(matches!(second, Ok(false)));
    assert!(matches!(next_minute, Ok(true)));
}

#[tokio::test]
async fn claimed_slots_only_retain_the_newest_minute() {
    let repository = InMemoryWorkflowRepository::new();
    let tenant_id = TenantId::new();
    let Some(start) = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).single() else {
        panic!("slot should be valid");
    };

    for minute in 0..120 {
        for _ in 0..3 {
            let claimed = repository
                .claim_schedule_slot(
                    tenant_id,
                    WorkflowTemplateId::new(),
                    start + Duration::minutes(minute),
                )
                .await;
            assert!(matches!(claimed, Ok(true)));
        }
    }
    assert_eq!(repository.slots.read().await.claimed.len(), 3);

    let stale = repository
        .claim_schedule_slot(tenant_id, WorkflowTemplateId::new(), start)
        .await;
    assert!(matches!(stale, Ok(false)));
}

#[tokio::test]
async fn executions_are_tenant_scoped_and_filterable() {
    let repository = InMemoryWorkflowRepository::new();
    let tenant_id = TenantId::new();
    let template_id = WorkflowTemplateId::new();
    let mut completed = WorkflowExecution::pending(
        tenant_id,
        ExecutionSource::Template(template_id),
        TriggerType::Manual,
        json!({}),
        CorrelationId::new(),
        Utc::now(),
    );
    let failed = WorkflowExecution::pending(
        tenant_id,
        ExecutionSource::Rule(AutomationRuleId::new()),
        TriggerType::Event,
        json!({}),
        CorrelationId::new(),
        Utc::now(),
    );
    assert!(repository.create_execution(&completed).await.is_ok());
    assert!(repository.create_execution(&failed).await.is_ok());
    assert!(matches!(
        repository.create_execution(&failed).await,
        Err(AppError::Conflict(_))
    ));

    assert!(completed.start().is_ok());
    assert!(completed.complete(Utc::now()).is_ok());
    assert!(repository.update_execution(&completed).await.is_ok());

    let Ok(by_template) = repository
        .list_executions(
            tenant_id,
            &ExecutionListQuery {
                source: Some(ExecutionSource::Template(template_id)),
                ..ExecutionListQuery::default()
            },
        )
        .await
    else {
        panic!("executions should list");
    };
    assert_eq!(by_template.len(), 1);
    assert_eq!(by_template[0].status, ExecutionStatus::Completed);

    let foreign = repository.find_execution(TenantId::new(), completed.id).await;
    assert!(matches!(foreign, Ok(None)));

    let mut stranger = completed.clone();
    stranger.tenant_id = TenantId::new();
    assert!(matches!(
        repository.update_execution(&stranger).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn rule_claims_respect_cooldown_and_survive_resaves() {
    let repository = InMemoryAutomationRuleRepository::new();
    let tenant_id = TenantId::new();
    let rule = rule(tenant_id, 30);
    assert!(repository.save_rule(rule.clone()).await.is_ok());

    let now = Utc::now();
    let first = repository.claim_rule_firing(tenant_id, rule.id(), now).await;
    assert!(matches!(first, Ok(true)));

    assert!(repository.save_rule(rule.clone()).await.is_ok());
    let cooling = repository
        .claim_rule_firing(tenant_id, rule.id(), now + Duration::minutes(10))
        .await;
    assert!(matches!(cooling, Ok(false)));

    let elapsed = repository
        .claim_rule_firing(tenant_id, rule.id(), now + Duration::minutes(30))
        .await;
    assert!(matches!(elapsed, Ok(true)));

    let unknown = repository
        .claim_rule_firing(tenant_id, AutomationRuleId::new(), now)
        .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn in_memory_stack_runs_event_rules_end_to_end() {
    let audit_repository = Arc::new(InMemoryAuditRepository::new());
    let recorder = AuditRecorder::new(audit_repository.clone(), AuditWritePolicy::Strict);
    let authorization = AuthorizationService::new(
        Arc::new(InMemoryPermissionGrantRepository::new()),
        recorder,
    );
    let registry = ExecutorRegistry::with_default_executors(
        AccessFilter::new(authorization.clone()),
        Arc::new(ConsoleNotificationSender::new()),
        Arc::new(HttpAiSummarizer::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/v1",
            None,
            "unused",
        )),
        Arc::new(InMemoryOfficeRecordStore::new()),
    );
    let service = AutomationService::new(
        authorization,
        Arc::new(InMemoryWorkflowRepository::new()),
        Arc::new(InMemoryAutomationRuleRepository::new()),
        registry,
    );

    let tenant_id = TenantId::new();
    let admin =
        RequestContext::for_job(Principal::new(tenant_id, UserId::new(), Role::Admin, None));
    let created = service
        .create_rule(
            &admin,
            AutomationRuleInput {
                name: "Welcome".to_owned(),
                description: None,
                event_type: "customer.created".to_owned(),
                conditions: ConditionSet::default(),
                actions: vec![reminder_action()],
                cooldown_minutes: 60,
                is_active: true,
            },
        )
        .await;
    assert!(created.is_ok());

    let owner_id = UserId::new();
    let Ok(event) = DomainEvent::new(
        "customer.created",
        json!({"customer": {"name": "Ada", "owner_id": owner_id}}),
    ) else {
        panic!("event should be valid");
    };

    let context = RequestContext::for_service(tenant_id);
    let Ok(first) = service.dispatch_event(&context, event.clone()).await else {
        panic!("dispatch should succeed");
    };
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, ExecutionStatus::Completed);
    assert_eq!(first[0].output[0].output["recipient_id"], json!(owner_id));

    let Ok(second) = service.dispatch_event(&context, event).await else {
        panic!("dispatch should succeed");
    };
    assert!(second.is_empty());

    let Ok(chain) = audit_repository.list_chain(tenant_id).await else {
        panic!("audit chain should load");
    };
    assert!(!chain.is_empty());
    assert!(verify_chain(&chain).is_intact());
}
