use std::collections::HashMap;

use async_trait::async_trait;
use bureau_application::AutomationRuleRepository;
use bureau_core::{AppError, AppResult, AutomationRuleId, TenantId};
use bureau_domain::AutomationRule;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// In-memory automation rule repository.
///
/// The cooldown claim runs under the write lock, so duplicate deliveries of
/// one event cannot both fire a rule.
#[derive(Debug, Default)]
pub struct InMemoryAutomationRuleRepository {
    rules: RwLock<HashMap<(TenantId, AutomationRuleId), AutomationRule>>,
}

impl InMemoryAutomationRuleRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AutomationRuleRepository for InMemoryAutomationRuleRepository {
    async fn save_rule(&self, rule: AutomationRule) -> AppResult<()> {
        let mut rules = self.rules.write().await;
        let key = (rule.tenant_id(), rule.id());
        let last_triggered = rules
            .get(&key)
            .map_or(rule.last_triggered(), AutomationRule::last_triggered);
        rules.insert(key, rule.with_last_triggered(last_triggered));
        Ok(())
    }

    async fn find_rule(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
    ) -> AppResult<Option<AutomationRule>> {
        Ok(self.rules.read().await.get(&(tenant_id, rule_id)).cloned())
    }

    async fn list_rules(&self, tenant_id: TenantId) -> AppResult<Vec<AutomationRule>> {
        let mut values = self
            .rules
            .read()
            .await
            .values()
            .filter(|rule| rule.tenant_id() == tenant_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));
        Ok(values)
    }

    async fn list_active_rules_for_event(
        &self,
        tenant_id: TenantId,
        event_type: &str,
    ) -> AppResult<Vec<AutomationRule>> {
        let mut values = self
            .rules
            .read()
            .await
            .values()
            .filter(|rule| {
                rule.tenant_id() == tenant_id && rule.is_active() && rule.event_type() == event_type
            })
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));
        Ok(values)
    }

    async fn claim_rule_firing(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(&(tenant_id, rule_id))
            .ok_or_else(|| AppError::NotFound(format!("automation rule '{rule_id}' not found")))?;

        Ok(rule.claim_firing(now).is_ok())
    }
}
