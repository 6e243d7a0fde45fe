use bureau_core::{AppError, AppResult, AutomationRuleId, NonEmptyString, TenantId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::normalize_description;
use crate::{ConditionSet, WorkflowAction, validate_actions};

/// Upper bound for rule cooldowns, one week.
pub const MAX_COOLDOWN_MINUTES: u32 = 7 * 24 * 60;

/// Input payload used to construct a validated automation rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationRuleInput {
    /// Rule name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Event type the rule reacts to.
    pub event_type: String,
    /// Conditions evaluated against the event payload.
    pub conditions: ConditionSet,
    /// Ordered action pipeline.
    pub actions: Vec<WorkflowAction>,
    /// Minimum minutes between two firings.
    pub cooldown_minutes: u32,
    /// Whether the rule starts active.
    pub is_active: bool,
}

/// Event automation rule with a cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    id: AutomationRuleId,
    tenant_id: TenantId,
    name: NonEmptyString,
    description: Option<String>,
    event_type: NonEmptyString,
    conditions: ConditionSet,
    actions: Vec<WorkflowAction>,
    is_active: bool,
    cooldown_minutes: u32,
    last_triggered: Option<DateTime<Utc>>,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl AutomationRule {
    /// Creates a validated automation rule.
    pub fn new(
        id: AutomationRuleId,
        tenant_id: TenantId,
        created_by: UserId,
        created_at: DateTime<Utc>,
        input: AutomationRuleInput,
    ) -> AppResult<Self> {
        let AutomationRuleInput {
            name,
            description,
            event_type,
            conditions,
            actions,
            cooldown_minutes,
            is_active,
        } = input;

        if cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return Err(AppError::Validation(format!(
                "cooldown_minutes must be less than or equal to {MAX_COOLDOWN_MINUTES}"
            )));
        }

        validate_actions(&actions)?;
        let conditions = ConditionSet::new(conditions.conditions().to_vec())?;

        Ok(Self {
            id,
            tenant_id,
            name: NonEmptyString::new(name.trim())?,
            description: normalize_description(description),
            event_type: NonEmptyString::new(event_type.trim())?,
            conditions,
            actions,
            is_active,
            cooldown_minutes,
            last_triggered: None,
            created_by,
            created_at,
        })
    }

    /// Restores the last firing time of a stored rule.
    #[must_use]
    pub fn with_last_triggered(mut self, last_triggered: Option<DateTime<Utc>>) -> Self {
        self.last_triggered = last_triggered;
        self
    }

    /// Returns the rule id.
    #[must_use]
    pub fn id(&self) -> AutomationRuleId {
        self.id
    }

    /// Returns the tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the event type.
    #[must_use]
    pub fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Returns the action pipeline.
    #[must_use]
    pub fn actions(&self) -> &[WorkflowAction] {
        &self.actions
    }

    /// Returns whether the rule is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the cooldown in minutes.
    #[must_use]
    pub fn cooldown_minutes(&self) -> u32 {
        self.cooldown_minutes
    }

    /// Returns the last firing time.
    #[must_use]
    pub fn last_triggered(&self) -> Option<DateTime<Utc>> {
        self.last_triggered
    }

    /// Returns the creator.
    #[must_use]
    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the earliest time the rule may fire again.
    #[must_use]
    pub fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        self.last_triggered
            .map(|last| last + Duration::minutes(i64::from(self.cooldown_minutes)))
    }

    /// Returns whether the cooldown has elapsed at `now`.
    #[must_use]
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.next_eligible_at()
            .is_none_or(|eligible_at| now >= eligible_at)
    }

    /// Claims a firing at `now`, failing while the cooldown is running.
    pub fn claim_firing(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if !self.cooldown_elapsed(now) {
            return Err(AppError::Conflict(format!(
                "automation rule '{}' is cooling down",
                self.id
            )));
        }

        self.last_triggered = Some(now);
        Ok(())
    }

    /// Activates or deactivates the rule.
    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }
}
