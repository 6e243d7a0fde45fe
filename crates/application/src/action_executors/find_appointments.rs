use std::sync::Arc;

use async_trait::async_trait;
use bureau_core::{AppError, AppResult};
use bureau_domain::ResourceType;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ActionExecutor, ActionInvocation, ExecutorError, parse_params};
use crate::{AccessFilter, OfficeRecordStore, RecordFilter};

const ACTION_TYPE: &str = "find_appointments";
const MAX_WITHIN_HOURS: u32 = 24 * 30;
const MAX_APPOINTMENTS: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FindAppointmentsParams {
    within_hours: u32,
    #[serde(default)]
    status: Option<String>,
}

impl FindAppointmentsParams {
    fn parse(params: &Value) -> AppResult<Self> {
        let parsed: Self = parse_params(ACTION_TYPE, params)?;
        if parsed.within_hours == 0 || parsed.within_hours > MAX_WITHIN_HOURS {
            return Err(AppError::Validation(format!(
                "within_hours must be between 1 and {MAX_WITHIN_HOURS}"
            )));
        }
        Ok(parsed)
    }
}

/// Lists upcoming appointments visible to the pipeline principal.
pub struct FindAppointmentsExecutor {
    access_filter: AccessFilter,
    records: Arc<dyn OfficeRecordStore>,
}

impl FindAppointmentsExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(access_filter: AccessFilter, records: Arc<dyn OfficeRecordStore>) -> Self {
        Self {
            access_filter,
            records,
        }
    }
}

#[async_trait]
impl ActionExecutor for FindAppointmentsExecutor {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn validate_params(&self, params: &Value) -> AppResult<()> {
        FindAppointmentsParams::parse(params).map(|_| ())
    }

    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<Value, ExecutorError> {
        let params = FindAppointmentsParams::parse(invocation.params)?;
        let predicate = self
            .access_filter
            .scoped_predicate(invocation.context, ResourceType::Appointment)
            .await?;

        let now = Utc::now();
        let filter = RecordFilter {
            starts_from: Some(now),
            starts_until: Some(now + Duration::hours(i64::from(params.within_hours))),
            status: params.status,
            limit: Some(MAX_APPOINTMENTS),
        };
        let appointments = self
            .records
            .list_records(ResourceType::Appointment, &predicate, &filter)
            .await?;

        let items = appointments
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "owner_id": record.ownership.owner_id,
                    "assignee_id": record.ownership.assignee_id,
                    "attributes": record.attributes,
                })
            })
            .collect::<Vec<_>>();

        Ok(json!({
            "count": items.len(),
            "appointments": items,
        }))
    }
}
