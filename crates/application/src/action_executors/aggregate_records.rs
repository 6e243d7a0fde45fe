use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bureau_core::{AppError, AppResult};
use bureau_domain::{ResourceType, lookup_path};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ActionExecutor, ActionInvocation, ExecutorError, parse_params};
use crate::{AccessFilter, OfficeRecord, OfficeRecordStore, RecordFilter};

const ACTION_TYPE: &str = "aggregate_records";
const UNGROUPED: &str = "(none)";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AggregateRecordsParams {
    resource_type: ResourceType,
    group_by: String,
    #[serde(default)]
    status: Option<String>,
}

impl AggregateRecordsParams {
    fn parse(params: &Value) -> AppResult<Self> {
        let parsed: Self = parse_params(ACTION_TYPE, params)?;
        if parsed.group_by.trim().is_empty() {
            return Err(AppError::Validation(
                "aggregate_records group_by must not be empty".to_owned(),
            ));
        }
        Ok(parsed)
    }
}

/// Counts visible rows of one resource type grouped by a column.
pub struct AggregateRecordsExecutor {
    access_filter: AccessFilter,
    records: Arc<dyn OfficeRecordStore>,
}

impl AggregateRecordsExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(access_filter: AccessFilter, records: Arc<dyn OfficeRecordStore>) -> Self {
        Self {
            access_filter,
            records,
        }
    }
}

fn group_key(record: &OfficeRecord, group_by: &str) -> String {
    let ownership = &record.ownership;
    let key = match group_by {
        "owner_id" => Some(ownership.owner_id.to_string()),
        "assignee_id" => ownership.assignee_id.map(|value| value.to_string()),
        "department_id" => ownership.department_id.map(|value| value.to_string()),
        path => lookup_path(&record.attributes, path).and_then(|value| match value {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }),
    };

    key.unwrap_or_else(|| UNGROUPED.to_owned())
}

#[async_trait]
impl ActionExecutor for AggregateRecordsExecutor {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn validate_params(&self, params: &Value) -> AppResult<()> {
        AggregateRecordsParams::parse(params).map(|_| ())
    }

    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<Value, ExecutorError> {
        let params = AggregateRecordsParams::parse(invocation.params)?;
        let predicate = self
            .access_filter
            .scoped_predicate(invocation.context, params.resource_type)
            .await?;

        let rows = self
            .records
            .list_records(
                params.resource_type,
                &predicate,
                &RecordFilter {
                    status: params.status,
                    ..RecordFilter::default()
                },
            )
            .await?;

        let mut groups = BTreeMap::<String, u64>::new();
        for row in &rows {
            *groups.entry(group_key(row, &params.group_by)).or_default() += 1;
        }

        Ok(json!({
            "resource_type": params.resource_type.as_str(),
            "group_by": params.group_by,
            "total": rows.len(),
            "groups": groups,
        }))
    }
}
