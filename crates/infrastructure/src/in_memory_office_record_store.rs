use async_trait::async_trait;
use bureau_application::{NewTask, OfficeRecord, OfficeRecordStore, RecordFilter};
use bureau_core::{AppResult, RecordId, TenantId};
use bureau_domain::{RecordOwnership, ResourceType, ScopePredicate, lookup_path};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::RwLock;

/// In-memory office record store.
#[derive(Debug, Default)]
pub struct InMemoryOfficeRecordStore {
    records: RwLock<Vec<OfficeRecord>>,
}

impl InMemoryOfficeRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row, e.g. when seeding a development tenant.
    pub async fn insert_record(&self, record: OfficeRecord) {
        self.records.write().await.push(record);
    }
}

fn starts_at(record: &OfficeRecord) -> Option<DateTime<Utc>> {
    lookup_path(&record.attributes, "starts_at")
        .and_then(Value::as_str)
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
}

fn filter_permits(filter: &RecordFilter, record: &OfficeRecord) -> bool {
    let status_matches = filter.status.as_deref().is_none_or(|status| {
        lookup_path(&record.attributes, "status").and_then(Value::as_str) == Some(status)
    });
    let bounded = filter.starts_from.is_some() || filter.starts_until.is_some();
    let window_matches = !bounded
        || starts_at(record).is_some_and(|starts_at| {
            filter.starts_from.is_none_or(|from| starts_at >= from)
                && filter.starts_until.is_none_or(|until| starts_at < until)
        });

    status_matches && window_matches
}

#[async_trait]
impl OfficeRecordStore for InMemoryOfficeRecordStore {
    async fn list_records(
        &self,
        resource_type: ResourceType,
        predicate: &ScopePredicate,
        filter: &RecordFilter,
    ) -> AppResult<Vec<OfficeRecord>> {
        let records = self.records.read().await;
        let mut matching = records
            .iter()
            .filter(|record| {
                record.resource_type == resource_type
                    && predicate.matches(&record.ownership)
                    && filter_permits(filter, record)
            })
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by_key(|record| (starts_at(record).is_none(), starts_at(record)));
        matching.truncate(filter.limit.unwrap_or(usize::MAX));
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
            .read()
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
        let id = RecordId::new();
        let mut ownership = RecordOwnership::owned_by(tenant_id, task.owner_id);
        ownership.assignee_id = task.assignee_id;

        let record = OfficeRecord {
            id,
            resource_type: ResourceType::Task,
            attributes: json!({
                "id": id,
                "tenant_id": tenant_id,
                "owner_id": task.owner_id,
                "assignee_id": task.assignee_id,
                "title": task.title,
                "description": task.description,
                "status": "open",
                "due_at": task.due_at,
                "created_at": Utc::now(),
            }),
            ownership,
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use bureau_application::{NewTask, OfficeRecord, OfficeRecordStore, RecordFilter};
    use bureau_core::{RecordId, TenantId, UserId};
    use bureau_domain::{RecordOwnership, ResourceType, ScopeClause};
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::InMemoryOfficeRecordStore;

    fn appointment(ownership: RecordOwnership, hours_ahead: i64, status: &str) -> OfficeRecord {
        OfficeRecord {
            id: RecordId::new(),
            resource_type: ResourceType::Appointment,
            ownership,
            attributes: json!({
                "starts_at": (Utc::now() + Duration::hours(hours_ahead)).to_rfc3339(),
                "status": status,
            }),
        }
    }

    #[tokio::test]
    async fn time_window_and_status_narrow_the_scope() {
        let store = InMemoryOfficeRecordStore::new();
        let tenant_id = TenantId::new();
        let owner_id = UserId::new();
        let own = RecordOwnership::owned_by(tenant_id, owner_id);

        store.insert_record(appointment(own.clone(), 30, "scheduled")).await;
        store.insert_record(appointment(own.clone(), 2, "scheduled")).await;
        store.insert_record(appointment(own.clone(), 3, "cancelled")).await;
        store.insert_record(appointment(own, -1, "scheduled")).await;
        store
            .insert_record(appointment(
                RecordOwnership::owned_by(TenantId::new(), owner_id),
                2,
                "scheduled",
            ))
            .await;

        let predicate = bureau_domain::AccessScope::OwnOnly { tenant_id, user_id: owner_id }
            .predicate();
        assert_eq!(predicate.clause(), ScopeClause::OwnerIs(owner_id));

        let filter = RecordFilter {
            starts_from: Some(Utc::now()),
            starts_until: Some(Utc::now() + Duration::hours(24)),
            status: Some("scheduled".to_owned()),
            limit: Some(10),
        };
        let Ok(records) = store
            .list_records(ResourceType::Appointment, &predicate, &filter)
            .await
        else {
            panic!("records should load");
        };
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn created_task_carries_assignee_and_is_scoped_to_tenant() {
        let store = InMemoryOfficeRecordStore::new();
        let tenant_id = TenantId::new();
        let assignee_id = UserId::new();
        let Ok(task) = store
            .create_task(
                tenant_id,
                NewTask {
                    title: "Follow up".to_owned(),
                    description: "summary".to_owned(),
                    owner_id: UserId::service(),
                    assignee_id: Some(assignee_id),
                    due_at: None,
                },
            )
            .await
        else {
            panic!("task should be created");
        };

        assert_eq!(task.ownership.assignee_id, Some(assignee_id));
        assert_eq!(task.attributes["assignee_id"], json!(assignee_id));
        assert!(matches!(
            store.find_record(TenantId::new(), ResourceType::Task, task.id).await,
            Ok(None)
        ));
    }
}
